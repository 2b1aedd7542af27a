use crate::consumers::{BrokerAction, Delivery};

#[async_trait::async_trait]
/// A hook to determine if messages that failed with a transient error should be requeued.
///
/// Only errors marked as [`ErrorType::Transient`] reach the hook: messages that fail with
/// [`ErrorType::Fatal`] or cannot be parsed are always rejected.
///
/// Ready-made hooks: [`AlwaysRequeue`], [`NeverRequeue`] and [`RequeueOnce`].
///
/// [`ErrorType::Transient`]: crate::messages::ErrorType::Transient
/// [`ErrorType::Fatal`]: crate::messages::ErrorType::Fatal
pub trait TransientErrorHook: Send + Sync + 'static {
    async fn on_transient_error(&self, delivery: &Delivery) -> ShouldRequeue;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Determines what happens to a message that failed with a transient error.
pub enum ShouldRequeue {
    /// Nack the message: it is requeued and becomes _immediately_ available again.
    Requeue,
    /// Ack the message: it is dropped, it does not reach the dead letter exchange.
    Discard,
    /// Reject the message: it reaches the dead letter exchange, if one is configured.
    DeadLetterOrDiscard,
}

impl From<ShouldRequeue> for BrokerAction {
    fn from(value: ShouldRequeue) -> Self {
        match value {
            ShouldRequeue::Requeue => BrokerAction::Nack,
            ShouldRequeue::Discard => BrokerAction::Ack,
            ShouldRequeue::DeadLetterOrDiscard => BrokerAction::Reject,
        }
    }
}

/// Never requeue a message that failed with a transient error.
pub struct NeverRequeue;

#[async_trait::async_trait]
impl TransientErrorHook for NeverRequeue {
    async fn on_transient_error(&self, _delivery: &Delivery) -> ShouldRequeue {
        ShouldRequeue::DeadLetterOrDiscard
    }
}

/// Always requeue a message that failed with a transient error.
pub struct AlwaysRequeue;

#[async_trait::async_trait]
impl TransientErrorHook for AlwaysRequeue {
    async fn on_transient_error(&self, _delivery: &Delivery) -> ShouldRequeue {
        ShouldRequeue::Requeue
    }
}

/// Requeue a message the first time it fails, dead-letter it if it fails again after being
/// redelivered.
pub struct RequeueOnce;

#[async_trait::async_trait]
impl TransientErrorHook for RequeueOnce {
    async fn on_transient_error(&self, delivery: &Delivery) -> ShouldRequeue {
        if delivery.redelivered {
            ShouldRequeue::DeadLetterOrDiscard
        } else {
            ShouldRequeue::Requeue
        }
    }
}
