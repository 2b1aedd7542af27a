use crate::consumers::Delivery;
use std::sync::Arc;

/// The action we ask the broker to take once a delivery has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerAction {
    /// Positive acknowledgement - the message is removed from the queue.
    Ack,
    /// Negative acknowledgement - the message is requeued to be processed again.
    Nack,
    /// The message is removed from the queue and sent to the dead letter exchange,
    /// if one is configured.
    Reject,
}

/// Implementers of `DeliveryHandler` decide the fate of each delivery pulled by
/// [`consume_from`](crate::consumers::consume_from).
///
/// `handle` does not get access to the channel: the consumer settles the delivery with the
/// broker according to the returned [`BrokerAction`].
///
/// Most of the time you will not implement this trait yourself but build a handler with
/// [`parse_and_handle_message`] or [`default_parse_and_handle_message`].
///
/// [`parse_and_handle_message`]: crate::messages::parse_and_handle_message
/// [`default_parse_and_handle_message`]: crate::messages::default_parse_and_handle_message
#[async_trait::async_trait]
pub trait DeliveryHandler: Send + Sync + 'static {
    async fn handle(&self, delivery: &Delivery) -> BrokerAction;
}

#[async_trait::async_trait]
impl<H: DeliveryHandler + ?Sized> DeliveryHandler for Arc<H> {
    async fn handle(&self, delivery: &Delivery) -> BrokerAction {
        H::handle(self, delivery).await
    }
}

#[async_trait::async_trait]
impl<H: DeliveryHandler + ?Sized> DeliveryHandler for Box<H> {
    async fn handle(&self, delivery: &Delivery) -> BrokerAction {
        H::handle(self, delivery).await
    }
}
