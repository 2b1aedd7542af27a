use amq_protocol_types::FieldTable;
use lapin::Channel;

#[async_trait::async_trait]
/// A hook to execute logic before a consumer starts pulling messages from its queue.
///
/// Pre-start hooks are the place to declare the queue the consumer relies on, the exchanges
/// it is bound to, its dead letter queue, etc.
///
/// Hooks run every time the consumer subscribes: when [`consume_from`] is called and, on a
/// [`ManagedChannel`], every time the consumer re-subscribes on a fresh channel.
///
/// [`consume_from`]: crate::consumers::consume_from
/// [`ManagedChannel`]: crate::managed::ManagedChannel
pub trait ConsumerPreStartHook: Send + Sync + 'static {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error>;
}

/// assert it's object safe
type _CHECK = Box<dyn ConsumerPreStartHook>;
