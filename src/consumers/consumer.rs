use crate::amqp::ChannelProvider;
use crate::consumers::{ConsumerPreStartHook, Delivery, DeliveryHandler};
use amq_protocol_types::{AMQPValue, FieldTable};
use anyhow::Context;
use futures_util::{stream::FuturesUnordered, FutureExt, StreamExt};
use lapin::{
    options::{BasicCancelOptions, BasicConsumeOptions, BasicQosOptions},
    Channel,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::watch, task::JoinHandle};
use tracing::Instrument;
use uuid::Uuid;

/// What to consume and how.
///
/// Use [`ConsumeOptions::new`] as entrypoint.
pub struct ConsumeOptions {
    queue_name: String,
    consumer_tag: Option<String>,
    prefetch_count: Option<u16>,
    priority: Option<i32>,
    exit_after: Option<usize>,
    pre_start_hooks: Vec<Arc<dyn ConsumerPreStartHook>>,
}

impl ConsumeOptions {
    /// Consume from `queue_name`.
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            consumer_tag: None,
            prefetch_count: None,
            priority: None,
            exit_after: None,
            pre_start_hooks: vec![],
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// The tag identifying the consumer on the broker.
    /// A random UUID is used if left unspecified.
    #[must_use]
    pub fn with_consumer_tag(mut self, consumer_tag: impl Into<String>) -> Self {
        self.consumer_tag = Some(consumer_tag.into());
        self
    }

    /// Maximum number of deliveries processed concurrently (`basic.qos`).
    /// If left unspecified, the prefetch count of the channel applies.
    #[must_use]
    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = Some(prefetch_count);
        self
    }

    /// Sets the `x-priority` consume argument.
    /// See <https://www.rabbitmq.com/consumer-priority.html#how-to-use>.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Stop consuming once `max_n_messages` deliveries have been received, after their
    /// processing has completed.
    ///
    /// Mostly useful in tests, to know when all the side-effects of processing have happened.
    #[must_use]
    pub fn exit_after(mut self, max_n_messages: usize) -> Self {
        self.exit_after = Some(max_n_messages);
        self
    }

    /// Pre-start hooks run, in registration order, before every subscription.
    ///
    /// Check out [`ConsumerPreStartHook`]'s documentation for more details.
    #[must_use]
    pub fn with_pre_start_hook<H: ConsumerPreStartHook>(mut self, hook: H) -> Self {
        self.pre_start_hooks.push(Arc::new(hook));
        self
    }

    /// Append multiple pre-start hooks, see [`ConsumeOptions::with_pre_start_hook`].
    #[must_use]
    pub fn with_pre_start_hooks<I>(mut self, hooks: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ConsumerPreStartHook>>,
    {
        self.pre_start_hooks.extend(hooks);
        self
    }
}

/// Start consuming messages from a queue.
///
/// `consume_from` acquires a channel from `provider`, runs the pre-start hooks and
/// subscribes to the queue before returning: failing to do any of that is reported to the
/// caller. Deliveries are then processed in the background, each in its own task, and
/// settled with the broker according to the [`BrokerAction`] returned by `handler`.
///
/// If the subscription breaks:
/// - on a plain [`Channel`], the consumer stops and [`ConsumerHandle::join`] returns the error;
/// - on a [`ManagedChannel`], the consumer waits for the reconnect delay and subscribes
///   again on a fresh channel, until it succeeds or is cancelled.
///
/// [`BrokerAction`]: crate::consumers::BrokerAction
/// [`ManagedChannel`]: crate::managed::ManagedChannel
#[tracing::instrument(
    name = "consume_from",
    skip(provider, options, handler),
    fields(queue_name = %options.queue_name)
)]
pub async fn consume_from<P, H>(
    provider: &P,
    options: ConsumeOptions,
    handler: H,
) -> Result<ConsumerHandle, anyhow::Error>
where
    P: ChannelProvider,
    H: DeliveryHandler,
{
    let consumer_tag = options
        .consumer_tag
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let span = tracing::info_span!(
        "consumer_run",
        queue_name = %options.queue_name,
        consumer_tag = %consumer_tag
    );
    let exit_after = options.exit_after;

    let subscriber = QueueSubscriber {
        provider: provider.clone(),
        options,
        consumer_tag: consumer_tag.clone(),
    };
    let subscription = subscriber.subscribe().await?;

    let consumer = Consumer {
        subscriber,
        exit_after,
        handler: Arc::new(handler),
    };
    Ok(ConsumerHandle::spawn(consumer_tag, consumer, subscription, span))
}

/// A running consumer.
///
/// Dropping the handle detaches the consumer: it keeps running in the background.
#[derive(Debug)]
pub struct ConsumerHandle {
    consumer_tag: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), anyhow::Error>>,
}

impl ConsumerHandle {
    fn spawn<S, H>(
        consumer_tag: String,
        consumer: Consumer<S, H>,
        subscription: S::Subscription,
        span: tracing::Span,
    ) -> Self
    where
        S: Subscriber,
        H: DeliveryHandler,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(consumer.run(subscription, shutdown_rx).instrument(span));
        Self {
            consumer_tag,
            shutdown,
            task,
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// `true` if the consumer has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the subscription and wait for in-flight deliveries to be processed.
    pub async fn cancel(self) -> Result<(), anyhow::Error> {
        // The consumer may have stopped already, in which case nobody is listening.
        let _ = self.shutdown.send(true);
        self.join().await
    }

    /// Wait for the consumer to stop on its own, e.g. after `exit_after` deliveries or
    /// because its subscription broke.
    pub async fn join(self) -> Result<(), anyhow::Error> {
        let Self {
            task,
            shutdown: _shutdown,
            ..
        } = self;
        task.await.context("The consumer task panicked")?
    }
}

/// A live stream of deliveries for one consumer tag.
#[async_trait::async_trait]
trait Subscription: Send + 'static {
    /// The next delivery. `None` once the broker has ended the subscription.
    ///
    /// Must be cancel-safe: it is polled from a `select!` loop.
    async fn next_delivery(&mut self) -> Option<Result<Delivery, anyhow::Error>>;

    /// Ask the broker to stop sending deliveries. The stream ends afterwards.
    async fn cancel(&mut self) -> Result<(), anyhow::Error>;
}

/// Opens subscriptions, the first one and the ones replacing a broken subscription.
#[async_trait::async_trait]
trait Subscriber: Send + Sync + 'static {
    type Subscription: Subscription;

    async fn subscribe(&self) -> Result<Self::Subscription, anyhow::Error>;

    /// `None` if a broken subscription cannot be replaced.
    fn reconnect_delay(&self) -> Option<Duration>;
}

struct QueueSubscriber<P> {
    provider: P,
    options: ConsumeOptions,
    consumer_tag: String,
}

#[async_trait::async_trait]
impl<P: ChannelProvider> Subscriber for QueueSubscriber<P> {
    type Subscription = QueueSubscription;

    #[tracing::instrument(
        name = "consumer_subscribe",
        skip(self),
        fields(queue_name = %self.options.queue_name)
    )]
    async fn subscribe(&self) -> Result<QueueSubscription, anyhow::Error> {
        let options = &self.options;
        let channel = self
            .provider
            .acquire()
            .await
            .context("Failed to acquire a channel to consume from")?;

        if let Some(prefetch_count) = options.prefetch_count {
            channel
                .basic_qos(prefetch_count, BasicQosOptions { global: false })
                .await
                .context("Failed to set the prefetch count")?;
        }

        for hook in &options.pre_start_hooks {
            hook.run(&channel, &options.queue_name, FieldTable::default())
                .await?;
        }

        let consumer = channel
            .basic_consume(
                &options.queue_name,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                consume_arguments(options),
            )
            .await
            .with_context(|| format!("Failed to consume from queue {}", options.queue_name))?;

        Ok(QueueSubscription {
            channel,
            consumer,
            consumer_tag: self.consumer_tag.clone(),
        })
    }

    fn reconnect_delay(&self) -> Option<Duration> {
        self.provider.reconnect_delay()
    }
}

struct QueueSubscription {
    channel: Channel,
    consumer: lapin::Consumer,
    consumer_tag: String,
}

#[async_trait::async_trait]
impl Subscription for QueueSubscription {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, anyhow::Error>> {
        self.consumer
            .next()
            .await
            .map(|event| event.map(Delivery::from).map_err(anyhow::Error::from))
    }

    async fn cancel(&mut self) -> Result<(), anyhow::Error> {
        self.channel
            .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
            .await
            .context("Failed to cancel the subscription")
    }
}

enum StreamEnd {
    Cancelled,
    Exhausted,
    Closed,
    Failed(anyhow::Error),
}

struct Consumer<S, H> {
    subscriber: S,
    exit_after: Option<usize>,
    handler: Arc<H>,
}

impl<S: Subscriber, H: DeliveryHandler> Consumer<S, H> {
    async fn run(
        self,
        subscription: S::Subscription,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), anyhow::Error> {
        let shutdown_rx = shutdown.clone();
        let shutdown = shutdown_requested(shutdown).fuse();
        tokio::pin!(shutdown);

        let mut in_flight = FuturesUnordered::new();
        let mut received = 0;
        let mut next_subscription = Some(subscription);

        let result = 'subscriptions: loop {
            let mut subscription = match next_subscription.take() {
                Some(subscription) => subscription,
                None => match self.resubscribe(shutdown_rx.clone()).await {
                    Some(subscription) => subscription,
                    None => break 'subscriptions Ok(()),
                },
            };

            let mut cancelled = false;
            let end = 'events: loop {
                if !cancelled && self.exit_after == Some(received) {
                    if let Err(e) = subscription.cancel().await {
                        tracing::warn!(error = ?e, "Failed to cancel the subscription");
                    }
                    break 'events StreamEnd::Exhausted;
                }

                tokio::select! {
                    // Shutdowns are preferred over processing more deliveries.
                    biased;

                    _ = &mut shutdown, if !cancelled => {
                        tracing::info!("Consumer received a shutdown request");
                        cancelled = true;
                        if let Err(e) = subscription.cancel().await {
                            tracing::warn!(error = ?e, "Failed to cancel the subscription");
                            break 'events StreamEnd::Cancelled;
                        }
                    }

                    _ = in_flight.next(), if !in_flight.is_empty() => {}

                    event = subscription.next_delivery() => match event {
                        // Once cancelled, the consumer stops however the stream ends.
                        None if cancelled => break 'events StreamEnd::Cancelled,
                        Some(Err(e)) if cancelled => {
                            tracing::debug!(
                                error = ?e,
                                "Subscription failed after being cancelled"
                            );
                            break 'events StreamEnd::Cancelled;
                        }
                        None => break 'events StreamEnd::Closed,
                        Some(Err(e)) => break 'events StreamEnd::Failed(e),
                        Some(Ok(delivery)) => {
                            // Each delivery gets its own task: deliveries are processed
                            // concurrently, up to the prefetch count, and a panic while
                            // processing one of them does not tear the consumer down.
                            in_flight.push(tokio::spawn(process(delivery, self.handler.clone())));
                            received += 1;
                        }
                    }
                }
            };

            match end {
                StreamEnd::Cancelled | StreamEnd::Exhausted => break 'subscriptions Ok(()),
                StreamEnd::Closed => {
                    if self.subscriber.reconnect_delay().is_none() {
                        tracing::info!("The broker closed the subscription");
                        break 'subscriptions Ok(());
                    }
                    tracing::warn!("The broker closed the subscription, subscribing again");
                }
                StreamEnd::Failed(e) => {
                    if self.subscriber.reconnect_delay().is_none() {
                        tracing::error!(error = ?e, "Consumer failed");
                        break 'subscriptions Err(e);
                    }
                    tracing::warn!(error = ?e, "Consumer failed, subscribing again");
                }
            }
        };

        // Make sure all tasks in flight complete before returning.
        while in_flight.next().await.is_some() {}

        result
    }

    /// Subscribe again after the reconnect delay, retrying until it works.
    ///
    /// Returns `None` if a shutdown was requested, before or while waiting.
    async fn resubscribe(&self, shutdown: watch::Receiver<bool>) -> Option<S::Subscription> {
        let delay = self.subscriber.reconnect_delay()?;
        let shutdown = shutdown_requested(shutdown);
        tokio::pin!(shutdown);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            tokio::select! {
                biased;
                _ = &mut shutdown => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => return None,
                outcome = self.subscriber.subscribe() => outcome,
            };
            match outcome {
                Ok(subscription) => {
                    tracing::info!(attempt, "Subscribed again");
                    return Some(subscription);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = ?e, "Failed to subscribe again, retrying in {delay:?}");
                }
            }
        }
    }
}

fn consume_arguments(options: &ConsumeOptions) -> FieldTable {
    let mut args = FieldTable::default();
    if let Some(priority) = options.priority {
        args.insert("x-priority".into(), AMQPValue::LongInt(priority));
    }
    args
}

/// Resolves once a shutdown has been requested. Never resolves if the handle was dropped.
async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

/// Run the handler on a delivery, then ack/nack/reject it with the broker.
#[tracing::instrument(
    name = "process_message",
    skip_all,
    fields(delivery_tag = delivery.delivery_tag, routing_key = %delivery.routing_key),
    level = "debug"
)]
async fn process<H: DeliveryHandler>(delivery: Delivery, handler: Arc<H>) {
    let action = handler.handle(&delivery).await;
    tracing::debug!(?action, "Message processed");
    if let Err(e) = delivery.settle(action).await {
        tracing::error!(error = ?e, ?action, "Failed to settle the message with the broker");
    }
}
