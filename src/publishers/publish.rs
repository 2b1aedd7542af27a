use crate::amqp::ChannelProvider;
use crate::publishers::MessageEnvelope;
use lapin::message::BasicReturnMessage;
use lapin::options::BasicPublishOptions;
use lapin::publisher_confirm::Confirmation;
use lapin::{BasicProperties, Channel};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

// Reply Code 312 - NO_ROUTE
// See https://www.rabbitmq.com/amqp-0-9-1-reference.html
const NO_ROUTE: u16 = 312;

/// How [`publish_to`] publishes a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// Applies to acquiring a channel and publishing, together.
    /// Defaults to 3 seconds.
    pub timeout: Duration,
    /// If `true`, the broker returns messages that cannot be routed to any queue and
    /// [`publish_to`] fails with [`PublishError::UnroutableMessage`].
    /// If `false`, the broker silently drops them.
    /// Defaults to `true`.
    pub mandatory: bool,
    /// Persistent messages survive a broker restart when they sit on a durable queue.
    /// Defaults to `true`.
    pub persistent: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            mandatory: true,
            persistent: true,
        }
    }
}

impl PublishOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn not_mandatory(mut self) -> Self {
        self.mandatory = false;
        self
    }

    #[must_use]
    pub fn transient(mut self) -> Self {
        self.persistent = false;
        self
    }
}

/// Error returned when trying to publish a message with [`publish_to`].
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("Generic error encountered when interacting with the RabbitMq broker")]
    GenericError(#[source] anyhow::Error),
    #[error("The timeout threshold was reached while trying to publish the message")]
    TimeoutError,
    #[error("The message could not be routed: {0:?}")]
    UnroutableMessage(Box<BasicReturnMessage>),
    #[error("The RabbitMq broker nacked the publishing of the message: {0:?}")]
    NegativeAck(Option<Box<BasicReturnMessage>>),
}

/// Publish a message to RabbitMq.
///
/// A `timestamp` and a random `message_id` are added to the message properties, unless the
/// envelope already carries them.
///
/// If the channel has publisher confirmations enabled, `publish_to` waits for the broker to
/// confirm the message: a nack is reported as [`PublishError::NegativeAck`], an unroutable
/// mandatory message as [`PublishError::UnroutableMessage`].
///
/// ```rust,no_run
/// use amqp_kit::amqp::{ChannelOptions, ConnectionFactory};
/// use amqp_kit::publishers::{MessageEnvelope, PublishOptions};
///
/// # async fn example(connection_factory: ConnectionFactory) -> Result<(), anyhow::Error> {
/// let channel = amqp_kit::create_channel(&connection_factory, ChannelOptions::default()).await?;
/// let envelope = MessageEnvelope::json("payments", "payments.created", &serde_json::json!({
///     "id": "pay_1"
/// }))?;
/// amqp_kit::publish_to(&channel, envelope, PublishOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
#[tracing::instrument(
    skip_all,
    fields(exchange = %envelope.exchange_name, routing_key = %envelope.routing_key)
)]
pub async fn publish_to<P: ChannelProvider>(
    provider: &P,
    envelope: MessageEnvelope,
    options: PublishOptions,
) -> Result<(), PublishError> {
    let MessageEnvelope {
        payload,
        exchange_name,
        routing_key,
        properties,
    } = inject_amqp_properties(envelope);
    let properties = if options.persistent {
        // Delivery mode: Non-persistent (1) or persistent (2).
        properties.with_delivery_mode(2)
    } else {
        properties.with_delivery_mode(1)
    };
    let publish_options = BasicPublishOptions {
        mandatory: options.mandatory,
        // The immediate flag was dropped in RabbitMQ 3.0, setting it causes a not-supported error.
        immediate: false,
    };

    // Acquiring the channel and publishing share the same timeout.
    let publish_future = async {
        let channel = provider
            .acquire()
            .await
            .map_err(|e| {
                PublishError::GenericError(e.context(
                    "Failed to acquire a healthy channel when trying to publish to RabbitMq",
                ))
            })?;
        publish(
            &channel,
            &payload,
            publish_options,
            &exchange_name,
            &routing_key,
            properties,
        )
        .await
    };

    match tokio::time::timeout(options.timeout, publish_future).await {
        Ok(result) => result,
        Err(_) => Err(PublishError::TimeoutError),
    }
}

#[tracing::instrument(level = "debug", skip(channel, payload, properties))]
async fn publish(
    channel: &Channel,
    payload: &[u8],
    options: BasicPublishOptions,
    exchange: &str,
    routing_key: &str,
    properties: BasicProperties,
) -> Result<(), PublishError> {
    let confirm = channel
        .basic_publish(exchange, routing_key, options, payload, properties)
        .await
        .map_err(|e| PublishError::GenericError(e.into()))?
        .await
        .map_err(|e| PublishError::GenericError(e.into()))?;

    match confirm {
        Confirmation::Ack(Some(returned)) if returned.reply_code == NO_ROUTE => {
            Err(PublishError::UnroutableMessage(returned))
        }
        Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        Confirmation::Nack(returned) => Err(PublishError::NegativeAck(returned)),
    }
}

fn inject_amqp_properties(mut envelope: MessageEnvelope) -> MessageEnvelope {
    let current_timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|ct| ct.as_secs());

    let props = envelope.properties;
    let props = if let Some(ct) = current_timestamp {
        let ts = *props.timestamp();
        props.with_timestamp(ts.unwrap_or(ct))
    } else {
        warn!("System time is before 1970");
        props
    };

    let message_id = props.message_id().clone();
    envelope.properties =
        props.with_message_id(message_id.unwrap_or_else(|| Uuid::new_v4().to_string().into()));

    envelope
}
