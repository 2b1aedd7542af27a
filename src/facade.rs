use crate::amqp::configuration::RabbitMqSettings;
use crate::amqp::{Channel, ChannelFactory, ChannelOptions, ChannelProvider, ConnectionFactory};
use crate::consumers::{ConsumeOptions, ConsumerHandle, Delivery, DeliveryHandler};
use crate::managed::{ManagedChannel, ManagedChannelFactory, ManagedChannelOptions};
use crate::messages::{
    JsonParser, MessageHandler, MessageParser, ParseAndHandle, ParseError, TransientErrorHook,
};
use crate::publishers::{MessageEnvelope, PublishError, PublishOptions};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// All the capabilities of the crate behind a single value, built once at startup and
/// passed around by reference.
///
/// Channel creation goes through the injected [`ChannelFactory`] and
/// [`ManagedChannelFactory`]: swap them with [`Toolkit::with_providers`] to run the rest
/// of your application against something other than a live broker.
/// Every other method forwards to the free function with the same name.
///
/// ```rust
/// use amqp_kit::amqp::configuration::RabbitMqSettings;
/// use amqp_kit::managed::ManagedChannelOptions;
/// use amqp_kit::Toolkit;
///
/// # fn main() -> Result<(), anyhow::Error> {
/// let toolkit = Toolkit::from_settings(&RabbitMqSettings::default())?;
/// // No connection is opened until a channel is requested.
/// let channel = toolkit.create_managed_channel(ManagedChannelOptions::default())?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Toolkit {
    channel_factory: Arc<dyn ChannelFactory>,
    managed_channel_factory: Arc<dyn ManagedChannelFactory>,
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit").finish_non_exhaustive()
    }
}

impl Toolkit {
    /// Both kinds of channel are opened with `connection_factory`.
    pub fn new(connection_factory: ConnectionFactory) -> Self {
        let connection_factory = Arc::new(connection_factory);
        Self {
            channel_factory: connection_factory.clone(),
            managed_channel_factory: connection_factory,
        }
    }

    pub fn from_settings(settings: &RabbitMqSettings) -> Result<Self, anyhow::Error> {
        let connection_factory = ConnectionFactory::new_from_config(settings)?;
        Ok(Self::new(connection_factory))
    }

    pub fn with_providers(
        channel_factory: Arc<dyn ChannelFactory>,
        managed_channel_factory: Arc<dyn ManagedChannelFactory>,
    ) -> Self {
        Self {
            channel_factory,
            managed_channel_factory,
        }
    }

    /// See [`create_channel`](crate::create_channel).
    pub async fn create_channel(&self, options: ChannelOptions) -> Result<Channel, anyhow::Error> {
        self.channel_factory.create_channel(options).await
    }

    /// See [`create_managed_channel`](crate::create_managed_channel).
    pub fn create_managed_channel(
        &self,
        options: ManagedChannelOptions,
    ) -> Result<ManagedChannel, crate::managed::Error> {
        self.managed_channel_factory.create_managed_channel(options)
    }

    /// See [`consume_from`](crate::consume_from).
    pub async fn consume_from<P, H>(
        &self,
        provider: &P,
        options: ConsumeOptions,
        handler: H,
    ) -> Result<ConsumerHandle, anyhow::Error>
    where
        P: ChannelProvider,
        H: DeliveryHandler,
    {
        crate::consume_from(provider, options, handler).await
    }

    /// See [`publish_to`](crate::publish_to).
    pub async fn publish_to<P: ChannelProvider>(
        &self,
        provider: &P,
        envelope: MessageEnvelope,
        options: PublishOptions,
    ) -> Result<(), PublishError> {
        crate::publish_to(provider, envelope, options).await
    }

    /// See [`parse_and_handle_message`](crate::parse_and_handle_message).
    pub fn parse_and_handle_message<T, P, H, E>(
        &self,
        parser: P,
        handler: H,
        transient_error_hook: E,
    ) -> ParseAndHandle<T, P, H>
    where
        T: Send + 'static,
        P: MessageParser<T>,
        H: MessageHandler<T>,
        E: TransientErrorHook,
    {
        crate::parse_and_handle_message(parser, handler, transient_error_hook)
    }

    /// See [`default_parse_and_handle_message`](crate::default_parse_and_handle_message).
    pub fn default_parse_and_handle_message<T, H>(
        &self,
        handler: H,
    ) -> ParseAndHandle<T, JsonParser<T>, H>
    where
        T: DeserializeOwned + Send + 'static,
        H: MessageHandler<T>,
    {
        crate::default_parse_and_handle_message(handler)
    }

    /// See [`parse_json_message`](crate::parse_json_message).
    pub fn parse_json_message<T: DeserializeOwned>(
        &self,
        delivery: &Delivery,
    ) -> Result<T, ParseError> {
        crate::parse_json_message(delivery)
    }
}
