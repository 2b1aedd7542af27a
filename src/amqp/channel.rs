use crate::amqp::ConnectionFactory;
use anyhow::Context;
use lapin::{
    options::{BasicQosOptions, ConfirmSelectOptions},
    Channel,
};
use std::time::Duration;

/// Settings applied to every channel right after it has been opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Maximum number of unacknowledged deliveries per consumer (`basic.qos`).
    /// Left to the broker default when `None`.
    pub prefetch_count: Option<u16>,
    /// Put the channel in confirm mode, so that publishing waits for the broker
    /// to ack/nack each message.
    pub publisher_confirms: bool,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            prefetch_count: None,
            publisher_confirms: true,
        }
    }
}

impl ChannelOptions {
    #[must_use]
    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = Some(prefetch_count);
        self
    }

    #[must_use]
    pub fn without_publisher_confirmations(mut self) -> Self {
        self.publisher_confirms = false;
        self
    }

    pub(crate) async fn apply(&self, channel: &Channel) -> Result<(), lapin::Error> {
        if let Some(prefetch_count) = self.prefetch_count {
            channel
                .basic_qos(prefetch_count, BasicQosOptions { global: false })
                .await?;
        }
        if self.publisher_confirms {
            channel
                .confirm_select(ConfirmSelectOptions { nowait: false })
                .await?;
        }
        Ok(())
    }
}

/// Open a channel on a dedicated connection to the RabbitMq broker.
///
/// The channel is not supervised: if the connection drops, the channel stays broken and
/// every operation on it fails. Use [`create_managed_channel`] if you need a channel that
/// heals itself.
///
/// [`create_managed_channel`]: crate::managed::create_managed_channel
#[tracing::instrument(name = "create_channel", skip(connection_factory))]
pub async fn create_channel(
    connection_factory: &ConnectionFactory,
    options: ChannelOptions,
) -> Result<Channel, anyhow::Error> {
    let connection = connection_factory.new_connection().await?;
    let channel = connection
        .create_channel()
        .await
        .context("Failed to open a channel on the RabbitMQ connection")?;
    options
        .apply(&channel)
        .await
        .context("Failed to configure the RabbitMQ channel")?;
    Ok(channel)
}

/// Something able to open unmanaged channels.
///
/// Implemented by [`ConnectionFactory`]; it is the seam [`Toolkit`](crate::Toolkit) injects.
#[async_trait::async_trait]
pub trait ChannelFactory: Send + Sync + 'static {
    async fn create_channel(&self, options: ChannelOptions) -> Result<Channel, anyhow::Error>;
}

#[async_trait::async_trait]
impl ChannelFactory for ConnectionFactory {
    async fn create_channel(&self, options: ChannelOptions) -> Result<Channel, anyhow::Error> {
        create_channel(self, options).await
    }
}

/// A source of channels to consume from and publish to.
///
/// Both a plain [`Channel`] and a [`ManagedChannel`] are channel providers.
///
/// [`ManagedChannel`]: crate::managed::ManagedChannel
#[async_trait::async_trait]
pub trait ChannelProvider: Clone + Send + Sync + 'static {
    /// Hand out a channel ready to be used.
    async fn acquire(&self) -> Result<Channel, anyhow::Error>;

    /// How long to wait before acquiring a new channel after the current one broke.
    ///
    /// `None` means the provider cannot recover and the failure must be reported.
    fn reconnect_delay(&self) -> Option<Duration> {
        None
    }
}

#[async_trait::async_trait]
impl ChannelProvider for Channel {
    async fn acquire(&self) -> Result<Channel, anyhow::Error> {
        let state = self.status().state();
        if self.status().connected() {
            Ok(self.clone())
        } else {
            Err(anyhow::anyhow!(
                "Channel {} is not usable, its state is {state:?}",
                self.id()
            ))
        }
    }
}
