//! Implements [`Manager`] for [`Channel`] and builds [`ManagedChannel`]s on top of it.
use crate::amqp::{ChannelOptions, ChannelProvider, ConnectionFactory};
use deadpool::managed::{self, Manager};
use lapin::{Channel, ChannelState};
use std::time::Duration;

use super::connection::ConnectionPool;

/// `ChannelPool` pools [`Channel`]s, reusing the connections of a [`ConnectionPool`].
pub type ChannelPool = deadpool::managed::Pool<ChannelManager>;

/// `ChannelManager` implements [`Manager`] to manage a pool of [`Channel`]s.
///
/// Every new channel is configured with the [`ChannelOptions`] of the manager.
pub struct ChannelManager {
    connection_pool: ConnectionPool,
    options: ChannelOptions,
}

impl ChannelManager {
    pub fn new(connection_pool: ConnectionPool, options: ChannelOptions) -> Self {
        Self {
            connection_pool,
            options,
        }
    }
}

#[async_trait::async_trait]
impl Manager for ChannelManager {
    type Type = Channel;
    type Error = super::Error;

    #[tracing::instrument(name = "managed_channel_create", skip(self))]
    async fn create(&self) -> Result<Channel, super::Error> {
        let connection = self.connection_pool.get().await?;
        let channel = connection.create_channel().await?;
        self.options.apply(&channel).await?;
        tracing::debug!(channel_id = channel.id(), "Opened a new managed channel");
        Ok(channel)
    }

    async fn recycle(&self, obj: &mut Channel) -> managed::RecycleResult<super::Error> {
        match obj.status().state() {
            ChannelState::Connected => Ok(()),
            state => {
                tracing::warn!(channel_id = obj.id(), ?state, "Discarding unhealthy channel");
                Err(managed::RecycleError::Message(format!(
                    "Channel is not in an healthy state {state:?}",
                )))
            }
        }
    }
}

/// How a [`ManagedChannel`] is built and how it recovers.
#[derive(Debug, Clone)]
pub struct ManagedChannelOptions {
    /// Applied to every channel the managed channel opens.
    pub channel: ChannelOptions,
    /// Upper bound on the connections opened towards the broker.
    pub max_connections: usize,
    /// Upper bound on the channels the pool opens.
    ///
    /// It does not cap concurrent users: [`ManagedChannel::channel`] returns channels to the
    /// pool right away, so callers may share a channel.
    pub max_channels: usize,
    /// How long consumers wait before re-subscribing after their channel broke.
    pub reconnect_delay: Duration,
}

impl Default for ManagedChannelOptions {
    fn default() -> Self {
        Self {
            channel: ChannelOptions::default(),
            max_connections: 1,
            max_channels: 8,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// A channel that heals itself.
///
/// Broken channels and connections are disposed of and recreated on demand, the next time
/// a channel is requested. Consumers started with [`consume_from`] on a `ManagedChannel`
/// re-subscribe after a failure instead of stopping.
///
/// `ManagedChannel` is cheap to clone: clones share the same pools.
///
/// [`consume_from`]: crate::consumers::consume_from
#[derive(Clone)]
pub struct ManagedChannel {
    pool: ChannelPool,
    options: ManagedChannelOptions,
}

impl ManagedChannel {
    /// Get a healthy channel, opening a new connection and/or channel if needed.
    ///
    /// The returned [`Channel`] is a handle on a pooled channel, which goes back to the pool
    /// as soon as this returns. Concurrent callers can be handed the same channel.
    pub async fn channel(&self) -> Result<Channel, super::Error> {
        let pooled = self.pool.get().await?;
        Ok(Channel::clone(&pooled))
    }

    /// Whether the channels handed out are in confirm mode.
    pub fn publisher_confirms(&self) -> bool {
        self.options.channel.publisher_confirms
    }

    pub fn options(&self) -> &ManagedChannelOptions {
        &self.options
    }

    /// Number of channels currently open.
    pub fn open_channels(&self) -> usize {
        self.pool.status().size
    }
}

impl std::fmt::Debug for ManagedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedChannel")
            .field("options", &self.options)
            .field("open_channels", &self.open_channels())
            .finish()
    }
}

#[async_trait::async_trait]
impl ChannelProvider for ManagedChannel {
    async fn acquire(&self) -> Result<Channel, anyhow::Error> {
        self.channel().await.map_err(anyhow::Error::from)
    }

    fn reconnect_delay(&self) -> Option<Duration> {
        Some(self.options.reconnect_delay)
    }
}

/// Build a [`ManagedChannel`].
///
/// No connection is opened here: the first connection and channel are created the first
/// time a channel is requested. This succeeds even if the broker is not reachable yet.
#[tracing::instrument(name = "create_managed_channel", skip(connection_factory), fields(host = %connection_factory.host()))]
pub fn create_managed_channel(
    connection_factory: ConnectionFactory,
    options: ManagedChannelOptions,
) -> Result<ManagedChannel, super::Error> {
    let connection_pool = ConnectionPool::builder(connection_factory)
        .max_size(options.max_connections)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build the RabbitMQ connection pool: {e}"))?;
    let pool = ChannelPool::builder(ChannelManager::new(connection_pool, options.channel))
        .max_size(options.max_channels)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build the RabbitMQ channel pool: {e}"))?;

    Ok(ManagedChannel { pool, options })
}

/// Something able to build [`ManagedChannel`]s.
///
/// Implemented by [`ConnectionFactory`]; it is the seam [`Toolkit`](crate::Toolkit) injects.
pub trait ManagedChannelFactory: Send + Sync + 'static {
    fn create_managed_channel(
        &self,
        options: ManagedChannelOptions,
    ) -> Result<ManagedChannel, super::Error>;
}

impl ManagedChannelFactory for ConnectionFactory {
    fn create_managed_channel(
        &self,
        options: ManagedChannelOptions,
    ) -> Result<ManagedChannel, super::Error> {
        create_managed_channel(self.clone(), options)
    }
}
