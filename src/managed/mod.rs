//! Self-healing channels, pooled with [`deadpool`].
//!
//! A [`ManagedChannel`] provides two guarantees:
//! - broken channels are disposed of and new ones are created on demand;
//! - connections are reused across channels to limit overhead.
//!
//! ```rust
//! use amqp_kit::amqp::ConnectionFactory;
//! use amqp_kit::amqp::configuration::RabbitMqSettings;
//! use amqp_kit::managed::{create_managed_channel, ManagedChannelOptions};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let factory = ConnectionFactory::new_from_config(&RabbitMqSettings::default())?;
//!     let managed = create_managed_channel(factory, ManagedChannelOptions::default())?;
//!
//!     // Connects on first use.
//!     let channel = managed.channel().await?;
//!     Ok(())
//! }
//! ```

mod channel;
mod connection;
mod error;

pub use channel::{
    create_managed_channel, ChannelManager, ChannelPool, ManagedChannel, ManagedChannelFactory,
    ManagedChannelOptions,
};
pub use connection::ConnectionPool;
pub use error::Error;
