//! Connecting to a RabbitMq broker and opening channels.

mod channel;
pub mod configuration;
pub mod convenience;
mod factory;

pub use channel::{create_channel, ChannelFactory, ChannelOptions, ChannelProvider};
pub use factory::ConnectionFactory;
pub use lapin::{Channel, Connection};

pub use lapin::{options, types, BasicProperties};
