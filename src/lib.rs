//! `amqp-kit` bundles what a service needs to talk to RabbitMQ, built on top of [`lapin`].
//!
//! Everything is reachable from the crate root:
//!
//! - [`create_channel`] opens a channel on a dedicated connection;
//! - [`create_managed_channel`] builds a channel that heals itself when the connection drops;
//! - [`consume_from`] subscribes a handler to a queue;
//! - [`publish_to`] publishes a message and waits for the broker to confirm it;
//! - [`parse_and_handle_message`] and [`default_parse_and_handle_message`] turn a typed message
//!   handler into something [`consume_from`] can drive;
//! - [`parse_json_message`] decodes the JSON body of a delivery.
//!
//! [`Toolkit`] exposes the same capabilities behind a single value, with injectable channel
//! factories.
//!
//! ```rust,no_run
//! use amqp_kit::amqp::{configuration::RabbitMqSettings, ConnectionFactory};
//! use amqp_kit::consumers::ConsumeOptions;
//! use amqp_kit::managed::ManagedChannelOptions;
//! use amqp_kit::messages::{HandlerError, Incoming};
//! use amqp_kit::publishers::{MessageEnvelope, PublishOptions};
//!
//! #[derive(serde::Deserialize, serde::Serialize)]
//! struct Greeting {
//!     name: String,
//! }
//!
//! async fn greet(message: Incoming<Greeting>) -> Result<(), HandlerError> {
//!     println!("Hello {}!", message.payload.name);
//!     Ok(())
//! }
//!
//! # async fn example() -> Result<(), anyhow::Error> {
//! let connection_factory = ConnectionFactory::new_from_config(&RabbitMqSettings::default())?;
//! let channel =
//!     amqp_kit::create_managed_channel(connection_factory, ManagedChannelOptions::default())?;
//!
//! let consumer = amqp_kit::consume_from(
//!     &channel,
//!     ConsumeOptions::new("greetings"),
//!     amqp_kit::default_parse_and_handle_message(greet),
//! )
//! .await?;
//!
//! let greeting = Greeting { name: "Ferris".into() };
//! let envelope = MessageEnvelope::json("", "greetings", &greeting)?;
//! amqp_kit::publish_to(&channel, envelope, PublishOptions::default()).await?;
//!
//! consumer.cancel().await?;
//! # Ok(())
//! # }
//! ```

pub mod amqp;
pub mod consumers;
pub mod managed;
pub mod messages;
pub mod publishers;

mod facade;
#[cfg(test)]
mod test_utils;

pub use amqp::create_channel;
pub use consumers::consume_from;
pub use facade::Toolkit;
pub use managed::create_managed_channel;
pub use messages::{default_parse_and_handle_message, parse_and_handle_message, parse_json_message};
pub use publishers::publish_to;
