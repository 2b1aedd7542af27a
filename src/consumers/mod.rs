//! Facilities to consume messages from a RabbitMq queue. Check out [`consume_from`] as a
//! starting point.
pub use consumer::{consume_from, ConsumeOptions, ConsumerHandle};
pub use handler::{BrokerAction, DeliveryHandler};
pub use incoming_message::Delivery;
pub use pre_start_hook::ConsumerPreStartHook;

mod consumer;
mod handler;
pub mod hooks;
mod incoming_message;
mod pre_start_hook;
