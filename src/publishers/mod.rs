//! Facilities to publish messages to a RabbitMq exchange. Check out [`publish_to`] as a
//! starting point.
mod message_envelope;
mod publish;

pub use message_envelope::MessageEnvelope;
pub use publish::{publish_to, PublishError, PublishOptions};
