use crate::amqp::convenience::set_header;
use amq_protocol_types::{AMQPValue, FieldTable, ShortShortUInt, ShortString, Timestamp};
use lapin::BasicProperties;
use serde::Serialize;

/// A message to be published with [`publish_to`](crate::publishers::publish_to).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageEnvelope {
    // The body of the message - as a sequence of bytes.
    pub payload: Vec<u8>,
    // The name of the exchange we are publishing the message to.
    // Empty for the default exchange.
    pub exchange_name: String,
    // The routing key used by the exchange to determine which queues should get the message.
    pub routing_key: String,
    pub properties: BasicProperties,
}

impl MessageEnvelope {
    pub fn new(
        exchange_name: impl Into<String>,
        routing_key: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            payload,
            exchange_name: exchange_name.into(),
            routing_key: routing_key.into(),
            properties: BasicProperties::default(),
        }
    }

    /// Serialize `message` as JSON and tag the envelope with the `application/json` content
    /// type.
    pub fn json<T: Serialize + ?Sized>(
        exchange_name: impl Into<String>,
        routing_key: impl Into<String>,
        message: &T,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_vec(message)?;
        Ok(Self::new(exchange_name, routing_key, payload)
            .with_content_type("application/json".into()))
    }

    pub fn with_payload(mut self, value: Vec<u8>) -> Self {
        self.payload = value;
        self
    }

    pub fn with_exchange_name(mut self, value: impl Into<String>) -> Self {
        self.exchange_name = value.into();
        self
    }

    pub fn with_routing_key(mut self, value: impl Into<String>) -> Self {
        self.routing_key = value.into();
        self
    }

    fn props(mut self, f: impl FnOnce(BasicProperties) -> BasicProperties) -> Self {
        self.properties = f(self.properties);
        self
    }

    /// Add a header, keeping the ones already set.
    pub fn with_header(self, key: &str, value: AMQPValue) -> Self {
        self.props(|p| set_header(p, key, value))
    }

    /// Replace all headers.
    pub fn with_headers(self, value: FieldTable) -> Self {
        self.props(|p| p.with_headers(value))
    }

    pub fn with_content_type(self, value: ShortString) -> Self {
        self.props(|p| p.with_content_type(value))
    }

    pub fn with_content_encoding(self, value: ShortString) -> Self {
        self.props(|p| p.with_content_encoding(value))
    }

    pub fn with_priority(self, value: ShortShortUInt) -> Self {
        self.props(|p| p.with_priority(value))
    }

    pub fn with_correlation_id(self, value: ShortString) -> Self {
        self.props(|p| p.with_correlation_id(value))
    }

    pub fn with_reply_to(self, value: ShortString) -> Self {
        self.props(|p| p.with_reply_to(value))
    }

    pub fn with_expiration(self, value: ShortString) -> Self {
        self.props(|p| p.with_expiration(value))
    }

    pub fn with_message_id(self, value: ShortString) -> Self {
        self.props(|p| p.with_message_id(value))
    }

    pub fn with_timestamp(self, value: Timestamp) -> Self {
        self.props(|p| p.with_timestamp(value))
    }

    pub fn with_app_id(self, value: ShortString) -> Self {
        self.props(|p| p.with_app_id(value))
    }
}
