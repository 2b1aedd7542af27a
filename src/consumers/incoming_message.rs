use crate::amqp::convenience::BasicPropertiesExt;
use crate::consumers::BrokerAction;
use amq_protocol_types::{DeliveryTag, ShortString};
use anyhow::Context;
use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions},
    BasicProperties,
};
use std::borrow::Cow;

/// A message received from a RabbitMq queue.
#[derive(Debug, PartialEq)]
pub struct Delivery {
    pub delivery_tag: DeliveryTag,
    /// May be empty if the default exchange was used.
    pub exchange: ShortString,
    /// May be empty if no routing key was specified.
    pub routing_key: ShortString,
    /// Whether the broker already delivered this message before.
    pub redelivered: bool,
    /// Properties and headers of the message.
    pub properties: BasicProperties,
    /// The payload of the message in binary format.
    pub data: Vec<u8>,
    // Kept private so that handlers cannot settle a delivery themselves: AMQP forbids
    // acking/rejecting the same delivery tag twice.
    pub(crate) acker: Acker,
}

impl Delivery {
    /// Lookup a string header of the message.
    pub fn header_str(&self, key: &str) -> Option<Cow<'_, str>> {
        self.properties.get_header_str(key)
    }

    /// Tell the broker what to do with this delivery.
    pub(crate) async fn settle(&self, action: BrokerAction) -> Result<(), anyhow::Error> {
        match action {
            BrokerAction::Ack => self
                .acker
                .ack(BasicAckOptions { multiple: false })
                .await
                .context("Failed to ack message"),
            BrokerAction::Nack => self
                .acker
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue: true,
                })
                .await
                .context("Failed to nack message"),
            BrokerAction::Reject => self
                .acker
                .reject(BasicRejectOptions { requeue: false })
                .await
                .context("Failed to reject message"),
        }
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(value: lapin::message::Delivery) -> Self {
        Self {
            delivery_tag: value.delivery_tag,
            exchange: value.exchange,
            routing_key: value.routing_key,
            redelivered: value.redelivered,
            properties: value.properties,
            data: value.data,
            acker: value.acker,
        }
    }
}
