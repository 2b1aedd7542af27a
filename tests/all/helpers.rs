use amqp_kit::amqp::configuration::RabbitMqSettings;
use amqp_kit::amqp::{Channel, ChannelFactory, ChannelOptions, ChannelProvider, ConnectionFactory};
use amqp_kit::consumers::Delivery;
use amqp_kit::managed::{ManagedChannel, ManagedChannelFactory, ManagedChannelOptions};
use lapin::acker::Acker;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The broker used by the tests that need a live one, see [`RabbitMqSettings::default`].
pub fn get_connection_factory() -> ConnectionFactory {
    ConnectionFactory::new_from_config(&RabbitMqSettings::default()).unwrap()
}

/// A broker that refuses every connection, fast.
pub fn get_unreachable_connection_factory() -> ConnectionFactory {
    let settings = RabbitMqSettings {
        uri: "127.0.0.1".into(),
        port: 1,
        connection_timeout_seconds: Some(2),
        ..RabbitMqSettings::default()
    };
    ConnectionFactory::new_from_config(&settings).unwrap()
}

pub fn delivery(data: &[u8], redelivered: bool) -> Delivery {
    lapin::message::Delivery {
        delivery_tag: 1,
        exchange: "".into(),
        routing_key: "tests".into(),
        redelivered,
        properties: Default::default(),
        data: data.to_vec(),
        acker: Acker::default(),
    }
    .into()
}

#[derive(Debug, thiserror::Error)]
#[error("The channel factory is out of order")]
pub struct OutOfOrder;

/// A channel factory that always fails with [`OutOfOrder`].
#[derive(Default)]
pub struct BrokenChannelFactory {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl ChannelFactory for BrokenChannelFactory {
    async fn create_channel(&self, _options: ChannelOptions) -> Result<Channel, anyhow::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OutOfOrder.into())
    }
}

/// Builds real, lazy, managed channels towards an unreachable broker and counts the calls.
#[derive(Default)]
pub struct CountingManagedChannelFactory {
    pub calls: AtomicUsize,
}

impl ManagedChannelFactory for CountingManagedChannelFactory {
    fn create_managed_channel(
        &self,
        options: ManagedChannelOptions,
    ) -> Result<ManagedChannel, amqp_kit::managed::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        amqp_kit::create_managed_channel(get_unreachable_connection_factory(), options)
    }
}

/// A channel provider that never manages to hand out a channel.
#[derive(Clone, Default)]
pub struct UnavailableProvider {
    pub attempts: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ChannelProvider for UnavailableProvider {
    async fn acquire(&self) -> Result<Channel, anyhow::Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(OutOfOrder.into())
    }

    fn reconnect_delay(&self) -> Option<Duration> {
        Some(Duration::from_millis(10))
    }
}
