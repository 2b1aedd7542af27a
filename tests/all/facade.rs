use crate::helpers::{
    get_unreachable_connection_factory, BrokenChannelFactory, CountingManagedChannelFactory,
    OutOfOrder,
};
use amqp_kit::amqp::{ChannelOptions, ConnectionFactory};
use amqp_kit::consumers::{BrokerAction, Delivery, DeliveryHandler};
use amqp_kit::managed::{ManagedChannel, ManagedChannelOptions};
use amqp_kit::messages::hooks::AlwaysRequeue;
use amqp_kit::messages::{HandlerError, Incoming, ParseError};
use amqp_kit::Toolkit;
use std::any::type_name_of_val;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn text(delivery: &Delivery) -> Result<String, ParseError> {
    String::from_utf8(delivery.data.clone()).map_err(|e| ParseError::Other(e.into()))
}

async fn always_busy(_: Incoming<String>) -> Result<(), HandlerError> {
    Err(anyhow::anyhow!("busy").into())
}

type TextParser = fn(&Delivery) -> Result<String, ParseError>;
type ReadyHandler = fn(Incoming<String>) -> std::future::Ready<Result<(), HandlerError>>;

#[test]
fn root_names_are_the_provider_items() {
    assert_eq!(
        type_name_of_val(&amqp_kit::create_channel),
        type_name_of_val(&amqp_kit::amqp::create_channel)
    );
    assert_eq!(
        type_name_of_val(&amqp_kit::create_managed_channel),
        type_name_of_val(&amqp_kit::managed::create_managed_channel)
    );
    assert_eq!(
        type_name_of_val(&amqp_kit::consume_from::<ManagedChannel, Arc<dyn DeliveryHandler>>),
        type_name_of_val(
            &amqp_kit::consumers::consume_from::<ManagedChannel, Arc<dyn DeliveryHandler>>
        )
    );
    assert_eq!(
        type_name_of_val(&amqp_kit::publish_to::<ManagedChannel>),
        type_name_of_val(&amqp_kit::publishers::publish_to::<ManagedChannel>)
    );
    assert_eq!(
        type_name_of_val(&amqp_kit::parse_json_message::<serde_json::Value>),
        type_name_of_val(&amqp_kit::messages::parse_json_message::<serde_json::Value>)
    );
    assert_eq!(
        type_name_of_val(&amqp_kit::default_parse_and_handle_message::<String, ReadyHandler>),
        type_name_of_val(
            &amqp_kit::messages::default_parse_and_handle_message::<String, ReadyHandler>
        )
    );
    assert_eq!(
        type_name_of_val(
            &amqp_kit::parse_and_handle_message::<String, TextParser, ReadyHandler, AlwaysRequeue>
        ),
        type_name_of_val(
            &amqp_kit::messages::parse_and_handle_message::<String, TextParser, ReadyHandler, AlwaysRequeue>
        )
    );
    assert_ne!(
        type_name_of_val(&amqp_kit::create_channel),
        type_name_of_val(&amqp_kit::create_managed_channel)
    );
}

#[tokio::test]
async fn channel_factory_failures_surface_unchanged() {
    let channel_factory = Arc::new(BrokenChannelFactory::default());
    let toolkit = Toolkit::with_providers(
        channel_factory.clone(),
        Arc::new(CountingManagedChannelFactory::default()),
    );

    let error = toolkit
        .create_channel(ChannelOptions::default())
        .await
        .unwrap_err();

    assert!(error.downcast_ref::<OutOfOrder>().is_some());
    assert_eq!(channel_factory.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn plain_and_managed_channels_come_from_different_providers() {
    let channel_factory = Arc::new(BrokenChannelFactory::default());
    let managed_channel_factory = Arc::new(CountingManagedChannelFactory::default());
    let toolkit = Toolkit::with_providers(channel_factory.clone(), managed_channel_factory.clone());

    let managed = toolkit
        .create_managed_channel(ManagedChannelOptions::default())
        .unwrap();
    assert_eq!(managed.open_channels(), 0);
    assert_eq!(managed_channel_factory.calls.load(Ordering::SeqCst), 1);
    assert_eq!(channel_factory.calls.load(Ordering::SeqCst), 0);

    let _ = toolkit.create_channel(ChannelOptions::default()).await;
    assert_eq!(managed_channel_factory.calls.load(Ordering::SeqCst), 1);
    assert_eq!(channel_factory.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_broker_errors_propagate_through_the_default_providers() {
    let toolkit = Toolkit::new(get_unreachable_connection_factory());

    assert!(toolkit.create_channel(ChannelOptions::default()).await.is_err());

    let managed = toolkit
        .create_managed_channel(ManagedChannelOptions {
            reconnect_delay: Duration::from_millis(100),
            ..ManagedChannelOptions::default()
        })
        .unwrap();
    assert!(managed.channel().await.is_err());
}

#[tokio::test]
async fn both_parse_and_handle_flavours_are_reachable_from_the_toolkit() {
    let toolkit = Toolkit::with_providers(
        Arc::new(BrokenChannelFactory::default()),
        Arc::new(CountingManagedChannelFactory::default()),
    );
    let plain_text = crate::helpers::delivery(b"hello", true);

    let custom = toolkit.parse_and_handle_message(text, always_busy, AlwaysRequeue);
    let default = toolkit.default_parse_and_handle_message(always_busy);

    assert_eq!(custom.handle(&plain_text).await, BrokerAction::Nack);
    // Not JSON.
    assert_eq!(default.handle(&plain_text).await, BrokerAction::Reject);

    let value: String = toolkit
        .parse_json_message(&crate::helpers::delivery(br#""hello""#, false))
        .unwrap();
    assert_eq!(value, "hello");
}

#[test]
fn every_capability_is_reachable_from_the_crate_root() {
    // Constructible without any setup besides the connection factory itself.
    let connection_factory = get_unreachable_connection_factory();
    let managed = amqp_kit::create_managed_channel(
        connection_factory.clone(),
        ManagedChannelOptions::default(),
    )
    .unwrap();
    let _channel = amqp_kit::create_channel(&connection_factory, ChannelOptions::default());
    let _consume = amqp_kit::consume_from(
        &managed,
        amqp_kit::consumers::ConsumeOptions::new("queue"),
        amqp_kit::parse_and_handle_message(text, always_busy, AlwaysRequeue),
    );
    let _publish = amqp_kit::publish_to(
        &managed,
        amqp_kit::publishers::MessageEnvelope::default(),
        amqp_kit::publishers::PublishOptions::default(),
    );
    let _default = amqp_kit::default_parse_and_handle_message(always_busy);
    let parsed: Result<String, _> =
        amqp_kit::parse_json_message(&crate::helpers::delivery(b"", false));
    assert!(matches!(parsed, Err(ParseError::EmptyBody)));

    let _toolkit: Toolkit = Toolkit::new(ConnectionFactory::clone(&connection_factory));
}
