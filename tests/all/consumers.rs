use crate::helpers::{get_unreachable_connection_factory, OutOfOrder, UnavailableProvider};
use amqp_kit::consumers::ConsumeOptions;
use amqp_kit::managed::ManagedChannelOptions;
use amqp_kit::messages::{HandlerError, Incoming};
use std::sync::atomic::Ordering;

async fn ignore(_: Incoming<serde_json::Value>) -> Result<(), HandlerError> {
    Ok(())
}

#[tokio::test]
async fn consume_from_reports_failures_to_subscribe() {
    let provider = UnavailableProvider::default();

    let error = amqp_kit::consume_from(
        &provider,
        ConsumeOptions::new("payments"),
        amqp_kit::default_parse_and_handle_message(ignore),
    )
    .await
    .unwrap_err();

    // The first subscription is not retried, even if the provider could reconnect.
    assert!(error.downcast_ref::<OutOfOrder>().is_some());
    assert_eq!(provider.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn consume_from_a_managed_channel_on_an_unreachable_broker_fails() {
    let channel = amqp_kit::create_managed_channel(
        get_unreachable_connection_factory(),
        ManagedChannelOptions::default(),
    )
    .unwrap();

    let result = amqp_kit::consume_from(
        &channel,
        ConsumeOptions::new("payments"),
        amqp_kit::default_parse_and_handle_message(ignore),
    )
    .await;

    assert!(result.is_err());
}

mod with_a_broker {
    use crate::helpers::get_connection_factory;
    use amqp_kit::amqp::{Channel, ChannelOptions, ChannelProvider};
    use amqp_kit::consumers::hooks::pre_start::DeclareQueue;
    use amqp_kit::consumers::{ConsumeOptions, ConsumerHandle};
    use amqp_kit::managed::ManagedChannelOptions;
    use amqp_kit::messages::{HandlerError, Incoming};
    use amqp_kit::publishers::{MessageEnvelope, PublishError, PublishOptions};
    use lapin::options::QueueDeleteOptions;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;
    use uuid::Uuid;

    /// Counts the messages it processed, each taking `delay`.
    #[derive(Clone)]
    struct Counter {
        started: Arc<AtomicUsize>,
        processed: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl Counter {
        fn new(delay: Duration) -> Self {
            Self {
                started: Default::default(),
                processed: Default::default(),
                delay,
            }
        }

        fn processed(&self) -> usize {
            self.processed.load(Ordering::SeqCst)
        }

        async fn start<P: ChannelProvider>(
            &self,
            provider: &P,
            options: ConsumeOptions,
        ) -> ConsumerHandle {
            let counter = self.clone();
            let handler = move |_: Incoming<serde_json::Value>| {
                let counter = counter.clone();
                async move {
                    counter.started.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(counter.delay).await;
                    counter.processed.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HandlerError>(())
                }
            };
            amqp_kit::consume_from(
                provider,
                options.with_pre_start_hook(DeclareQueue),
                amqp_kit::default_parse_and_handle_message(handler),
            )
            .await
            .unwrap()
        }
    }

    async fn open_channel() -> Channel {
        amqp_kit::create_channel(&get_connection_factory(), ChannelOptions::default())
            .await
            .unwrap()
    }

    async fn publish<P: ChannelProvider>(
        provider: &P,
        queue_name: &str,
        n: usize,
    ) -> Result<(), PublishError> {
        let envelope = MessageEnvelope::json("", queue_name, &json!({ "n": n })).unwrap();
        amqp_kit::publish_to(provider, envelope, PublishOptions::default()).await
    }

    #[tokio::test]
    #[ignore = "requires a RabbitMQ broker listening on localhost:5672"]
    async fn exit_after_stops_once_the_messages_are_processed() {
        // Arrange
        let queue_name = Uuid::new_v4().to_string();
        let channel = open_channel().await;
        let counter = Counter::new(Duration::from_millis(100));
        let handle = counter
            .start(&channel, ConsumeOptions::new(&queue_name).exit_after(2))
            .await;

        // Act
        for n in 0..2 {
            publish(&channel, &queue_name, n).await.unwrap();
        }
        timeout(Duration::from_secs(10), handle.join())
            .await
            .expect("the consumer did not stop after two messages")
            .unwrap();

        // Assert
        assert_eq!(counter.processed(), 2);
    }

    #[tokio::test]
    #[ignore = "requires a RabbitMQ broker listening on localhost:5672"]
    async fn cancel_waits_for_the_messages_being_processed() {
        // Arrange
        let queue_name = Uuid::new_v4().to_string();
        let channel = open_channel().await;
        let counter = Counter::new(Duration::from_millis(500));
        let handle = counter
            .start(&channel, ConsumeOptions::new(&queue_name))
            .await;
        publish(&channel, &queue_name, 1).await.unwrap();
        while counter.started.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Act
        timeout(Duration::from_secs(10), handle.cancel())
            .await
            .expect("cancel did not return")
            .unwrap();

        // Assert
        assert_eq!(counter.processed(), 1);
    }

    #[tokio::test]
    #[ignore = "requires a RabbitMQ broker listening on localhost:5672"]
    async fn a_consumer_on_a_plain_channel_stops_when_its_queue_is_deleted() {
        // Arrange
        let queue_name = Uuid::new_v4().to_string();
        let channel = open_channel().await;
        let handle = Counter::new(Duration::ZERO)
            .start(&channel, ConsumeOptions::new(&queue_name))
            .await;

        // Act
        open_channel()
            .await
            .queue_delete(&queue_name, QueueDeleteOptions::default())
            .await
            .unwrap();

        // Assert
        timeout(Duration::from_secs(10), handle.join())
            .await
            .expect("the consumer kept running after its queue was deleted")
            .unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a RabbitMQ broker listening on localhost:5672"]
    async fn a_consumer_on_a_managed_channel_subscribes_again_when_its_queue_is_deleted() {
        // Arrange
        let queue_name = Uuid::new_v4().to_string();
        let options = ManagedChannelOptions {
            reconnect_delay: Duration::from_millis(100),
            ..Default::default()
        };
        let managed =
            amqp_kit::create_managed_channel(get_connection_factory(), options).unwrap();
        let counter = Counter::new(Duration::ZERO);
        let handle = counter
            .start(&managed, ConsumeOptions::new(&queue_name).exit_after(1))
            .await;

        // Act
        open_channel()
            .await
            .queue_delete(&queue_name, QueueDeleteOptions::default())
            .await
            .unwrap();
        // The queue is unroutable until the consumer declares it again.
        let mut published = false;
        for _ in 0..50 {
            if publish(&managed, &queue_name, 1).await.is_ok() {
                published = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        // Assert
        assert!(published, "the consumer never declared its queue again");
        timeout(Duration::from_secs(10), handle.join())
            .await
            .expect("the resubscribed consumer did not process the message")
            .unwrap();
        assert_eq!(counter.processed(), 1);
    }
}
