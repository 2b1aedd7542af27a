//! Ready-made pre-start hooks to set up the topology a consumer relies on.
//!
//! ```
//! use amqp_kit::consumers::hooks::pre_start::{
//!     Bind, DeclareDurableExchange, DeclareDurableQueue, ExchangeKind, RoutingKey,
//!     WithDeadLetterQueue,
//! };
//!
//! // A durable topic exchange, bound to a durable queue with its own dead letter queue.
//! let pre_start_hook = Bind {
//!     exchange: DeclareDurableExchange {
//!         name: "payments".to_owned(),
//!         kind: ExchangeKind::Topic,
//!     },
//!     queue: WithDeadLetterQueue(DeclareDurableQueue),
//!     binding: vec![
//!         RoutingKey::from("payment.created"),
//!         RoutingKey::from("payment.settled"),
//!     ],
//! };
//! # drop(pre_start_hook);
//! ```

use std::collections::BTreeMap;

use crate::consumers::ConsumerPreStartHook;
use amq_protocol_types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::Channel;
pub use lapin::ExchangeKind;

#[async_trait::async_trait]
/// Defines how to set up an exchange.
pub trait ExchangeSetup: Send + Sync + 'static {
    fn exchange_name(&self) -> &str;

    async fn setup_exchange(&self, channel: &Channel) -> Result<(), anyhow::Error>;
}

/// Declares a durable exchange.
pub struct DeclareDurableExchange {
    pub name: String,
    pub kind: ExchangeKind,
}

#[async_trait::async_trait]
impl ExchangeSetup for DeclareDurableExchange {
    fn exchange_name(&self) -> &str {
        &self.name
    }

    async fn setup_exchange(&self, channel: &Channel) -> Result<(), anyhow::Error> {
        let options = ExchangeDeclareOptions {
            durable: true,
            ..ExchangeDeclareOptions::default()
        };
        channel
            .exchange_declare(&self.name, self.kind.clone(), options, FieldTable::default())
            .await?;
        Ok(())
    }
}

/// Uses an exchange declared by somebody else.
pub struct ExistingExchange {
    pub name: String,
}

#[async_trait::async_trait]
impl ExchangeSetup for ExistingExchange {
    fn exchange_name(&self) -> &str {
        &self.name
    }

    async fn setup_exchange(&self, _channel: &Channel) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Declares a durable queue.
#[derive(Clone, Copy)]
pub struct DeclareDurableQueue;

#[async_trait::async_trait]
impl ConsumerPreStartHook for DeclareDurableQueue {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        let options = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };
        channel
            .queue_declare(queue_name, options, queue_args)
            .await?;
        Ok(())
    }
}

/// Declares a transient queue, deleted by the broker once its last consumer goes away.
#[derive(Clone, Copy)]
pub struct DeclareQueue;

#[async_trait::async_trait]
impl ConsumerPreStartHook for DeclareQueue {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        let options = QueueDeclareOptions {
            auto_delete: true,
            ..QueueDeclareOptions::default()
        };
        channel
            .queue_declare(queue_name, options, queue_args)
            .await?;
        Ok(())
    }
}

/// Wraps a queue declaration with a [dead letter exchange](https://www.rabbitmq.com/dlx.html).
///
/// It declares the fanout exchange `<queue_name>.deadletter`, bound to the durable queue
/// `<queue_name>.deadletter`, and sets it as the dead letter exchange of the wrapped queue.
///
/// Queue arguments are immutable: wrapping an existing queue requires rolling a new one.
pub struct WithDeadLetterQueue<H: ConsumerPreStartHook>(pub H);

impl<H: ConsumerPreStartHook> WithDeadLetterQueue<H> {
    pub(crate) fn dead_letter_name(queue_name: &str) -> String {
        format!("{queue_name}.deadletter")
    }
}

#[async_trait::async_trait]
impl<H: ConsumerPreStartHook> ConsumerPreStartHook for WithDeadLetterQueue<H> {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        mut queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        let dead_letter = Self::dead_letter_name(queue_name);

        Bind {
            exchange: DeclareDurableExchange {
                name: dead_letter.clone(),
                kind: ExchangeKind::Fanout,
            },
            queue: DeclareDurableQueue,
            binding: RoutingKey(String::new()),
        }
        .run(channel, &dead_letter, FieldTable::default())
        .await?;

        queue_args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(dead_letter.into()),
        );
        self.0.run(channel, queue_name, queue_args).await
    }
}

/// Sets up `exchange` and `queue`, then binds them together using `binding`.
pub struct Bind<Exchange: ExchangeSetup, Queue: ConsumerPreStartHook, Binds: Binding> {
    pub exchange: Exchange,
    pub queue: Queue,
    pub binding: Binds,
}

#[async_trait::async_trait]
impl<E: ExchangeSetup, Q: ConsumerPreStartHook, B: Binding> ConsumerPreStartHook for Bind<E, Q, B> {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        self.exchange.setup_exchange(channel).await?;
        self.queue.run(channel, queue_name, queue_args).await?;
        self.binding
            .bind(channel, self.exchange.exchange_name(), queue_name)
            .await
    }
}

#[async_trait::async_trait]
/// Defines how to bind an exchange to a queue.
pub trait Binding: Send + Sync + 'static {
    async fn bind(
        &self,
        channel: &Channel,
        exchange_name: &str,
        queue_name: &str,
    ) -> Result<(), anyhow::Error>;
}

/// Binds a queue to an exchange using a routing key.
pub struct RoutingKey(pub String);

impl From<&str> for RoutingKey {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for RoutingKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[async_trait::async_trait]
impl Binding for RoutingKey {
    async fn bind(
        &self,
        channel: &Channel,
        exchange_name: &str,
        queue_name: &str,
    ) -> Result<(), anyhow::Error> {
        channel
            .queue_bind(
                queue_name,
                exchange_name,
                &self.0,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
/// Binds a queue to a headers exchange, matching on `(key, value)` pairs.
pub enum Headers {
    /// All the headers must match for the message to be routed.
    All(Vec<(String, String)>),
    /// Any of the headers must match for the message to be routed.
    Any(Vec<(String, String)>),
}

impl Headers {
    fn arguments(&self) -> FieldTable {
        let (headers, match_type) = match self {
            Self::All(headers) => (headers, LongString::from("all")),
            Self::Any(headers) => (headers, LongString::from("any")),
        };
        let mut args: BTreeMap<ShortString, AMQPValue> = headers
            .iter()
            .cloned()
            .map(|(key, value)| (key.into(), LongString::from(value).into()))
            .collect();
        args.insert("x-match".into(), match_type.into());
        args.into()
    }
}

#[async_trait::async_trait]
impl Binding for Headers {
    async fn bind(
        &self,
        channel: &Channel,
        exchange_name: &str,
        queue_name: &str,
    ) -> Result<(), anyhow::Error> {
        channel
            .queue_bind(
                queue_name,
                exchange_name,
                "",
                QueueBindOptions { nowait: false },
                self.arguments(),
            )
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<B: Binding> Binding for Vec<B> {
    async fn bind(
        &self,
        channel: &Channel,
        exchange_name: &str,
        queue_name: &str,
    ) -> Result<(), anyhow::Error> {
        for binding in self {
            binding.bind(channel, exchange_name, queue_name).await?;
        }
        Ok(())
    }
}
