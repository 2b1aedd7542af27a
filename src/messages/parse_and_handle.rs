use crate::amqp::convenience::BasicPropertiesExt;
use crate::consumers::{BrokerAction, Delivery, DeliveryHandler};
use crate::messages::transient_error_hook::RequeueOnce;
use crate::messages::{parse_json_message, ErrorType, HandlerError, ParseError, TransientErrorHook};
use amq_protocol_types::{AMQPValue, DeliveryTag, ShortString};
use lapin::BasicProperties;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Turns the body of a [`Delivery`] into a payload of type `T`.
///
/// Implemented for every `Fn(&Delivery) -> Result<T, ParseError>`, e.g.
/// [`parse_json_message`].
pub trait MessageParser<T>: Send + Sync + 'static {
    fn parse(&self, delivery: &Delivery) -> Result<T, ParseError>;
}

impl<T, F> MessageParser<T> for F
where
    F: Fn(&Delivery) -> Result<T, ParseError> + Send + Sync + 'static,
{
    fn parse(&self, delivery: &Delivery) -> Result<T, ParseError> {
        self(delivery)
    }
}

/// The business logic processing a parsed message.
///
/// Implemented for every async closure or function taking an [`Incoming<T>`] and returning
/// `Result<(), HandlerError>`.
#[async_trait::async_trait]
pub trait MessageHandler<T: Send + 'static>: Send + Sync + 'static {
    async fn handle(&self, message: Incoming<T>) -> Result<(), HandlerError>;
}

#[async_trait::async_trait]
impl<T, F, Fut> MessageHandler<T> for F
where
    T: Send + 'static,
    F: Fn(Incoming<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: Incoming<T>) -> Result<(), HandlerError> {
        self(message).await
    }
}

/// A parsed message, together with the metadata of the delivery it came from.
#[derive(Debug, Clone)]
pub struct Incoming<T> {
    pub payload: T,
    pub delivery_tag: DeliveryTag,
    pub exchange: ShortString,
    pub routing_key: ShortString,
    pub redelivered: bool,
    pub properties: BasicProperties,
}

impl<T> Incoming<T> {
    fn new(payload: T, delivery: &Delivery) -> Self {
        Self {
            payload,
            delivery_tag: delivery.delivery_tag,
            exchange: delivery.exchange.clone(),
            routing_key: delivery.routing_key.clone(),
            redelivered: delivery.redelivered,
            properties: delivery.properties.clone(),
        }
    }

    /// Lookup a header of the message.
    pub fn header(&self, key: &str) -> Option<&AMQPValue> {
        self.properties.get_header(key)
    }

    /// Lookup a string header of the message.
    pub fn header_str(&self, key: &str) -> Option<Cow<'_, str>> {
        self.properties.get_header_str(key)
    }
}

/// A [`DeliveryHandler`] that parses each delivery, hands the payload over to a
/// [`MessageHandler`] and turns the outcome into a [`BrokerAction`].
///
/// Built by [`parse_and_handle_message`] or [`default_parse_and_handle_message`].
pub struct ParseAndHandle<T, P, H> {
    parser: P,
    handler: H,
    transient_error_hook: Arc<dyn TransientErrorHook>,
    _payload: PhantomData<fn() -> T>,
}

impl<T, P, H> std::fmt::Debug for ParseAndHandle<T, P, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseAndHandle")
            .field("payload", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<T, P, H> DeliveryHandler for ParseAndHandle<T, P, H>
where
    T: Send + 'static,
    P: MessageParser<T>,
    H: MessageHandler<T>,
{
    async fn handle(&self, delivery: &Delivery) -> BrokerAction {
        let payload = match self.parser.parse(delivery) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    delivery_tag = delivery.delivery_tag,
                    routing_key = delivery.routing_key.as_str(),
                    "Failed to parse message, rejecting it"
                );
                return BrokerAction::Reject;
            }
        };

        let error = match self.handler.handle(Incoming::new(payload, delivery)).await {
            Ok(()) => return BrokerAction::Ack,
            Err(e) => e,
        };
        match error.error_type {
            ErrorType::Fatal => {
                tracing::error!(
                    error = ?error.inner_error,
                    delivery_tag = delivery.delivery_tag,
                    routing_key = delivery.routing_key.as_str(),
                    "Fatal failure when handling message, rejecting it"
                );
                BrokerAction::Reject
            }
            ErrorType::Transient => {
                let decision = self
                    .transient_error_hook
                    .on_transient_error(delivery)
                    .await;
                tracing::warn!(
                    error = ?error.inner_error,
                    delivery_tag = delivery.delivery_tag,
                    routing_key = delivery.routing_key.as_str(),
                    ?decision,
                    "Transient failure when handling message"
                );
                decision.into()
            }
        }
    }
}

/// Build a [`DeliveryHandler`] out of a parser, the business logic and the policy to apply
/// to transient failures.
///
/// What happens to each delivery:
/// - it cannot be parsed: rejected;
/// - the handler succeeds: acked;
/// - the handler fails with a [fatal](ErrorType::Fatal) error: rejected;
/// - the handler fails with a [transient](ErrorType::Transient) error: `transient_error_hook`
///   decides.
///
/// ```rust,no_run
/// use amqp_kit::consumers::{ConsumeOptions, Delivery};
/// use amqp_kit::messages::{hooks::AlwaysRequeue, HandlerError, Incoming, ParseError};
///
/// fn parse_text(delivery: &Delivery) -> Result<String, ParseError> {
///     String::from_utf8(delivery.data.clone()).map_err(|e| ParseError::Other(e.into()))
/// }
///
/// async fn print(message: Incoming<String>) -> Result<(), HandlerError> {
///     println!("{}", message.payload);
///     Ok(())
/// }
///
/// # async fn example(channel: amqp_kit::amqp::Channel) -> Result<(), anyhow::Error> {
/// let handler = amqp_kit::parse_and_handle_message(parse_text, print, AlwaysRequeue);
/// let consumer =
///     amqp_kit::consume_from(&channel, ConsumeOptions::new("greetings"), handler).await?;
/// # Ok(())
/// # }
/// ```
pub fn parse_and_handle_message<T, P, H, E>(
    parser: P,
    handler: H,
    transient_error_hook: E,
) -> ParseAndHandle<T, P, H>
where
    T: Send + 'static,
    P: MessageParser<T>,
    H: MessageHandler<T>,
    E: TransientErrorHook,
{
    ParseAndHandle {
        parser,
        handler,
        transient_error_hook: Arc::new(transient_error_hook),
        _payload: PhantomData,
    }
}

/// The parser used by [`default_parse_and_handle_message`].
pub type JsonParser<T> = fn(&Delivery) -> Result<T, ParseError>;

/// [`parse_and_handle_message`] for JSON payloads: bodies are decoded with
/// [`parse_json_message`] and transient failures are retried once ([`RequeueOnce`]).
///
/// ```rust,no_run
/// use amqp_kit::consumers::ConsumeOptions;
/// use amqp_kit::messages::{HandlerError, Incoming};
///
/// #[derive(serde::Deserialize)]
/// struct PaymentCreated {
///     id: String,
/// }
///
/// async fn on_payment(message: Incoming<PaymentCreated>) -> Result<(), HandlerError> {
///     println!("payment {} created", message.payload.id);
///     Ok(())
/// }
///
/// # async fn example(channel: amqp_kit::amqp::Channel) -> Result<(), anyhow::Error> {
/// let handler = amqp_kit::default_parse_and_handle_message(on_payment);
/// let consumer =
///     amqp_kit::consume_from(&channel, ConsumeOptions::new("payments"), handler).await?;
/// # Ok(())
/// # }
/// ```
pub fn default_parse_and_handle_message<T, H>(handler: H) -> ParseAndHandle<T, JsonParser<T>, H>
where
    T: DeserializeOwned + Send + 'static,
    H: MessageHandler<T>,
{
    parse_and_handle_message(parse_json_message::<T> as JsonParser<T>, handler, RequeueOnce)
}
