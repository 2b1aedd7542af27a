//! Turning deliveries into typed messages and dispatching them to business logic.
//!
//! [`parse_and_handle_message`] builds a [`DeliveryHandler`](crate::consumers::DeliveryHandler)
//! out of a [`MessageParser`], a [`MessageHandler`] and a [`TransientErrorHook`];
//! [`default_parse_and_handle_message`] only needs the handler and decodes JSON bodies.
pub use error::{ErrorType, HandlerError, ParseError};
pub use json::parse_json_message;
pub use parse_and_handle::{
    default_parse_and_handle_message, parse_and_handle_message, Incoming, JsonParser,
    MessageHandler, MessageParser, ParseAndHandle,
};
pub use transient_error_hook::{ShouldRequeue, TransientErrorHook};

mod error;
mod json;
mod parse_and_handle;
mod transient_error_hook;

/// Ready-made [`TransientErrorHook`]s.
pub mod hooks {
    pub use super::transient_error_hook::{AlwaysRequeue, NeverRequeue, RequeueOnce};
}
