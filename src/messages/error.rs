use std::fmt;

/// The error type returned by message handlers.
///
/// Besides the error itself, it says whether retrying could help, which drives what
/// happens to the message (see [`ErrorType`]).
#[derive(Debug)]
pub struct HandlerError {
    pub inner_error: anyhow::Error,
    pub error_type: ErrorType,
}

impl HandlerError {
    /// Processing might succeed if retried after a short delay.
    pub fn transient(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner_error: error.into(),
            error_type: ErrorType::Transient,
        }
    }

    /// Processing will never succeed.
    pub fn fatal(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner_error: error.into(),
            error_type: ErrorType::Fatal,
        }
    }
}

/// Errors are assumed to be transient unless marked otherwise: the transient error hook gets
/// the final say.
impl From<anyhow::Error> for HandlerError {
    fn from(error: anyhow::Error) -> Self {
        Self::transient(error)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.inner_error)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Handling of a message failed due to a {} issue.\n{}",
            self.error_type, self.inner_error
        )
    }
}

/// Types of failure when handling a message.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorType {
    /// Processing might succeed if retried after a short delay, e.g. a timeout when calling
    /// another service.
    ///
    /// The [transient error hook](crate::messages::TransientErrorHook) decides whether the
    /// message is requeued.
    Transient,
    /// Processing will never succeed, no matter how many times you retry, e.g. the payload
    /// is valid JSON but references an entity that does not exist.
    ///
    /// The message is rejected.
    Fatal,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// The body of a message could not be decoded.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("The message body is empty")]
    EmptyBody,
    #[error("The message body is not valid JSON for the expected type")]
    Json(#[from] serde_json::Error),
    #[error("The message body could not be parsed")]
    Other(#[source] anyhow::Error),
}
