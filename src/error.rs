//! Error types.
//!
//! Two families live here:
//!
//! - [`Error`] surfaces infrastructure failures: binding a port, accepting a
//!   connection, or building the registry from a bad configuration.
//! - [`ServiceError`] is the code-bearing error every dispatch step produces.
//!   It travels up through the pipeline unchanged and is rendered by the
//!   registry as `{"error":{"code":N,"message":"…"}}`.

use std::fmt;

use crate::status::Status;

/// Infrastructure errors returned by the crate's fallible setup operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error raised while dispatching a request.
///
/// `code` is an HTTP-equivalent status. Errors converted from arbitrary
/// `std::error::Error` values default to `500`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ServiceError {
    code: u16,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ServiceError {
    pub fn new(code: impl Into<u16>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into(), source: None }
    }

    /// Wraps an arbitrary error. The message is the error's `Display` output.
    pub fn from_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            code: Status::InternalServerError.into(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Status::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(Status::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(Status::Unauthorized, message)
    }

    /// Resource disabled or request shape without a selector.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Status::InternalServerError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Status::InternalServerError, message)
    }

    pub fn aborted() -> Self {
        Self::new(Status::ClientClosedRequest, "Request aborted")
    }

    /// Re-annotates the error with `code`, keeping message and source.
    pub fn with_code(mut self, code: impl Into<u16>) -> Self {
        self.code = code.into();
        self
    }

    pub fn code(&self) -> u16 { self.code }
    pub fn message(&self) -> &str { &self.message }
}

impl From<&str> for ServiceError {
    fn from(message: &str) -> Self {
        Self::internal(message)
    }
}

impl From<String> for ServiceError {
    fn from(message: String) -> Self {
        Self::internal(message)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_error(err).with_code(Status::BadRequest)
    }
}

/// Builds a code-bearing error.
///
/// A plain message is wrapped; a value that is already a [`ServiceError`] is
/// annotated with `code` rather than wrapped a second time.
///
/// ```rust
/// use restmount::{ServiceError, set_error};
///
/// let wrapped = set_error(409, "already exists");
/// assert_eq!(wrapped.code(), 409);
///
/// let annotated = set_error(422, ServiceError::bad_request("bad payload"));
/// assert_eq!(annotated.code(), 422);
/// assert_eq!(annotated.message(), "bad payload");
/// ```
pub fn set_error(code: u16, message: impl Into<ServiceError>) -> ServiceError {
    message.into().with_code(code)
}

/// A non-optional argument could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentError {
    #[error("required argument `{0}` was not provided")]
    Missing(String),
}

/// Shown in logs as `code message`.
pub(crate) struct Coded<'a>(pub &'a ServiceError);

impl fmt::Display for Coded<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0.code, self.0.message)
    }
}
