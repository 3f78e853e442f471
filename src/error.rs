//! Error types for hawser transfers.
//!
//! Failures are described by two layers. [`Error`] is the root cause, one
//! variant per failure class. [`DiagnosticError`] wraps a root cause with a
//! human-readable message, a fatality flag and an ordered set of context
//! entries that each enclosing layer adds to on the way out.

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

/// Result type for hawser operations.
pub type Result<T> = std::result::Result<T, DiagnosticError>;

/// Root causes of a failed transfer.
#[derive(Error, Debug)]
pub enum Error {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// A JSON body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A `Content-Type` value could not be parsed or lacked a required parameter.
    #[error("invalid media type: {0}")]
    MediaType(String),

    /// The boundary marker at the start of a response body was wrong.
    #[error("{0}")]
    Framing(String),

    /// The server broke the negotiation contract.
    #[error("{0}")]
    Protocol(String),

    /// 401 or 403.
    #[error("{0}")]
    Auth(ServerError),

    /// 404.
    #[error("{0}")]
    NotFound(ServerError),

    /// Any other 4xx.
    #[error("{source} (status: {status})")]
    ClientFault { status: u16, source: ServerError },

    /// 5xx.
    #[error("{source} (status: {status})")]
    ServerFault { status: u16, source: ServerError },

    /// Credentials could not be obtained.
    #[error("credential error: {0}")]
    Credentials(String),

    /// Invalid object id
    #[error("invalid OID: {0}")]
    InvalidOid(String),

    /// Invalid endpoint URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Decode,
    Framing,
    Protocol,
    Auth,
    NotFound,
    ClientFault,
    ServerFault,
    Credentials,
    InvalidInput,
    Io,
}

impl Error {
    /// The failure class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Transport,
            Error::Json(_) | Error::MediaType(_) => ErrorKind::Decode,
            Error::Framing(_) => ErrorKind::Framing,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Auth(_) => ErrorKind::Auth,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::ClientFault { .. } => ErrorKind::ClientFault,
            Error::ServerFault { .. } => ErrorKind::ServerFault,
            Error::Credentials(_) => ErrorKind::Credentials,
            Error::InvalidOid(_) | Error::InvalidUrl(_) => ErrorKind::InvalidInput,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

/// Error body returned by the server for statuses >= 400.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[error("{message}")]
pub struct ServerError {
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Server-side request id, when the server sends one.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// A root cause plus everything needed to diagnose it.
///
/// Values are rebuilt rather than mutated: every `with_*` method consumes
/// the error and returns the enriched one. Context keys are unique and
/// keep their first insertion position; setting a key again replaces the
/// value.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DiagnosticError {
    #[source]
    cause: Error,
    message: String,
    fatal: bool,
    context: IndexMap<String, String>,
}

impl DiagnosticError {
    /// Wrap a root cause, using its own description as the message.
    pub fn new(cause: Error) -> Self {
        let message = cause.to_string();
        DiagnosticError {
            cause,
            message,
            fatal: true,
            context: IndexMap::new(),
        }
    }

    /// Wrap a root cause under a custom message.
    pub fn wrap(cause: Error, message: impl Into<String>) -> Self {
        DiagnosticError {
            cause,
            message: message.into(),
            fatal: true,
            context: IndexMap::new(),
        }
    }

    /// Record a context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Replace the message. The previous one is kept under `Detail`.
    pub fn with_message(self, message: impl Into<String>) -> Self {
        let previous = self.message.clone();
        let mut err = self.with_context("Detail", previous);
        err.message = message.into();
        err
    }

    /// Mark the failure as specific to this object rather than the whole run.
    pub fn non_fatal(mut self) -> Self {
        self.fatal = false;
        self
    }

    pub fn cause(&self) -> &Error {
        &self.cause
    }

    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether callers running a batch should stop.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Look up a single context entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    /// All context entries in insertion order.
    pub fn context(&self) -> impl Iterator<Item = (&str, &str)> {
        self.context.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<Error> for DiagnosticError {
    fn from(err: Error) -> Self {
        DiagnosticError::new(err)
    }
}

impl From<std::io::Error> for DiagnosticError {
    fn from(err: std::io::Error) -> Self {
        DiagnosticError::new(Error::Io(err))
    }
}
