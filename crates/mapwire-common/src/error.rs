//! Error types for map API exchanges
//!
//! Every failure of an exchange ends up as one [`ApiError`]. HTTP statuses
//! map onto it through [`classify_status`]:
//!
//! | Status | Variant |
//! |---|---|
//! | 503 | [`ApiError::ServiceUnavailable`] |
//! | 404, 410 | [`ApiError::NotFound`] |
//! | 401, 403 | [`ApiError::AuthorizationFailed`] |
//! | 409 | [`ApiError::Conflict`] |
//! | 400 | [`ApiError::BadUserInput`] |
//! | other 4xx | [`ApiError::GenericClientError`] |
//! | anything else | [`ApiError::Connection`] |

use http::StatusCode;

/// Boxed error type for errors coming from pluggable collaborators
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for map API operations
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error type wrapping all possible outcomes of a failed exchange
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ApiError {
    /// Malformed response document, or an attribute that does not convert
    /// to its declared type. Not retryable.
    #[error("malformed response: {0}")]
    #[diagnostic(code(mapwire::parse))]
    Parse(#[from] ParseError),

    /// I/O failure, timeout, or a status code outside of the known set.
    #[error("connection error: {0}")]
    Connection(
        #[from]
        #[diagnostic_source]
        ConnectionError,
    ),

    /// The service reported it is temporarily unavailable (503)
    #[error("service unavailable: {0}")]
    #[diagnostic(
        code(mapwire::service_unavailable),
        help("the request may succeed when retried later")
    )]
    ServiceUnavailable(HttpError),

    /// The resource does not exist or was deleted (404, 410)
    #[error("not found: {0}")]
    #[diagnostic(code(mapwire::not_found))]
    NotFound(HttpError),

    /// Missing or insufficient credentials (401, 403, or no signer configured)
    #[error("authorization failed: {0}")]
    AuthorizationFailed(
        #[from]
        #[diagnostic_source]
        AuthError,
    ),

    /// A state precondition was violated, e.g. writing to a closed changeset (409)
    #[error("conflict: {0}")]
    #[diagnostic(code(mapwire::conflict))]
    Conflict(HttpError),

    /// Request parameters were rejected (400)
    #[error("bad request: {0}")]
    #[diagnostic(code(mapwire::bad_user_input))]
    BadUserInput(HttpError),

    /// Any other 4xx status
    #[error("client error: {0}")]
    #[diagnostic(code(mapwire::client_error))]
    GenericClientError(HttpError),

    /// Arguments rejected locally before anything was sent
    #[error("invalid input: {0}")]
    #[diagnostic(code(mapwire::invalid_input))]
    InvalidInput(String),
}

/// Flat classification of [`ApiError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`ApiError::Parse`]
    Parse,
    /// See [`ApiError::Connection`]
    Connection,
    /// See [`ApiError::ServiceUnavailable`]
    ServiceUnavailable,
    /// See [`ApiError::NotFound`]
    NotFound,
    /// See [`ApiError::AuthorizationFailed`]
    AuthorizationFailed,
    /// See [`ApiError::Conflict`]
    Conflict,
    /// See [`ApiError::BadUserInput`]
    BadUserInput,
    /// See [`ApiError::GenericClientError`]
    GenericClientError,
    /// See [`ApiError::InvalidInput`]
    InvalidInput,
}

impl ErrorKind {
    /// Whether repeating the same request later can reasonably succeed.
    ///
    /// Retrying is always up to the caller; nothing in this crate retries.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection | Self::ServiceUnavailable)
    }
}

impl ApiError {
    /// The flat kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Parse,
            Self::Connection(_) => ErrorKind::Connection,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AuthorizationFailed(_) => ErrorKind::AuthorizationFailed,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::BadUserInput(_) => ErrorKind::BadUserInput,
            Self::GenericClientError(_) => ErrorKind::GenericClientError,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// The HTTP error response behind this error, if it came from one
    pub fn http(&self) -> Option<&HttpError> {
        match self {
            Self::ServiceUnavailable(e)
            | Self::NotFound(e)
            | Self::Conflict(e)
            | Self::BadUserInput(e)
            | Self::GenericClientError(e) => Some(e),
            Self::AuthorizationFailed(AuthError::Rejected(e)) => Some(e),
            Self::Connection(ConnectionError::Status(e)) => Some(e),
            _ => None,
        }
    }

    /// Status code of the response behind this error, if any
    pub fn status(&self) -> Option<StatusCode> {
        self.http().map(|e| e.status)
    }
}

/// Map a non-success status code and its drained body onto an [`ApiError`].
///
/// The mapping is total; codes outside of the known set become
/// [`ConnectionError::Status`].
pub fn classify_status(status: StatusCode, body: Option<String>) -> ApiError {
    let error = HttpError { status, body };
    match status.as_u16() {
        503 => ApiError::ServiceUnavailable(error),
        404 | 410 => ApiError::NotFound(error),
        401 | 403 => ApiError::AuthorizationFailed(AuthError::Rejected(error)),
        409 => ApiError::Conflict(error),
        400 => ApiError::BadUserInput(error),
        400..=499 => ApiError::GenericClientError(error),
        _ => ApiError::Connection(ConnectionError::Status(error)),
    }
}

/// Response document could not be decoded
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ParseError {
    /// Parse error with only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Parse error wrapping an underlying cause
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Human readable description
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Transport-level errors that occur during HTTP communication
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConnectionError {
    /// Failed to establish connection to server
    #[error("connect failed: {0}")]
    #[diagnostic(code(mapwire::connection::connect))]
    Connect(String),

    /// Connecting or reading timed out
    #[error("request timed out")]
    #[diagnostic(code(mapwire::connection::timeout))]
    Timeout,

    /// Reading the response body failed after the request was sent
    #[error("I/O error: {0}")]
    #[diagnostic(code(mapwire::connection::io))]
    Io(#[from] std::io::Error),

    /// Request construction failed (malformed URI, headers, etc.)
    #[error("invalid request: {0}")]
    #[diagnostic(code(mapwire::connection::invalid_request))]
    InvalidRequest(String),

    /// The server answered with a status outside of the known set
    #[error("unexpected response {0}")]
    #[diagnostic(code(mapwire::connection::status))]
    Status(HttpError),

    /// Other transport error
    #[error("transport error: {0}")]
    #[diagnostic(code(mapwire::connection::other))]
    Other(BoxError),
}

/// Authentication and authorization errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum AuthError {
    /// The server rejected the credentials (401, 403)
    #[error("{0}")]
    #[diagnostic(code(mapwire::auth::rejected))]
    Rejected(HttpError),

    /// Request requires authentication but no signer is configured
    #[error("no request signer configured, but the request requires authentication")]
    #[diagnostic(
        code(mapwire::auth::no_signer),
        help("configure a signer on the connection before calling authenticated endpoints")
    )]
    NotAuthenticated,

    /// The signer failed to sign the request
    #[error("signing failed: {0}")]
    #[diagnostic(code(mapwire::auth::signing))]
    Signing(BoxError),
}

/// HTTP error response (non-2xx status code)
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub struct HttpError {
    /// HTTP status code
    pub status: StatusCode,
    /// Drained response body, if it was readable
    pub body: Option<String>,
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(body) = &self.body {
            if !body.is_empty() {
                write!(f, ": {}", body)?;
            }
        }
        Ok(())
    }
}

impl From<std::convert::Infallible> for ConnectionError {
    fn from(e: std::convert::Infallible) -> Self {
        match e {}
    }
}

#[cfg(feature = "reqwest-client")]
impl From<reqwest::Error> for ConnectionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_builder() || e.is_request() {
            Self::InvalidRequest(e.to_string())
        } else {
            Self::Other(Box::new(e))
        }
    }
}
