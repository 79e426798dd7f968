//! Request signing capability.
//!
//! Exchanges that require authentication hand their fully built request to a
//! [`RequestSigner`] right before it is sent. Token acquisition and storage
//! live outside of this crate; signers only apply credentials.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use std::fmt;

use crate::error::BoxError;

/// Applies credentials to an outgoing request.
pub trait RequestSigner: Send + Sync {
    /// Sign the request in place, typically by setting the `Authorization` header.
    fn sign(&self, request: &mut http::Request<Bytes>) -> Result<(), BoxError>;
}

impl<T: RequestSigner + ?Sized> RequestSigner for std::sync::Arc<T> {
    fn sign(&self, request: &mut http::Request<Bytes>) -> Result<(), BoxError> {
        self.as_ref().sign(request)
    }
}

/// Static credentials applied through the `Authorization` header.
#[derive(Clone)]
pub enum AuthorizationToken {
    /// OAuth 2 bearer token
    Bearer(String),
    /// HTTP basic authentication
    Basic {
        /// Account name
        username: String,
        /// Account password
        password: String,
    },
}

impl AuthorizationToken {
    fn header_value(&self) -> Result<HeaderValue, BoxError> {
        let raw = match self {
            Self::Bearer(token) => format!("Bearer {token}"),
            Self::Basic { username, password } => {
                format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
            }
        };
        let mut value = HeaderValue::from_str(&raw)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for AuthorizationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(..)"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

impl RequestSigner for AuthorizationToken {
    fn sign(&self, request: &mut http::Request<Bytes>) -> Result<(), BoxError> {
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.header_value()?);
        Ok(())
    }
}
