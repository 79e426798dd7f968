//! Common types for the mapwire map data API client

#![warn(missing_docs)]
pub use chrono;
pub use smol_str;
pub use url;

/// Request signing capability and static credential signers.
pub mod auth;
pub mod error;
/// HTTP client abstraction used by mapwire crates.
pub mod http_client;
/// Map data model: elements, changesets, users, bounds, diff records.
pub mod types;

pub use auth::{AuthorizationToken, RequestSigner};
pub use error::{ApiError, ApiResult, ErrorKind};
