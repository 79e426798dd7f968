//! # mapwire-xml
//!
//! Streaming decoders for map API responses and the writer for changeset
//! uploads. Everything here is built on [`TokenStream`], a forward-only
//! pull decoder over any `tokio` [`AsyncBufRead`](tokio::io::AsyncBufRead).
//!
//! - [`MapDataDecoder`] streams nodes, ways, relations and bounds to a sink
//!   as soon as each one is complete.
//! - [`DiffResultDecoder`] decodes upload acknowledgements in order.
//! - [`ChangesetInfoDecoder`] decodes extended changeset records.
//! - [`ChangesetBatch`] orders local edits so that the server never sees a
//!   dangling reference, and serializes them.

#![warn(missing_docs)]

pub mod batch;
pub mod changeset_info;
pub mod diff;
/// Per-call identity dedup of users and changesets
pub mod identity;
pub mod map_data;
pub mod token;

pub use batch::{Bucket, ChangesetBatch, WriteError, changeset_document};
pub use changeset_info::ChangesetInfoDecoder;
pub use diff::DiffResultDecoder;
pub use identity::IdentityCache;
pub use map_data::MapDataDecoder;
pub use token::{AttributeValue, Token, TokenStream};

use mapwire_common::error::{ApiError, ConnectionError, ParseError};
use mapwire_common::types::ValueError;
use smol_str::SmolStr;
use std::sync::Arc;

/// Errors produced while decoding a response document.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum XmlError {
    /// Reading the underlying stream failed. This says nothing about the
    /// document itself: the connection may simply have dropped.
    #[error("I/O error while reading document: {0}")]
    #[diagnostic(code(mapwire::xml::io))]
    Io(Arc<std::io::Error>),

    /// The document is not well-formed XML.
    #[error("malformed document at byte {position}: {message}")]
    #[diagnostic(code(mapwire::xml::malformed))]
    Malformed {
        /// What went wrong
        message: String,
        /// Byte offset near the problem
        position: u64,
    },

    /// A required attribute is absent.
    #[error("<{element}> is missing attribute {name:?}")]
    #[diagnostic(code(mapwire::xml::missing_attribute))]
    MissingAttribute {
        /// Element the attribute belongs to
        element: SmolStr,
        /// Attribute name
        name: SmolStr,
    },

    /// An attribute is present but not convertible to its declared type.
    #[error("attribute {name:?} of <{element}> is not a valid {expected}: {value:?}")]
    #[diagnostic(code(mapwire::xml::invalid_attribute))]
    InvalidAttribute {
        /// Element the attribute belongs to
        element: SmolStr,
        /// Attribute name
        name: SmolStr,
        /// Raw attribute text
        value: String,
        /// Expected format
        expected: &'static str,
    },

    /// Attribute values convert individually but describe an invalid value.
    #[error("<{element}> describes an invalid value: {source}")]
    #[diagnostic(code(mapwire::xml::invalid_value))]
    InvalidValue {
        /// Element the values belong to
        element: SmolStr,
        /// Why the value was rejected
        #[source]
        source: ValueError,
    },
}

impl XmlError {
    /// Whether this error comes from the underlying stream rather than the document.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

impl From<XmlError> for ApiError {
    fn from(error: XmlError) -> Self {
        match error {
            XmlError::Io(io) => ApiError::Connection(ConnectionError::Io(token::unshare_io(io))),
            other => ApiError::Parse(ParseError::with_source(other.to_string(), other)),
        }
    }
}

impl From<WriteError> for ApiError {
    fn from(error: WriteError) -> Self {
        ApiError::Connection(ConnectionError::InvalidRequest(error.to_string()))
    }
}
