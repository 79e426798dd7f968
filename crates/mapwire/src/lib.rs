//! # mapwire
//!
//! Async client for changeset-based map data APIs speaking the OSM 0.6 XML
//! dialect.
//!
//! Responses are never buffered: the body of a successful exchange is
//! decoded while it arrives and every node, way and relation is handed to
//! the caller as soon as its closing tag has been read.
//!
//! ```no_run
//! # async fn run() -> mapwire::ApiResult<()> {
//! use mapwire::connection::{ApiConfig, ApiConnection, DEFAULT_BASE_URL};
//! use mapwire::types::{BoundingBox, MapData};
//!
//! let config = ApiConfig::for_url(DEFAULT_BASE_URL.parse().unwrap());
//! let connection = ApiConnection::with_reqwest(config);
//!
//! let bounds = BoundingBox::from_coords(51.74, 0.24, 51.75, 0.25).unwrap();
//! let mut data = MapData::default();
//! connection.map_data().get_map(&bounds, &mut data).await?;
//! println!("{} nodes", data.nodes.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Uploading
//!
//! Local edits are plain [`Element`](types::Element) values with their
//! `modified`/`deleted` flags set and negative placeholder ids for new
//! ones. [`upload_changes`] takes any number of them, sorts them so the
//! server never sees a reference to something that does not exist yet, and
//! runs the whole open, upload, close sequence.
//!
//! ## Errors
//!
//! Everything fails with [`ApiError`]. Its [`kind`](ApiError::kind) tells
//! a broken connection apart from a rejected request or a malformed
//! response; see [`mapwire_common::error`] for the status code mapping.

#![warn(missing_docs)]

pub mod api;
pub mod connection;
pub mod response;

pub use api::{ChangesetApi, MapDataApi, Upload, upload_changes};
pub use connection::{ApiConfig, ApiConnection};
pub use mapwire_common::*;
pub use mapwire_xml as xml;
pub use response::ResponseDecoder;
