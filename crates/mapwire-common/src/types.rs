use miette::Diagnostic;
use thiserror::Error;

/// Positions and bounding boxes
pub mod bounds;
/// Lightweight and extended changeset views, users
pub mod changeset;
/// Upload acknowledgement records
pub mod diff;
/// Nodes, ways, relations
pub mod element;
/// Streamed units of map data responses and sinks for them
pub mod entity;

pub use bounds::{BoundingBox, LatLon};
pub use changeset::{Changeset, ChangesetComment, ChangesetInfo, User};
pub use diff::DiffElement;
pub use element::{
    Element, ElementMeta, ElementType, Node, Relation, RelationMember, Tags, Way,
};
pub use entity::{MapData, MapDataSink, MapEntity};

/// Errors from constructing value types.
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum ValueError {
    /// Latitude outside of [-90, 90]
    #[error("latitude {0} is out of range")]
    #[diagnostic(code(mapwire::value::latitude))]
    Latitude(f64),
    /// Longitude outside of [-180, 180]
    #[error("longitude {0} is out of range")]
    #[diagnostic(code(mapwire::value::longitude))]
    Longitude(f64),
    /// Minimum latitude above maximum latitude
    #[error("minimum latitude {min} is greater than maximum latitude {max}")]
    #[diagnostic(code(mapwire::value::inverted_bounds))]
    InvertedLatitudes {
        /// Offending minimum
        min: f64,
        /// Offending maximum
        max: f64,
    },
    /// Relation member role too long
    #[error("role is {0} UTF-16 code units long, the limit is 256")]
    #[diagnostic(code(mapwire::value::role_length))]
    RoleTooLong(usize),
    /// Local element created with a non-negative id
    #[error("placeholder id {0} must be negative")]
    #[diagnostic(code(mapwire::value::placeholder_id))]
    PlaceholderId(i64),
    /// Unknown element type name
    #[error("unknown element type {0:?}")]
    #[diagnostic(code(mapwire::value::element_type))]
    ElementType(String),
}
