use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::types::ValueError;
use crate::types::bounds::LatLon;
use crate::types::changeset::Changeset;

/// Key/value tags attached to an element.
pub type Tags = BTreeMap<String, String>;

/// Maximum length of a relation member role, in UTF-16 code units.
pub const MAX_ROLE_LENGTH: usize = 256;

/// The three kinds of synchronizable map primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// A point
    Node,
    /// An ordered list of nodes
    Way,
    /// An ordered list of typed, role-annotated members
    Relation,
}

impl ElementType {
    /// Referential-integrity rank: nodes before ways before relations.
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Node => 1,
            Self::Way => 2,
            Self::Relation => 3,
        }
    }

    /// Name used on the wire
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(Self::Node),
            "way" => Ok(Self::Way),
            "relation" => Ok(Self::Relation),
            other => Err(ValueError::ElementType(other.to_owned())),
        }
    }
}

/// A reference from a relation to one of its members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRelationMember")]
pub struct RelationMember {
    ref_id: i64,
    member_type: ElementType,
    role: String,
}

#[derive(Deserialize)]
struct RawRelationMember {
    ref_id: i64,
    member_type: ElementType,
    role: String,
}

impl TryFrom<RawRelationMember> for RelationMember {
    type Error = ValueError;

    fn try_from(raw: RawRelationMember) -> Result<Self, Self::Error> {
        Self::new(raw.ref_id, raw.member_type, raw.role)
    }
}

impl RelationMember {
    /// Create a member, rejecting roles longer than [`MAX_ROLE_LENGTH`].
    pub fn new(
        ref_id: i64,
        member_type: ElementType,
        role: impl Into<String>,
    ) -> Result<Self, ValueError> {
        let role = role.into();
        let len = role.encode_utf16().count();
        if len > MAX_ROLE_LENGTH {
            return Err(ValueError::RoleTooLong(len));
        }
        Ok(Self {
            ref_id,
            member_type,
            role,
        })
    }

    /// Id of the referenced element
    pub fn ref_id(&self) -> i64 {
        self.ref_id
    }

    /// Kind of the referenced element
    pub fn member_type(&self) -> ElementType {
        self.member_type
    }

    /// Role of the member within the relation, possibly empty
    pub fn role(&self) -> &str {
        &self.role
    }
}

/// State shared by every element kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementMeta {
    /// Negative ids are client placeholders that the server never assigns.
    pub id: i64,
    /// Server-assigned version, 0 for elements that were never uploaded.
    pub version: i32,
    /// `None` when the element never had tags, as opposed to an empty map.
    pub tags: Option<Tags>,
    /// When this version of the element was written
    pub timestamp: Option<DateTime<Utc>>,
    /// Changeset of the last edit, shared between elements of one decode call.
    #[serde(skip)]
    pub changeset: Option<Arc<Changeset>>,
    /// Locally modified since it was fetched or created
    pub modified: bool,
    /// Locally marked for deletion
    pub deleted: bool,
}

impl ElementMeta {
    /// Metadata for an element with the given id and version.
    pub fn new(id: i64, version: i32) -> Self {
        Self {
            id,
            version,
            ..Default::default()
        }
    }

    /// Whether the element only exists locally
    pub fn is_new(&self) -> bool {
        self.id < 0
    }
}

/// A single point on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Common element state
    #[serde(flatten)]
    pub meta: ElementMeta,
    /// Position of the node
    pub position: LatLon,
}

/// An ordered sequence of node references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Way {
    /// Common element state
    #[serde(flatten)]
    pub meta: ElementMeta,
    /// Referenced node ids, in order. Empty for a way without `nd` children.
    pub node_ids: Vec<i64>,
}

/// A group of typed members with roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Common element state
    #[serde(flatten)]
    pub meta: ElementMeta,
    /// Members, in order. Empty for a relation without `member` children.
    pub members: Vec<RelationMember>,
}

fn placeholder(id: i64) -> Result<ElementMeta, ValueError> {
    if id >= 0 {
        return Err(ValueError::PlaceholderId(id));
    }
    Ok(ElementMeta::new(id, 0))
}

impl Node {
    /// A node that exists only locally yet. `placeholder_id` must be negative.
    pub fn new_local(placeholder_id: i64, position: LatLon) -> Result<Self, ValueError> {
        Ok(Self {
            meta: placeholder(placeholder_id)?,
            position,
        })
    }
}

impl Way {
    /// A way that exists only locally yet. `placeholder_id` must be negative.
    pub fn new_local(placeholder_id: i64, node_ids: Vec<i64>) -> Result<Self, ValueError> {
        Ok(Self {
            meta: placeholder(placeholder_id)?,
            node_ids,
        })
    }
}

impl Relation {
    /// A relation that exists only locally yet. `placeholder_id` must be negative.
    pub fn new_local(
        placeholder_id: i64,
        members: Vec<RelationMember>,
    ) -> Result<Self, ValueError> {
        Ok(Self {
            meta: placeholder(placeholder_id)?,
            members,
        })
    }
}

/// Any of the three map primitives.
///
/// Elements reference each other only by id; nothing here resolves a way's
/// nodes or a relation's members into in-memory values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    /// See [`Node`]
    Node(Node),
    /// See [`Way`]
    Way(Way),
    /// See [`Relation`]
    Relation(Relation),
}

impl Element {
    /// Shared element state
    pub fn meta(&self) -> &ElementMeta {
        match self {
            Self::Node(n) => &n.meta,
            Self::Way(w) => &w.meta,
            Self::Relation(r) => &r.meta,
        }
    }

    /// Mutable shared element state
    pub fn meta_mut(&mut self) -> &mut ElementMeta {
        match self {
            Self::Node(n) => &mut n.meta,
            Self::Way(w) => &mut w.meta,
            Self::Relation(r) => &mut r.meta,
        }
    }

    /// Kind of this element
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Node(_) => ElementType::Node,
            Self::Way(_) => ElementType::Way,
            Self::Relation(_) => ElementType::Relation,
        }
    }

    /// Element id
    pub fn id(&self) -> i64 {
        self.meta().id
    }

    /// Element version
    pub fn version(&self) -> i32 {
        self.meta().version
    }

    /// Tags, `None` if the element never had any
    pub fn tags(&self) -> Option<&Tags> {
        self.meta().tags.as_ref()
    }

    /// Changeset of the last edit, if known
    pub fn changeset(&self) -> Option<&Arc<Changeset>> {
        self.meta().changeset.as_ref()
    }

    /// Whether the element has a placeholder id
    pub fn is_new(&self) -> bool {
        self.meta().is_new()
    }

    /// Whether the element was modified locally
    pub fn is_modified(&self) -> bool {
        self.meta().modified
    }

    /// Whether the element was deleted locally
    pub fn is_deleted(&self) -> bool {
        self.meta().deleted
    }

    /// Set a tag, creating the tag map if the element had none, and mark the
    /// element modified.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let meta = self.meta_mut();
        meta.tags
            .get_or_insert_with(Tags::new)
            .insert(key.into(), value.into());
        meta.modified = true;
    }

    /// Mark the element as deleted.
    pub fn mark_deleted(&mut self) {
        self.meta_mut().deleted = true;
    }
}

impl From<Node> for Element {
    fn from(value: Node) -> Self {
        Self::Node(value)
    }
}

impl From<Way> for Element {
    fn from(value: Way) -> Self {
        Self::Way(value)
    }
}

impl From<Relation> for Element {
    fn from(value: Relation) -> Self {
        Self::Relation(value)
    }
}
