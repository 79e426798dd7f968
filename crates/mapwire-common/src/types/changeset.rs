use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::bounds::BoundingBox;
use crate::types::element::Tags;

/// A registered user as it appears embedded in map data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Numeric user id
    pub id: i64,
    /// Display name at the time the record was produced
    pub display_name: String,
}

impl User {
    /// Create a user record
    pub fn new(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// The lightweight changeset view embedded in element records.
///
/// Within one decode call, every element of the same changeset points to the
/// same `Arc<Changeset>`, so [`Arc::ptr_eq`] can be used for grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    /// Changeset id
    pub id: i64,
    /// Timestamp of the first element seen from this changeset
    pub date: Option<DateTime<Utc>>,
    /// Author, if the server disclosed it
    #[serde(skip)]
    pub user: Option<Arc<User>>,
}

/// A comment in a changeset discussion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangesetComment {
    /// When the comment was posted
    pub date: Option<DateTime<Utc>>,
    /// Author of the comment
    #[serde(skip)]
    pub user: Option<Arc<User>>,
    /// Comment body
    pub text: Option<String>,
}

/// The extended changeset view returned by changeset queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangesetInfo {
    /// Changeset id
    pub id: i64,
    /// Author, if the server disclosed it
    #[serde(skip)]
    pub user: Option<Arc<User>>,
    /// Changeset tags, `None` if it had none
    pub tags: Option<Tags>,
    /// Area touched by the changeset, absent for empty changesets
    pub bounds: Option<BoundingBox>,
    /// When the changeset was opened
    pub created_at: Option<DateTime<Utc>>,
    /// When the changeset was closed, absent while open
    pub closed_at: Option<DateTime<Utc>>,
    /// Whether further uploads are accepted
    pub open: bool,
    /// Number of discussion comments
    pub comments_count: u32,
    /// Number of element changes
    pub changes_count: u32,
    /// Discussion comments, only present when requested
    pub discussion: Option<Vec<ChangesetComment>>,
}
