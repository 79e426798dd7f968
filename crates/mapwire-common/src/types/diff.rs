use serde::{Deserialize, Serialize};

use crate::types::element::ElementType;

/// The server's reconciliation record for one uploaded change.
///
/// The acknowledgement carries no correlation key besides the old id, so
/// diff records are only meaningful in the order they were decoded, which
/// matches the order the batch was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiffElement {
    /// Kind of the changed element
    pub element_type: ElementType,
    /// Id the client used: the placeholder for creations, the known id otherwise
    pub client_id: i64,
    /// Id assigned by the server, absent for deletions
    pub server_id: Option<i64>,
    /// Version assigned by the server, absent for deletions
    pub server_version: Option<i32>,
}

impl DiffElement {
    /// Whether this record acknowledges a deletion
    pub fn is_deletion(&self) -> bool {
        self.server_id.is_none()
    }

    /// Whether this record assigned a real id to a placeholder
    pub fn is_creation(&self) -> bool {
        self.client_id < 0 && self.server_id.is_some()
    }
}
