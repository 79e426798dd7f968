use chrono::{DateTime, Utc};
use mapwire_common::types::{Changeset, User};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

/// Id-keyed caches of users and changesets, scoped to one decode call.
///
/// The first occurrence of an id builds the value; later occurrences get the
/// same `Arc`, so records from one response can be grouped with
/// [`Arc::ptr_eq`]. Never share an instance between exchanges.
#[derive(Debug, Default)]
pub struct IdentityCache {
    users: HashMap<i64, Arc<User>>,
    changesets: HashMap<i64, Arc<Changeset>>,
}

impl IdentityCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached user for `id`, created from `display_name` on first sight.
    pub fn user(&mut self, id: i64, display_name: &str) -> Arc<User> {
        self.users
            .entry(id)
            .or_insert_with(|| Arc::new(User::new(id, display_name)))
            .clone()
    }

    /// The cached changeset for `id`, created from the given details on first sight.
    pub fn changeset(
        &mut self,
        id: i64,
        date: Option<DateTime<Utc>>,
        user: Option<Arc<User>>,
    ) -> Arc<Changeset> {
        match self.changesets.entry(id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => entry
                .insert(Arc::new(Changeset { id, date, user }))
                .clone(),
        }
    }

    /// Number of distinct users seen
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of distinct changesets seen
    pub fn changeset_count(&self) -> usize {
        self.changesets.len()
    }
}
