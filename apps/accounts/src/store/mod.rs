//! Transactional storage for session activity rows.
//!
//! A [`SessionStore`] hands out [`SessionTx`] handles. Writes made through a
//! handle are visible to reads on that same handle immediately and to
//! everybody else only after [`SessionTx::commit`] succeeds.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{NewSessionActivityRow, SessionActivityRow};

pub use memory::MemoryStore;
pub use pg::PgSessionStore;

/// Conjunctive row filter. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub user_id: Option<String>,
    pub sid_s: Option<String>,
    /// Only rows with `created` strictly before this instant.
    pub created_before: Option<DateTime<Utc>>,
}

impl SessionFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn for_token(sid_s: impl Into<String>) -> Self {
        Self {
            sid_s: Some(sid_s.into()),
            ..Self::default()
        }
    }

    pub fn created_before(cutoff: DateTime<Utc>) -> Self {
        Self {
            created_before: Some(cutoff),
            ..Self::default()
        }
    }

    pub fn matches(&self, row: &SessionActivityRow) -> bool {
        self.user_id.as_deref().map_or(true, |u| row.user_id == u)
            && self.sid_s.as_deref().map_or(true, |s| row.sid_s == s)
            && self.created_before.map_or(true, |c| row.created < c)
    }
}

/// Source of transactions over the `session_activity` rows.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn SessionTx>, StoreError>;
}

/// An open transaction.
///
/// Dropping the handle without calling [`commit`](SessionTx::commit) discards
/// every write made through it.
#[async_trait]
pub trait SessionTx: Send {
    /// Stage a new row. The returned row carries the store-assigned `id` and
    /// `created`, but is visible outside this transaction only after commit.
    async fn insert(
        &mut self,
        row: NewSessionActivityRow<'_>,
    ) -> Result<SessionActivityRow, StoreError>;

    /// Stage deletion of the row with `id`. Fails with
    /// [`StoreError::NotFound`] if this transaction cannot see such a row.
    async fn delete(&mut self, id: i64) -> Result<(), StoreError>;

    /// Stage deletion of every row matching `filter`, returning how many.
    async fn delete_matching(&mut self, filter: &SessionFilter) -> Result<u64, StoreError>;

    async fn query(&mut self, filter: &SessionFilter)
        -> Result<Vec<SessionActivityRow>, StoreError>;

    async fn count(&mut self, filter: &SessionFilter) -> Result<i64, StoreError>;

    /// Apply every staged write atomically. On failure nothing is applied.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
