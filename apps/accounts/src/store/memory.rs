use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use accounts_common::SnowflakeGenerator;
use async_trait::async_trait;
use chrono::Utc;

use super::{SessionFilter, SessionStore, SessionTx};
use crate::error::StoreError;
use crate::models::{NewSessionActivityRow, SessionActivityRow};

/// In-process transactional store.
///
/// Readers see the committed rows at the moment of each query plus their own
/// transaction's staged writes. Commits are serialised by a single lock.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

struct Shared {
    rows: Mutex<BTreeMap<i64, SessionActivityRow>>,
    ids: SnowflakeGenerator,
    unique_tokens: bool,
}

impl Shared {
    fn rows(&self) -> MutexGuard<'_, BTreeMap<i64, SessionActivityRow>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Reject commits that would leave two rows with the same `sid_s`.
    pub fn with_unique_tokens() -> Self {
        Self::build(true)
    }

    fn build(unique_tokens: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                rows: Mutex::new(BTreeMap::new()),
                ids: SnowflakeGenerator::default(),
                unique_tokens,
            }),
        }
    }

    /// Number of committed rows.
    pub fn len(&self) -> usize {
        self.shared.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn SessionTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            inserted: Vec::new(),
            deleted: BTreeSet::new(),
            swept: BTreeSet::new(),
        }))
    }
}

struct MemoryTx {
    shared: Arc<Shared>,
    inserted: Vec<SessionActivityRow>,
    /// Targeted deletes; each must still exist at commit.
    deleted: BTreeSet<i64>,
    /// Bulk deletes; rows already gone at commit are skipped.
    swept: BTreeSet<i64>,
}

impl MemoryTx {
    fn is_removed(&self, id: i64) -> bool {
        self.deleted.contains(&id) || self.swept.contains(&id)
    }

    /// Committed rows minus staged deletes, plus staged inserts, by `id`.
    fn visible(&self, filter: &SessionFilter) -> Vec<SessionActivityRow> {
        let rows = self.shared.rows();
        let mut out: Vec<SessionActivityRow> = rows
            .values()
            .filter(|row| !self.is_removed(row.id))
            .chain(self.inserted.iter())
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        out.sort_by_key(|row| row.id);
        out
    }

    fn check_unique_tokens(
        &self,
        rows: &BTreeMap<i64, SessionActivityRow>,
    ) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        let survivors = rows
            .values()
            .filter(|row| !self.is_removed(row.id))
            .chain(self.inserted.iter());
        for row in survivors {
            if !seen.insert(row.sid_s.as_str()) {
                return Err(StoreError::UniqueViolation(
                    "duplicate session_activity.sid_s".into(),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SessionTx for MemoryTx {
    async fn insert(
        &mut self,
        row: NewSessionActivityRow<'_>,
    ) -> Result<SessionActivityRow, StoreError> {
        let staged = SessionActivityRow {
            id: self.shared.ids.generate(),
            user_id: row.user_id.to_string(),
            sid_s: row.sid_s.to_string(),
            created: Utc::now(),
            ip: row.ip.map(str::to_string),
            user_agent: row.user_agent.map(str::to_string),
        };
        self.inserted.push(staged.clone());
        Ok(staged)
    }

    async fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        if let Some(pos) = self.inserted.iter().position(|row| row.id == id) {
            self.inserted.remove(pos);
            return Ok(());
        }
        if self.is_removed(id) || !self.shared.rows().contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        self.deleted.insert(id);
        Ok(())
    }

    async fn delete_matching(&mut self, filter: &SessionFilter) -> Result<u64, StoreError> {
        let targets = self.visible(filter);
        let staged: HashSet<i64> = self.inserted.iter().map(|row| row.id).collect();
        self.inserted.retain(|row| !filter.matches(row));
        for row in &targets {
            if !staged.contains(&row.id) {
                self.swept.insert(row.id);
            }
        }
        Ok(targets.len() as u64)
    }

    async fn query(
        &mut self,
        filter: &SessionFilter,
    ) -> Result<Vec<SessionActivityRow>, StoreError> {
        Ok(self.visible(filter))
    }

    async fn count(&mut self, filter: &SessionFilter) -> Result<i64, StoreError> {
        Ok(self.visible(filter).len() as i64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut rows = self.shared.rows();

        // Another transaction may have removed a row we staged for deletion.
        if let Some(missing) = self.deleted.iter().find(|id| !rows.contains_key(*id)) {
            tracing::debug!(id = *missing, "commit conflict: row already deleted");
            return Err(StoreError::NotFound);
        }
        if self.shared.unique_tokens {
            self.check_unique_tokens(&rows)?;
        }

        for id in &self.deleted {
            rows.remove(id);
        }
        let swept = self
            .swept
            .iter()
            .filter(|id| rows.remove(*id).is_some())
            .count();
        if swept < self.swept.len() {
            tracing::debug!(
                staged = self.swept.len(),
                swept,
                "bulk delete skipped rows removed concurrently"
            );
        }
        for row in &self.inserted {
            rows.insert(row.id, row.clone());
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
