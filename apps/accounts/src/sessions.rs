//! Session activity tracking.
//!
//! [`SessionActivityManager`] records, lists and revokes the sessions of a
//! user. It holds no mutable state of its own; every operation runs in a
//! store transaction that is committed or rolled back before returning.
//!
//! Lists returned here are snapshots. A `Vec` obtained before another
//! caller's commit keeps its old members until the caller lists again.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::{Config, DEFAULT_SESSION_LIFETIME_SECS};
use crate::error::{SessionError, StoreError};
use crate::models::{RecordState, SessionActivity, SessionActivityRow};
use crate::store::{SessionFilter, SessionStore, SessionTx};

#[derive(Clone)]
pub struct SessionActivityManager {
    store: Arc<dyn SessionStore>,
    lifetime: Duration,
}

impl SessionActivityManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            lifetime: Duration::seconds(DEFAULT_SESSION_LIFETIME_SECS),
        }
    }

    pub fn from_config(store: Arc<dyn SessionStore>, config: &Config) -> Self {
        Self::new(store).with_lifetime(config.session_lifetime)
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Open an explicit unit of work.
    pub async fn begin(&self) -> Result<SessionTransaction, SessionError> {
        let tx = self.store.begin().await?;
        Ok(SessionTransaction {
            tx,
            added: Vec::new(),
            revoked: Vec::new(),
            poisoned: false,
        })
    }

    /// Record a new session for `user_id` and commit it.
    pub async fn create_session(
        &self,
        user_id: &str,
        sid_s: &str,
    ) -> Result<SessionActivity, SessionError> {
        self.create_session_with(SessionActivity::new(user_id, sid_s))
            .await
    }

    /// Persist a caller-built record, e.g. one carrying client metadata.
    ///
    /// On success the returned record has `id` and `created` set. On failure
    /// nothing was written.
    pub async fn create_session_with(
        &self,
        mut record: SessionActivity,
    ) -> Result<SessionActivity, SessionError> {
        if record.state() != RecordState::Unpersisted {
            return Err(SessionError::InvalidState("record is already persisted"));
        }

        let mut tx = self.store.begin().await?;
        let row = match tx.insert(record.as_insert()).await {
            Ok(row) => row,
            Err(err) => return abort(tx, err).await,
        };
        tx.commit().await?;

        record.mark_persisted(&row);
        tracing::info!(user_id = record.user_id(), id = row.id, "session recorded");
        Ok(record)
    }

    /// Every session currently stored for `user_id`.
    ///
    /// No ordering is guaranteed.
    pub async fn list_active_sessions(
        &self,
        user_id: &str,
    ) -> Result<Vec<SessionActivity>, SessionError> {
        self.read(&SessionFilter::for_user(user_id)).await
    }

    /// Same as `list_active_sessions(user_id).len()`, without loading rows.
    pub async fn count_active_sessions(&self, user_id: &str) -> Result<usize, SessionError> {
        let mut tx = self.store.begin().await?;
        let count = match tx.count(&SessionFilter::for_user(user_id)).await {
            Ok(count) => count,
            Err(err) => return abort(tx, err).await,
        };
        tx.commit().await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Look up a session by its token.
    pub async fn find_by_token(
        &self,
        sid_s: &str,
    ) -> Result<Option<SessionActivity>, SessionError> {
        let found = self.read(&SessionFilter::for_token(sid_s)).await?;
        Ok(found.into_iter().next())
    }

    /// Delete `record` and commit. On success `record` is marked deleted.
    ///
    /// Fails with [`SessionError::NotFound`] if the row is already gone (for
    /// example revoked concurrently) and with [`SessionError::InvalidState`]
    /// if `record` was never persisted or was already revoked through this
    /// handle.
    pub async fn revoke_session(&self, record: &mut SessionActivity) -> Result<(), SessionError> {
        let id = persisted_id(record)?;

        let mut tx = self.store.begin().await?;
        if let Err(err) = tx.delete(id).await {
            return abort(tx, err).await;
        }
        tx.commit().await?;

        record.mark_deleted();
        tracing::info!(user_id = record.user_id(), id, "session revoked");
        Ok(())
    }

    /// Delete every record carrying `sid_s` (logout).
    pub async fn revoke_by_token(&self, sid_s: &str) -> Result<(), SessionError> {
        let removed = self.delete_matching(&SessionFilter::for_token(sid_s)).await?;
        if removed == 0 {
            return Err(SessionError::NotFound);
        }
        tracing::info!(removed, "session revoked by token");
        Ok(())
    }

    /// Delete every session of `user_id`, returning how many were removed.
    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<usize, SessionError> {
        let removed = self.delete_matching(&SessionFilter::for_user(user_id)).await?;
        tracing::info!(user_id, removed, "all sessions revoked");
        Ok(removed)
    }

    /// Delete every session created more than `lifetime` before `now`.
    ///
    /// A lifetime reaching past the earliest representable time expires
    /// nothing.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, SessionError> {
        let Some(cutoff) = now.checked_sub_signed(self.lifetime) else {
            tracing::warn!(lifetime = %self.lifetime, "lifetime out of range; nothing to sweep");
            return Ok(0);
        };
        let removed = self.delete_matching(&SessionFilter::created_before(cutoff)).await?;
        tracing::info!(removed, %cutoff, "expired sessions swept");
        Ok(removed)
    }

    async fn delete_matching(&self, filter: &SessionFilter) -> Result<usize, SessionError> {
        let mut tx = self.store.begin().await?;
        let removed = match tx.delete_matching(filter).await {
            Ok(removed) => removed,
            Err(err) => return abort(tx, err).await,
        };
        tx.commit().await?;
        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }

    async fn read(&self, filter: &SessionFilter) -> Result<Vec<SessionActivity>, SessionError> {
        let mut tx = self.store.begin().await?;
        let rows = match tx.query(filter).await {
            Ok(rows) => rows,
            Err(err) => return abort(tx, err).await,
        };
        tx.commit().await?;
        Ok(rows.into_iter().map(SessionActivity::from).collect())
    }
}

/// Explicit unit of work over session records.
///
/// Reads through the transaction see its own staged writes. Nothing is
/// visible to other callers until [`commit`](Self::commit). Dropping the
/// transaction without committing discards it.
pub struct SessionTransaction {
    tx: Box<dyn SessionTx>,
    added: Vec<(SessionActivity, SessionActivityRow)>,
    revoked: Vec<SessionActivity>,
    poisoned: bool,
}

/// Records written by a committed [`SessionTransaction`].
#[derive(Debug, Default)]
pub struct Committed {
    /// Staged inserts, now persisted.
    pub added: Vec<SessionActivity>,
    /// Revoked handles, now deleted.
    pub revoked: Vec<SessionActivity>,
}

impl SessionTransaction {
    /// Stage `record` for insertion. It becomes persisted on commit.
    pub async fn add(&mut self, record: SessionActivity) -> Result<(), SessionError> {
        if record.state() != RecordState::Unpersisted {
            return Err(SessionError::InvalidState("record is already persisted"));
        }
        let result = self.tx.insert(record.as_insert()).await;
        let row = self.guard(result)?;
        self.added.push((record, row));
        Ok(())
    }

    /// Stage deletion of a persisted `record`.
    ///
    /// The handle is held until commit, which returns it marked deleted in
    /// [`Committed::revoked`]. Rolling back drops it.
    pub async fn revoke(&mut self, record: SessionActivity) -> Result<(), SessionError> {
        let id = persisted_id(&record)?;
        let result = self.tx.delete(id).await;
        self.guard(result)?;
        self.added.retain(|(_, row)| row.id != id);
        self.revoked.push(record);
        Ok(())
    }

    pub async fn list_active_sessions(
        &mut self,
        user_id: &str,
    ) -> Result<Vec<SessionActivity>, SessionError> {
        let result = self.tx.query(&SessionFilter::for_user(user_id)).await;
        let rows = self.guard(result)?;
        Ok(rows.into_iter().map(SessionActivity::from).collect())
    }

    pub async fn count_active_sessions(&mut self, user_id: &str) -> Result<usize, SessionError> {
        let result = self.tx.count(&SessionFilter::for_user(user_id)).await;
        let count = self.guard(result)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Commit every staged write and hand back the records it touched.
    ///
    /// A transaction in which any operation failed is rolled back instead and
    /// reported as [`SessionError::InvalidState`].
    pub async fn commit(self) -> Result<Committed, SessionError> {
        if self.poisoned {
            if let Err(err) = self.tx.rollback().await {
                tracing::warn!(?err, "rollback of failed unit of work failed");
            }
            return Err(SessionError::InvalidState(
                "an earlier operation in this transaction failed",
            ));
        }

        self.tx.commit().await?;

        let added = self
            .added
            .into_iter()
            .map(|(mut record, row)| {
                record.mark_persisted(&row);
                tracing::info!(user_id = record.user_id(), id = row.id, "session recorded");
                record
            })
            .collect();
        let revoked = self
            .revoked
            .into_iter()
            .map(|mut record| {
                tracing::info!(user_id = record.user_id(), id = ?record.id(), "session revoked");
                record.mark_deleted();
                record
            })
            .collect();
        Ok(Committed { added, revoked })
    }

    pub async fn rollback(self) -> Result<(), SessionError> {
        self.tx.rollback().await?;
        Ok(())
    }

    fn guard<T>(&mut self, result: Result<T, StoreError>) -> Result<T, SessionError> {
        result.map_err(|err| {
            self.poisoned = true;
            SessionError::from(err)
        })
    }
}

fn persisted_id(record: &SessionActivity) -> Result<i64, SessionError> {
    match (record.state(), record.id()) {
        (RecordState::Persisted, Some(id)) => Ok(id),
        (RecordState::Unpersisted, _) => {
            Err(SessionError::InvalidState("record was never persisted"))
        }
        (RecordState::Deleted, _) => Err(SessionError::InvalidState("record was already revoked")),
        (RecordState::Persisted, None) => {
            Err(SessionError::InvalidState("persisted record has no id"))
        }
    }
}

/// Roll `tx` back and surface `err`.
async fn abort<T>(tx: Box<dyn SessionTx>, err: StoreError) -> Result<T, SessionError> {
    if let Err(rollback_err) = tx.rollback().await {
        tracing::warn!(?rollback_err, "rollback failed");
    }
    Err(err.into())
}
