use async_trait::async_trait;
use diesel::dsl::count_star;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::Object;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, TransactionManager};

use super::{SessionFilter, SessionStore, SessionTx};
use crate::db::pool::DbPool;
use crate::db::schema::session_activity;
use crate::error::StoreError;
use crate::models::{NewSessionActivityRow, SessionActivityRow};

/// PostgreSQL-backed store.
///
/// Each transaction checks out its own pooled connection and holds it until
/// commit or rollback.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn begin(&self) -> Result<Box<dyn SessionTx>, StoreError> {
        let mut conn = self.pool.get().await?;
        AnsiTransactionManager::begin_transaction(&mut *conn).await?;
        Ok(Box::new(PgSessionTx { conn }))
    }
}

/// Open `BEGIN … COMMIT` block on a pooled connection.
///
/// If the handle is dropped while the transaction is still open, the pool
/// sees a broken transaction manager on recycle and discards the connection,
/// which aborts the transaction server-side.
struct PgSessionTx {
    conn: Object<AsyncPgConnection>,
}

fn filtered(filter: &SessionFilter) -> session_activity::BoxedQuery<'_, Pg> {
    let mut query = session_activity::table.into_boxed();
    if let Some(user_id) = filter.user_id.as_deref() {
        query = query.filter(session_activity::user_id.eq(user_id));
    }
    if let Some(sid_s) = filter.sid_s.as_deref() {
        query = query.filter(session_activity::sid_s.eq(sid_s));
    }
    if let Some(cutoff) = filter.created_before {
        query = query.filter(session_activity::created.lt(cutoff));
    }
    query
}

#[async_trait]
impl SessionTx for PgSessionTx {
    async fn insert(
        &mut self,
        row: NewSessionActivityRow<'_>,
    ) -> Result<SessionActivityRow, StoreError> {
        let inserted = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(session_activity::table)
                .values(row)
                .returning(SessionActivityRow::as_returning()),
            &mut *self.conn,
        )
        .await?;
        Ok(inserted)
    }

    async fn delete(&mut self, id: i64) -> Result<(), StoreError> {
        let deleted = diesel_async::RunQueryDsl::execute(
            diesel::delete(session_activity::table.find(id)),
            &mut *self.conn,
        )
        .await?;
        if deleted == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_matching(&mut self, filter: &SessionFilter) -> Result<u64, StoreError> {
        let ids: Vec<i64> = diesel_async::RunQueryDsl::load(
            filtered(filter).select(session_activity::id),
            &mut *self.conn,
        )
        .await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = diesel_async::RunQueryDsl::execute(
            diesel::delete(session_activity::table.filter(session_activity::id.eq_any(ids))),
            &mut *self.conn,
        )
        .await?;
        Ok(deleted as u64)
    }

    async fn query(
        &mut self,
        filter: &SessionFilter,
    ) -> Result<Vec<SessionActivityRow>, StoreError> {
        let rows = diesel_async::RunQueryDsl::load(
            filtered(filter)
                .order(session_activity::id.asc())
                .select(SessionActivityRow::as_select()),
            &mut *self.conn,
        )
        .await?;
        Ok(rows)
    }

    async fn count(&mut self, filter: &SessionFilter) -> Result<i64, StoreError> {
        let count = diesel_async::RunQueryDsl::get_result(
            filtered(filter).select(count_star()),
            &mut *self.conn,
        )
        .await?;
        Ok(count)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Err(err) = AnsiTransactionManager::commit_transaction(&mut *self.conn).await {
            if let Err(rollback_err) =
                AnsiTransactionManager::rollback_transaction(&mut *self.conn).await
            {
                tracing::debug!(?rollback_err, "rollback after failed commit");
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
        AnsiTransactionManager::rollback_transaction(&mut *self.conn).await?;
        Ok(())
    }
}
