use accounts_common::id::prefix;
use accounts_common::PrefixedId;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::users;
use crate::error::SessionError;
use crate::models::SessionActivity;
use crate::sessions::SessionActivityManager;

/// Full user row from the database.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: String,
    pub email: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl PrefixedId for User {
    const PREFIX: &'static str = prefix::USER;
}

impl User {
    /// Sessions currently stored for this user.
    ///
    /// Every call re-queries the store. The returned `Vec` is a snapshot and
    /// does not follow later commits.
    pub async fn active_sessions(
        &self,
        sessions: &SessionActivityManager,
    ) -> Result<Vec<SessionActivity>, SessionError> {
        sessions.list_active_sessions(&self.id).await
    }
}

/// Insertable struct for creating a new user.
#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub email: &'a str,
}
