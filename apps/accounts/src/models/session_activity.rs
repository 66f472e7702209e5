use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::session_activity;

/// Lifecycle of a [`SessionActivity`].
///
/// `Unpersisted → Persisted → Deleted`; there is no way out of `Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Unpersisted,
    Persisted,
    Deleted,
}

/// One authenticated session of a user.
///
/// `id` and `created` are assigned by the store and stay `None` until the
/// record has been committed once. `user_id` and `sid_s` never change after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionActivity {
    id: Option<i64>,
    user_id: String,
    sid_s: String,
    created: Option<DateTime<Utc>>,
    ip: Option<String>,
    user_agent: Option<String>,
    state: RecordState,
}

impl SessionActivity {
    /// Build an unpersisted record for `user_id` carrying the opaque token `sid_s`.
    pub fn new(user_id: impl Into<String>, sid_s: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            sid_s: sid_s.into(),
            created: None,
            ip: None,
            user_agent: None,
            state: RecordState::Unpersisted,
        }
    }

    /// Attach the client address seen at login.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Attach the client user agent seen at login.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn sid_s(&self) -> &str {
        &self.sid_s
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// `true` once the record is persisted and `created + lifetime` has passed.
    pub fn is_expired(&self, lifetime: Duration, now: DateTime<Utc>) -> bool {
        match (self.state, self.created) {
            (RecordState::Persisted, Some(created)) => created
                .checked_add_signed(lifetime)
                .is_some_and(|expires| expires <= now),
            _ => false,
        }
    }

    pub(crate) fn as_insert(&self) -> NewSessionActivityRow<'_> {
        NewSessionActivityRow {
            user_id: &self.user_id,
            sid_s: &self.sid_s,
            ip: self.ip.as_deref(),
            user_agent: self.user_agent.as_deref(),
        }
    }

    /// Take the store-assigned columns from the committed row.
    pub(crate) fn mark_persisted(&mut self, row: &SessionActivityRow) {
        self.id = Some(row.id);
        self.created = Some(row.created);
        self.state = RecordState::Persisted;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.state = RecordState::Deleted;
    }
}

impl From<SessionActivityRow> for SessionActivity {
    fn from(row: SessionActivityRow) -> Self {
        Self {
            id: Some(row.id),
            user_id: row.user_id,
            sid_s: row.sid_s,
            created: Some(row.created),
            ip: row.ip,
            user_agent: row.user_agent,
            state: RecordState::Persisted,
        }
    }
}

/// Full `session_activity` row as the store returns it.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = session_activity)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SessionActivityRow {
    pub id: i64,
    pub user_id: String,
    pub sid_s: String,
    pub created: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Insertable struct for a new row; `id` and `created` are column defaults.
#[derive(Debug, Clone, Copy, Insertable)]
#[diesel(table_name = session_activity)]
pub struct NewSessionActivityRow<'a> {
    pub user_id: &'a str,
    pub sid_s: &'a str,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}
