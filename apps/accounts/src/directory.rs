//! Lookup of user identities.
//!
//! The session subsystem only needs a stable user id; the directory is the
//! collaborator that issues them.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use accounts_common::PrefixedId;
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::OptionalExtension;

use crate::db::pool::DbPool;
use crate::db::schema::users;
use crate::error::StoreError;
use crate::models::{NewUser, User};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryDirectory {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new active user with a fresh `usr_` id.
    pub fn create_user(&self, email: &str) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if users.values().any(|u| u.email == email) {
            return Err(StoreError::UniqueViolation("users.email".into()));
        }
        let user = User {
            id: User::generate(),
            email: email.to_string(),
            active: true,
            created_at: Utc::now(),
        };
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(user_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgDirectory {
    pool: DbPool,
}

impl PgDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new active user with a fresh `usr_` id.
    pub async fn create_user(&self, email: &str) -> Result<User, StoreError> {
        let mut conn = self.pool.get().await?;
        let id = User::generate();
        let user = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(users::table)
                .values(NewUser { id: &id, email })
                .returning(User::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(user)
    }

    /// Remove a user; their session rows go with them (`ON DELETE CASCADE`).
    pub async fn delete_user(&self, user_id: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        diesel_async::RunQueryDsl::execute(diesel::delete(users::table.find(user_id)), &mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PgDirectory {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.get().await?;
        let user = diesel_async::RunQueryDsl::get_result(
            users::table.find(user_id).select(User::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(user)
    }
}
