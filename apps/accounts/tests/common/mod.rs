#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use accounts::db::pool::{self, DbPool};
use accounts::directory::{MemoryDirectory, PgDirectory};
use accounts::store::{MemoryStore, PgSessionStore};
use accounts::{SessionActivityManager, User};

/// Session manager over a fresh in-memory store, plus a user directory.
pub struct MemoryHarness {
    pub store: MemoryStore,
    pub directory: MemoryDirectory,
    pub sessions: SessionActivityManager,
}

pub fn memory_harness() -> MemoryHarness {
    harness_over(MemoryStore::new())
}

pub fn harness_over(store: MemoryStore) -> MemoryHarness {
    let sessions = SessionActivityManager::new(Arc::new(store.clone()));
    MemoryHarness {
        store,
        directory: MemoryDirectory::new(),
        sessions,
    }
}

/// Create a unique test user.
///
/// Uses a random suffix so tests don't clash.
pub fn create_test_user(directory: &MemoryDirectory) -> User {
    let suffix: u32 = rand::random();
    directory
        .create_user(&format!("test_{suffix}@example.com"))
        .expect("create test user")
}

pub struct PgHarness {
    pub db: DbPool,
    pub directory: PgDirectory,
    pub sessions: SessionActivityManager,
}

/// Build a harness connected to the dev database with a `_test` suffix.
///
/// Returns `None` when `DATABASE_URL` is not configured so the Postgres
/// suite can be skipped on machines without a database.
pub fn pg_harness() -> Option<PgHarness> {
    // Load .env from the crate root so tests work from any cwd.
    let env_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(env_path);

    let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty())?;
    let database_url = with_test_db_suffix(&database_url);

    static MIGRATED: OnceLock<()> = OnceLock::new();
    MIGRATED.get_or_init(|| {
        accounts::db::migrate::run_pending(&database_url).expect("run migrations");
    });

    let db = pool::connect(&database_url, 4).expect("build pool");
    let sessions = SessionActivityManager::new(Arc::new(PgSessionStore::new(db.clone())));
    Some(PgHarness {
        directory: PgDirectory::new(db.clone()),
        db,
        sessions,
    })
}

pub async fn create_pg_test_user(directory: &PgDirectory) -> User {
    let suffix: u32 = rand::random();
    directory
        .create_user(&format!("test_{suffix}@example.com"))
        .await
        .expect("insert test user")
}

/// Clean up a test user and, by cascade, their sessions.
pub async fn cleanup_pg_test_user(directory: &PgDirectory, user_id: &str) {
    directory.delete_user(user_id).await.ok();
}

fn with_test_db_suffix(database_url: &str) -> String {
    let mut parts = database_url.splitn(2, '?');
    let base = parts.next().unwrap_or(database_url);
    let query = parts.next();

    let mut base_parts = base.rsplitn(2, '/');
    let db_name = base_parts.next().unwrap_or("");
    let prefix = base_parts.next().unwrap_or("");

    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    let mut updated = format!("{prefix}/{db_name}_test");
    if let Some(query) = query {
        updated.push('?');
        updated.push_str(query);
    }
    updated
}
