//! Delete session records older than the configured lifetime.
//!
//! Usage:
//!   cargo run -p accounts --bin session-sweep
//!
//! Reads DATABASE_URL and SESSION_LIFETIME_SECS from the environment.

use std::process::ExitCode;
use std::sync::Arc;

use accounts::config::Config;
use accounts::db::pool;
use accounts::store::PgSessionStore;
use accounts::SessionActivityManager;
use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let db = match pool::connect(&config.database_url, config.pool_max_size) {
        Ok(db) => db,
        Err(err) => {
            tracing::error!(%err, "failed to build connection pool");
            return ExitCode::FAILURE;
        }
    };

    let sessions = SessionActivityManager::from_config(Arc::new(PgSessionStore::new(db)), &config);
    match sessions.sweep_expired(Utc::now()).await {
        Ok(removed) => {
            tracing::info!(removed, "sweep finished");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let cause = std::error::Error::source(&err).map(ToString::to_string);
            tracing::error!(%err, ?cause, "sweep failed");
            ExitCode::FAILURE
        }
    }
}
