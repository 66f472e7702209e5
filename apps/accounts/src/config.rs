use chrono::Duration;

/// Default session lifetime: 31 days.
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 31 * 24 * 60 * 60;

/// Default maximum number of pooled database connections.
pub const DEFAULT_POOL_MAX_SIZE: usize = 20;

/// Accounts configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// How long a session record stays valid after it was created.
    pub session_lifetime: Duration,
    /// Upper bound on pooled connections.
    pub pool_max_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| panic!("DATABASE_URL env var is required"));
        let session_lifetime = lookup("SESSION_LIFETIME_SECS")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .unwrap_or_else(|| Duration::seconds(DEFAULT_SESSION_LIFETIME_SECS));
        let pool_max_size = lookup("DB_POOL_MAX_SIZE")
            .and_then(|v| v.parse().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_POOL_MAX_SIZE);

        Self {
            database_url,
            session_lifetime,
            pool_max_size,
        }
    }
}
