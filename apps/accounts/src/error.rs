use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::deadpool::PoolError;
use thiserror::Error;

/// Failure reported by a store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The targeted row does not exist (or no longer exists at commit).
    #[error("row not found")]
    NotFound,
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),
    /// The store could not be reached or the connection was lost.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                tracing::error!(detail = info.message(), "unique violation");
                Self::UniqueViolation(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                tracing::error!(detail = info.message(), "foreign key violation");
                Self::ForeignKeyViolation(info.message().to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
                tracing::error!(detail = info.message(), "connection closed");
                Self::Unavailable(info.message().to_string())
            }
            other => {
                tracing::error!(?other, "database error");
                Self::Query(other.to_string())
            }
        }
    }
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        tracing::error!(?err, "pool error");
        Self::Unavailable(err.to_string())
    }
}

/// Error surfaced by the session activity manager.
///
/// Display strings stay generic; the store-level cause is only reachable
/// through [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// Store-level failure during insert, delete, query or commit.
    #[error("session store error")]
    Persistence(#[source] StoreError),
    /// The targeted session record no longer exists.
    #[error("session not found")]
    NotFound,
    /// The record is in a lifecycle state that does not allow the operation.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            other => Self::Persistence(other),
        }
    }
}
