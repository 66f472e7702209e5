//! User accounts: session activity tracking over a transactional store.

pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod models;
pub mod sessions;
pub mod store;
pub mod tokens;

pub use error::{SessionError, StoreError};
pub use models::{RecordState, SessionActivity, User};
pub use sessions::{Committed, SessionActivityManager, SessionTransaction};
