pub mod session_activity;
pub mod user;

pub use session_activity::{NewSessionActivityRow, RecordState, SessionActivity, SessionActivityRow};
pub use user::{NewUser, User};
