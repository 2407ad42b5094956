use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Failure conditions of the user record layer, surfaced unchanged to callers.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,

    #[error("user already exists")]
    AlreadyExists,

    #[error("the information has no changes")]
    NoChanges,

    #[error("invalid page: {0}")]
    InvalidPage(String),

    #[error("store failure: {0}")]
    Store(#[from] sqlx::Error),

    #[error("notification failure: {0}")]
    Notification(#[source] redis::RedisError),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

impl UserError {
    /// Unique-constraint violations are the authoritative duplicate signal.
    pub(crate) fn from_write(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => UserError::AlreadyExists,
            _ => UserError::Store(e),
        }
    }
}

pub type UserResult<T> = Result<T, UserError>;

/// Runs `fut` under `limit`; on expiry the future is dropped and `op` is
/// reported as timed out.
pub(crate) async fn with_deadline<T, F>(
    limit: Duration,
    op: &'static str,
    fut: F,
) -> UserResult<T>
where
    F: Future<Output = UserResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(op, timeout_ms = limit.as_millis() as u64, "call timed out");
            Err(UserError::Timeout(op))
        }
    }
}
