use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::error::{UserError, UserResult};

pub const MAX_PAGE_SIZE: u32 = 100;

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub nick_name: String,
    #[serde(skip_serializing)]
    #[sqlx(rename = "password")]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub email: String,
    pub country: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Insert shape; the password is already hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub nick_name: String,
    pub password_hash: String,
    pub email: String,
    pub country: String,
}

/// Partial user for updates. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub password_hash: Option<String>,
}

impl UserPatch {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.nick_name.is_none()
            && self.email.is_none()
            && self.country.is_none()
            && self.password_hash.is_none()
    }
}

/// Read-side criteria. Empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub country: Option<String>,
    pub nick_name: Option<String>,
}

/// One-indexed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: u32,
    size: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> UserResult<Self> {
        if number == 0 {
            return Err(UserError::InvalidPage("page starts at 1".into()));
        }
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(UserError::InvalidPage(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self { number, size })
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.number - 1) * i64::from(self.size)
    }
}

/// Pending entry of the change outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct ChangeEvent {
    pub id: i64,
    pub user_id: i64,
}
