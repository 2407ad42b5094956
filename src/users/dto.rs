use serde::{Deserialize, Serialize};

use super::repo_types::Filter;
use super::services::{UserChanges, UserDraft};

/// Request body for user creation.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub nick_name: String,
    pub password: String,
    pub email: String,
    pub country: String,
}

impl CreateUserRequest {
    pub fn into_parts(self) -> (UserDraft, String) {
        let draft = UserDraft {
            first_name: self.first_name,
            last_name: self.last_name,
            nick_name: self.nick_name,
            email: self.email,
            country: self.country,
        };
        (draft, self.password)
    }
}

/// Request body for user update; every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
}

impl UpdateUserRequest {
    pub fn into_parts(self, id: i64) -> (UserChanges, Option<String>) {
        let changes = UserChanges {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            nick_name: self.nick_name,
            email: self.email,
            country: self.country,
        };
        (changes, self.password)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub country: Option<String>,
    pub nick_name: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

impl ListUsersQuery {
    pub fn filter(&self) -> Filter {
        Filter {
            country: self.country.clone(),
            nick_name: self.nick_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub id: i64,
    pub updated: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub store: &'static str,
}
