use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::password::{hash_password, verify_password};
use super::repo::UserStore;
use super::repo_types::{Filter, NewUser, Page, User, UserPatch};
use crate::error::{UserError, UserResult};
use crate::notify::ChangeNotifier;

/// Fields of a user to be created. The password travels separately.
#[derive(Debug, Clone)]
pub struct UserDraft {
    pub first_name: String,
    pub last_name: String,
    pub nick_name: String,
    pub email: String,
    pub country: String,
}

/// Requested update. Absent or empty fields mean "keep the stored value".
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nick_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub count: i64,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    notifier: Arc<dyn ChangeNotifier>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, notifier: Arc<dyn ChangeNotifier>) -> Self {
        Self { store, notifier }
    }

    #[instrument(skip(self, draft, password), fields(nick_name = %draft.nick_name))]
    pub async fn create(&self, draft: UserDraft, password: &str) -> UserResult<User> {
        // Fast path only; the unique indexes settle concurrent duplicates.
        ensure_absent(self.store.get_by_email(&draft.email).await)?;
        ensure_absent(self.store.get_by_nickname(&draft.nick_name).await)?;

        let new_user = NewUser {
            first_name: draft.first_name,
            last_name: draft.last_name,
            nick_name: draft.nick_name,
            password_hash: hash_password(password)?,
            email: draft.email,
            country: draft.country.to_uppercase(),
        };
        let user = self.store.create(&new_user).await?;
        info!(user_id = user.id, "user created");
        Ok(user)
    }

    #[instrument(skip(self, changes, password), fields(user_id = changes.id))]
    pub async fn update(&self, changes: UserChanges, password: Option<&str>) -> UserResult<()> {
        let current = self.store.get_by_id(changes.id).await?;
        let patch = diff(&current, changes, password)?;
        if patch.is_empty() {
            return Err(UserError::NoChanges);
        }

        let event_id = self.store.update_by_id(&patch).await?;

        // The row is committed at this point; a failed publish stays pending
        // in the outbox and the relay delivers it later.
        if let Err(e) = self.notifier.publish(patch.id).await {
            warn!(user_id = patch.id, event_id, error = %e, "change notification failed");
            return Err(e);
        }
        if let Err(e) = self.store.ack_change(event_id).await {
            warn!(event_id, error = %e, "could not ack change event; it will be redelivered");
        }

        info!(user_id = patch.id, "user updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: i64) -> UserResult<()> {
        self.store.remove_by_id(id).await?;
        info!(user_id = id, "user removed");
        Ok(())
    }

    /// One page of matching users plus the total match count.
    #[instrument(skip(self))]
    pub async fn get(&self, filter: Filter, page: Page) -> UserResult<UserPage> {
        let filter = Filter {
            country: filter.country.map(|c| c.to_uppercase()),
            ..filter
        };
        let users = self.store.list(&filter, page).await?;
        let count = self.store.count(&filter).await?;
        Ok(UserPage { users, count })
    }
}

fn ensure_absent(lookup: UserResult<User>) -> UserResult<()> {
    match lookup {
        Ok(_) => Err(UserError::AlreadyExists),
        Err(UserError::NotFound) => Ok(()),
        Err(e) => Err(e),
    }
}

fn changed(requested: Option<String>, stored: &str) -> Option<String> {
    requested.filter(|v| !v.is_empty() && v.as_str() != stored)
}

/// Keeps only the fields that would actually change the stored row.
fn diff(current: &User, changes: UserChanges, password: Option<&str>) -> UserResult<UserPatch> {
    let password_hash = match password.filter(|p| !p.is_empty()) {
        Some(p) if !verify_password(p, &current.password_hash)? => Some(hash_password(p)?),
        _ => None,
    };

    Ok(UserPatch {
        id: current.id,
        first_name: changed(changes.first_name, &current.first_name),
        last_name: changed(changes.last_name, &current.last_name),
        nick_name: changed(changes.nick_name, &current.nick_name),
        email: changed(changes.email, &current.email),
        country: changed(changes.country.map(|c| c.to_uppercase()), &current.country),
        password_hash,
    })
}
