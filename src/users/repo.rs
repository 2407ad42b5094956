use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::query::{build_count, build_select, build_update, Param, USERS_TABLE, USER_COLUMNS};
use super::repo_types::{ChangeEvent, Filter, NewUser, Page, User, UserPatch};
use crate::error::{with_deadline, UserError, UserResult};

/// Persistence of user rows and of the change outbox.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user and returns the stored row with its assigned id.
    async fn create(&self, user: &NewUser) -> UserResult<User>;
    /// Applies `patch` and records a change event in the same transaction.
    /// Returns the event id.
    async fn update_by_id(&self, patch: &UserPatch) -> UserResult<i64>;
    async fn remove_by_id(&self, id: i64) -> UserResult<()>;
    async fn get_by_id(&self, id: i64) -> UserResult<User>;
    async fn get_by_email(&self, email: &str) -> UserResult<User>;
    async fn get_by_nickname(&self, nick_name: &str) -> UserResult<User>;
    async fn list(&self, filter: &Filter, page: Page) -> UserResult<Vec<User>>;
    async fn count(&self, filter: &Filter) -> UserResult<i64>;
    /// Undelivered change events, oldest first.
    async fn pending_changes(&self, limit: i64) -> UserResult<Vec<ChangeEvent>>;
    /// Removes a delivered event from the outbox.
    async fn ack_change(&self, event_id: i64) -> UserResult<()>;
}

macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                Param::Text(value) => query.bind(value.as_str()),
                Param::Int(value) => query.bind(*value),
            };
        }
        query
    }};
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
    timeout: Duration,
}

impl PgUserStore {
    pub fn new(db: PgPool, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    async fn deadline<T, F>(&self, op: &'static str, fut: F) -> UserResult<T>
    where
        F: Future<Output = UserResult<T>>,
    {
        with_deadline(self.timeout, op, fut).await
    }

    async fn fetch_one_by(&self, column: &'static str, value: Param) -> UserResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM {USERS_TABLE} WHERE {column} = $1");
        let params = [value];
        let row = bind_params!(sqlx::query_as::<_, User>(&sql), &params)
            .fetch_optional(&self.db)
            .await?;
        row.ok_or(UserError::NotFound)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: &NewUser) -> UserResult<User> {
        self.deadline("create user", async {
            let sql = format!(
                "INSERT INTO {USERS_TABLE} (first_name, last_name, nick_name, password, email, country) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
            );
            let created = sqlx::query_as::<_, User>(&sql)
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(&user.nick_name)
                .bind(&user.password_hash)
                .bind(&user.email)
                .bind(&user.country)
                .fetch_one(&self.db)
                .await
                .map_err(UserError::from_write)?;
            debug!(user_id = created.id, "user inserted");
            Ok(created)
        })
        .await
    }

    async fn update_by_id(&self, patch: &UserPatch) -> UserResult<i64> {
        self.deadline("update user", async {
            let stmt = build_update(patch, USERS_TABLE);
            let mut tx = self.db.begin().await?;

            let result = bind_params!(sqlx::query(&stmt.sql), &stmt.params)
                .execute(&mut *tx)
                .await
                .map_err(UserError::from_write)?;
            if result.rows_affected() == 0 {
                return Err(UserError::NotFound);
            }

            let event_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO user_change_outbox (user_id)
                VALUES ($1)
                RETURNING id
                "#,
            )
            .bind(patch.id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            debug!(user_id = patch.id, event_id, "user updated");
            Ok(event_id)
        })
        .await
    }

    async fn remove_by_id(&self, id: i64) -> UserResult<()> {
        self.deadline("remove user", async {
            let sql = format!("DELETE FROM {USERS_TABLE} WHERE id = $1");
            let result = sqlx::query(&sql).bind(id).execute(&self.db).await?;
            if result.rows_affected() == 0 {
                return Err(UserError::NotFound);
            }
            debug!(user_id = id, "user removed");
            Ok(())
        })
        .await
    }

    async fn get_by_id(&self, id: i64) -> UserResult<User> {
        self.deadline("get user by id", self.fetch_one_by("id", Param::Int(id)))
            .await
    }

    async fn get_by_email(&self, email: &str) -> UserResult<User> {
        self.deadline(
            "get user by email",
            self.fetch_one_by("email", Param::Text(email.to_owned())),
        )
        .await
    }

    async fn get_by_nickname(&self, nick_name: &str) -> UserResult<User> {
        self.deadline(
            "get user by nickname",
            self.fetch_one_by("nick_name", Param::Text(nick_name.to_owned())),
        )
        .await
    }

    async fn list(&self, filter: &Filter, page: Page) -> UserResult<Vec<User>> {
        self.deadline("list users", async {
            let stmt = build_select(filter, page);
            let rows = bind_params!(sqlx::query_as::<_, User>(&stmt.sql), &stmt.params)
                .fetch_all(&self.db)
                .await?;
            Ok(rows)
        })
        .await
    }

    async fn count(&self, filter: &Filter) -> UserResult<i64> {
        self.deadline("count users", async {
            let stmt = build_count(filter);
            let total: i64 = bind_params!(sqlx::query_scalar::<_, i64>(&stmt.sql), &stmt.params)
                .fetch_one(&self.db)
                .await?;
            Ok(total)
        })
        .await
    }

    async fn pending_changes(&self, limit: i64) -> UserResult<Vec<ChangeEvent>> {
        self.deadline("list pending changes", async {
            let rows = sqlx::query_as::<_, ChangeEvent>(
                r#"
                SELECT id, user_id
                  FROM user_change_outbox
                 ORDER BY id ASC
                 LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(&self.db)
            .await?;
            Ok(rows)
        })
        .await
    }

    async fn ack_change(&self, event_id: i64) -> UserResult<()> {
        self.deadline("ack change", async {
            sqlx::query("DELETE FROM user_change_outbox WHERE id = $1")
            .bind(event_id)
            .execute(&self.db)
            .await?;
            Ok(())
        })
        .await
    }
}
