use crate::config::AppConfig;
use crate::notify::{ChangeNotifier, OutboxRelay, RedisNotifier};
use crate::users::repo::{PgUserStore, UserStore};
use crate::users::services::UserService;
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub users: UserService,
}

impl AppState {
    /// Connects Postgres and Redis and wires the service. Also returns the
    /// outbox relay sharing the same handles, for the caller to schedule.
    pub async fn init() -> anyhow::Result<(Self, OutboxRelay)> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let notifier = Arc::new(
            RedisNotifier::connect(
                &config.redis_url,
                &config.notification_topic,
                config.store_timeout,
            )
            .await
            .context("connect to redis")?,
        ) as Arc<dyn ChangeNotifier>;

        let store =
            Arc::new(PgUserStore::new(db.clone(), config.store_timeout)) as Arc<dyn UserStore>;

        let relay = OutboxRelay::new(store.clone(), notifier.clone(), config.outbox.batch_size);
        let users = UserService::new(store, notifier);

        Ok((Self { db, config, users }, relay))
    }
}
