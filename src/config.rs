use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: String,
    pub notification_topic: String,
    pub store_timeout: Duration,
    pub outbox: OutboxConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL is not set")?;
        let parsed = |key: &str, default: u64| -> anyhow::Result<u64> {
            match lookup(key) {
                Some(v) => v
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be a non-negative integer, got {v:?}")),
                None => Ok(default),
            }
        };

        let outbox = OutboxConfig {
            poll_interval: Duration::from_secs(parsed("OUTBOX_POLL_SECS", 5)?.max(1)),
            batch_size: i64::try_from(parsed("OUTBOX_BATCH_SIZE", 100)?.max(1))
                .context("OUTBOX_BATCH_SIZE is out of range")?,
        };
        let db_max_connections = u32::try_from(parsed("DB_MAX_CONNECTIONS", 10)?)
            .context("DB_MAX_CONNECTIONS is out of range")?;

        Ok(Self {
            database_url,
            db_max_connections,
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            notification_topic: lookup("NOTIFICATION_TOPIC")
                .unwrap_or_else(|| "user-changes".into()),
            store_timeout: Duration::from_millis(parsed("STORE_TIMEOUT_MS", 5000)?),
            outbox,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let cfg = AppConfig::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://x/y")]))
            .expect("config");
        assert_eq!(cfg.database_url, "postgres://x/y");
        assert_eq!(cfg.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(cfg.notification_topic, "user-changes");
        assert_eq!(cfg.store_timeout, Duration::from_millis(5000));
        assert_eq!(cfg.outbox.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.outbox.batch_size, 100);
        assert_eq!(cfg.db_max_connections, 10);
    }

    #[test]
    fn overrides_are_read() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x/y"),
            ("NOTIFICATION_TOPIC", "audit"),
            ("STORE_TIMEOUT_MS", "250"),
            ("OUTBOX_BATCH_SIZE", "7"),
        ]))
        .expect("config");
        assert_eq!(cfg.notification_topic, "audit");
        assert_eq!(cfg.store_timeout, Duration::from_millis(250));
        assert_eq!(cfg.outbox.batch_size, 7);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn out_of_range_numbers_fail_instead_of_wrapping() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x/y"),
            ("OUTBOX_BATCH_SIZE", "18446744073709551615"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("OUTBOX_BATCH_SIZE"));

        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x/y"),
            ("DB_MAX_CONNECTIONS", "4294967296"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));
    }

    #[test]
    fn malformed_number_is_an_error() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x/y"),
            ("STORE_TIMEOUT_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("STORE_TIMEOUT_MS"));
    }
}
