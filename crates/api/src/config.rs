use std::time::Duration;

use anyhow::Context;

use crate::auth::AuthConfig;

/// Process configuration, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Without a database the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub max_db_connections: u32,
    pub port: u16,
    pub sweep_interval: Duration,
    pub renewal_reminder_lead: chrono::Duration,
    pub auth: AuthConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        let sweep_secs: u64 = env_or("SWEEP_INTERVAL_SECS", 60)?;
        let reminder_minutes: i64 = env_or("RENEWAL_REMINDER_MINUTES", 120)?;

        Ok(Self {
            database_url,
            max_db_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
            port: env_or("PORT", 8080)?,
            sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            renewal_reminder_lead: chrono::Duration::minutes(reminder_minutes),
            auth: AuthConfig::from_env()?,
        })
    }
}
