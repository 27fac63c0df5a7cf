use std::path::PathBuf;
use std::time::Duration;

use hearth_jobs::BatchLimits;
use hearth_jobs::worker::WorkerConfig;

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub session_ttl_days: i64,
    pub worker: WorkerConfig,
    pub cleanup_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let db_path: PathBuf = std::env::var("HEARTH_DB_PATH")
            .unwrap_or_else(|_| "hearth.db".into())
            .into();
        let host = std::env::var("HEARTH_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("HEARTH_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()?;

        let defaults = BatchLimits::default();
        let limits = BatchLimits {
            messages_per_step: env_or("HEARTH_DELETE_MESSAGE_BATCH", defaults.messages_per_step).max(1),
            channels_per_step: env_or("HEARTH_DELETE_CHANNEL_BATCH", defaults.channels_per_step).max(1),
            memberships_per_step: env_or("HEARTH_DELETE_MEMBERSHIP_BATCH", defaults.memberships_per_step).max(1),
        };

        let worker = WorkerConfig {
            poll_interval: Duration::from_millis(env_or("HEARTH_WORKER_POLL_MS", 250u64).max(10)),
            max_attempts: env_or("HEARTH_WORKER_MAX_ATTEMPTS", 8i64).max(1),
            limits,
            ..WorkerConfig::default()
        };

        Ok(Self {
            db_path,
            host,
            port,
            session_ttl_days: env_or("HEARTH_SESSION_TTL_DAYS", 30i64).max(1),
            worker,
            cleanup_interval_secs: env_or("HEARTH_CLEANUP_INTERVAL_SECS", 3600u64).max(1),
        })
    }
}

/// Optional numeric setting; unset or unparsable falls back to `default`.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
