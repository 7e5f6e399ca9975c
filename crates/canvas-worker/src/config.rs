use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_DB_PATH: &str = "server.db";
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub db_path: PathBuf,
    pub flush_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl WorkerConfig {
    /// Read `CANVAS_DB_PATH` and `CANVAS_FLUSH_INTERVAL_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("CANVAS_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(secs) = lookup("CANVAS_FLUSH_INTERVAL_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("CANVAS_FLUSH_INTERVAL_SECS is not a number: {:?}", secs))?;
            anyhow::ensure!(secs > 0, "CANVAS_FLUSH_INTERVAL_SECS must be at least 1");
            config.flush_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
