use std::path::PathBuf;
use std::time::Duration;

const WAL_FILE_NAME: &str = "reservations.wal";

/// Process configuration, read from `ROOMLOCK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// How long an admission may wait for a room lock. `None` waits forever.
    pub lock_timeout: Option<Duration>,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            lock_timeout: None,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let data_dir = lookup("ROOMLOCK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let lock_timeout = lookup("ROOMLOCK_LOCK_TIMEOUT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis);
        let metrics_port = lookup("ROOMLOCK_METRICS_PORT").and_then(|s| s.parse().ok());

        Self {
            data_dir,
            lock_timeout,
            metrics_port,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}
