use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings, read from `CARRENT_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub admin_email: String,
    pub mail_from: String,
    pub token_ttl: Duration,
}

pub const WAL_FILE_NAME: &str = "carrent.wal";

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset and unparsable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let ttl_days: u64 = parsed(&lookup, "CARRENT_TOKEN_TTL_DAYS").unwrap_or(30);

        Self {
            bind: lookup("CARRENT_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "CARRENT_PORT").unwrap_or(5000),
            data_dir: PathBuf::from(lookup("CARRENT_DATA_DIR").unwrap_or_else(|| "./data".into())),
            metrics_port: parsed(&lookup, "CARRENT_METRICS_PORT"),
            compact_threshold: parsed(&lookup, "CARRENT_COMPACT_THRESHOLD").unwrap_or(1000),
            admin_email: lookup("CARRENT_ADMIN_EMAIL").unwrap_or_else(|| "admin@localhost".into()),
            mail_from: lookup("CARRENT_MAIL_FROM").unwrap_or_else(|| "noreply@localhost".into()),
            token_ttl: Duration::from_secs(ttl_days.saturating_mul(86_400)),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}
