//! Runtime configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::session::{DEFAULT_DEBOUNCE, MAX_DEBOUNCE};
use crate::workflow::{DEFAULT_UNDO_WINDOW, MAX_UNDO_WINDOW};

const DEFAULT_PORT: u16 = 3000;

#[derive(Clone, Debug)]
pub struct Config {
    /// SQLite database file (from DOCFLOW_DB_PATH). `None` uses the platform data directory.
    pub db_path: Option<PathBuf>,
    /// HTTP port (from DOCFLOW_PORT)
    pub port: u16,
    /// Payment undo window W (from DOCFLOW_UNDO_WINDOW_SECS)
    pub undo_window: Duration,
    /// Quiet period before an edit is saved (from DOCFLOW_DEBOUNCE_MS)
    pub debounce: Duration,
    /// AI content generator endpoint (from DOCFLOW_AI_URL)
    pub ai_url: Option<String>,
    /// AI content generator key (from DOCFLOW_AI_API_KEY)
    pub ai_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Malformed numeric values fall back to their defaults. Durations above
    /// their maximum are capped.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!("Ignoring malformed {}={:?}", key, raw);
                    None
                }
            }
        };

        let port = number("DOCFLOW_PORT")
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT);
        let undo_window = number("DOCFLOW_UNDO_WINDOW_SECS")
            .map(Duration::from_secs)
            .map(|window| capped("DOCFLOW_UNDO_WINDOW_SECS", window, MAX_UNDO_WINDOW))
            .unwrap_or(DEFAULT_UNDO_WINDOW);
        let debounce = number("DOCFLOW_DEBOUNCE_MS")
            .map(Duration::from_millis)
            .map(|debounce| capped("DOCFLOW_DEBOUNCE_MS", debounce, MAX_DEBOUNCE))
            .unwrap_or(DEFAULT_DEBOUNCE);

        Self {
            db_path: lookup("DOCFLOW_DB_PATH").map(PathBuf::from),
            port,
            undo_window,
            debounce,
            ai_url: lookup("DOCFLOW_AI_URL").filter(|s| !s.trim().is_empty()),
            ai_api_key: lookup("DOCFLOW_AI_API_KEY").filter(|s| !s.trim().is_empty()),
        }
    }
}

fn capped(key: &str, value: Duration, max: Duration) -> Duration {
    if value > max {
        tracing::warn!("{} exceeds the maximum of {:?}, using the maximum", key, max);
        max
    } else {
        value
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
