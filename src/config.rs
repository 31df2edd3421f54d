use std::path::PathBuf;
use std::str::FromStr;

use crate::limits::DEFAULT_NOT_AFTER;
use crate::model::{parse_timestamp, Span, Timestamp};

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_timestamp(key: &str) -> Option<Timestamp> {
    std::env::var(key).ok().and_then(|s| parse_timestamp(&s).ok())
}

/// Settings for the store server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind: env_or("ROOMCAL_BIND", "0.0.0.0".to_string()),
            port: env_or("ROOMCAL_PORT", 5480),
            data_dir: PathBuf::from(env_or("ROOMCAL_DATA_DIR", "./data".to_string())),
            max_connections: env_or("ROOMCAL_MAX_CONNECTIONS", 256),
            compact_threshold: env_or("ROOMCAL_COMPACT_THRESHOLD", 1000),
            metrics_port: std::env::var("ROOMCAL_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}

/// Range of time reservations may occupy. Open on either side when unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BookingWindow {
    pub not_before: Option<Timestamp>,
    pub not_after: Option<Timestamp>,
}

impl BookingWindow {
    pub fn admits(&self, span: &Span) -> bool {
        self.not_before.is_none_or(|t| span.start >= t) && self.not_after.is_none_or(|t| span.end <= t)
    }
}

/// Settings for a client-side reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Validate drag/resize like create/edit. When false, only `start < end` is checked.
    pub strict_gestures: bool,
    /// Re-fetch the full list from the store after each successful mutation.
    pub refresh_after_settle: bool,
    pub window: BookingWindow,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            strict_gestures: true,
            refresh_after_settle: true,
            window: BookingWindow {
                not_before: None,
                not_after: parse_timestamp(DEFAULT_NOT_AFTER).ok(),
            },
        }
    }
}

impl ReconcilerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            strict_gestures: env_or("ROOMCAL_STRICT_GESTURES", defaults.strict_gestures),
            refresh_after_settle: env_or(
                "ROOMCAL_REFRESH_AFTER_SETTLE",
                defaults.refresh_after_settle,
            ),
            window: BookingWindow {
                not_before: env_timestamp("ROOMCAL_NOT_BEFORE"),
                not_after: env_timestamp("ROOMCAL_NOT_AFTER").or(defaults.window.not_after),
            },
        }
    }

    /// No window, no refresh-after-settle. Handy when the caller drives refreshes itself.
    pub fn unbounded() -> Self {
        Self {
            strict_gestures: true,
            refresh_after_settle: false,
            window: BookingWindow::default(),
        }
    }
}
