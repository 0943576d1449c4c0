//! Start-up configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `CAREWATCH_PORT` | `3000` |
//! | `CAREWATCH_DATABASE_URL` | `sqlite:carewatch.db?mode=rwc` |
//! | `CAREWATCH_RULES_PATH` | unset, built-in rules |
//! | `CAREWATCH_OUTBREAK_THRESHOLD` | `3` |
//! | `CAREWATCH_OUTBREAK_WINDOW_DAYS` | `7` |
//! | `CAREWATCH_DETECTION_INTERVAL_SECS` | `3600`, `0` disables the poller |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::surveillance::DetectionParams;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_PATH: &str = "sqlite:carewatch.db?mode=rwc";

pub const DEFAULT_DETECTION_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub rules_path: Option<PathBuf>,
    pub detection: DetectionParams,

    /// `None` when scheduled detection is disabled.
    pub detection_interval: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_PATH.to_string(),
            rules_path: None,
            detection: DetectionParams::default(),
            detection_interval: Some(Duration::from_secs(DEFAULT_DETECTION_INTERVAL_SECS)),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Unset variables fall back to defaults; set but unparsable values are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let detection = DetectionParams {
            threshold: parse_or(&lookup, "CAREWATCH_OUTBREAK_THRESHOLD", defaults.detection.threshold)?,
            time_window_days: parse_or(
                &lookup,
                "CAREWATCH_OUTBREAK_WINDOW_DAYS",
                defaults.detection.time_window_days,
            )?,
        };
        detection
            .validate()
            .context("invalid outbreak detection settings")?;

        let interval_secs = parse_or(
            &lookup,
            "CAREWATCH_DETECTION_INTERVAL_SECS",
            DEFAULT_DETECTION_INTERVAL_SECS,
        )?;

        Ok(Self {
            port: parse_or(&lookup, "CAREWATCH_PORT", defaults.port)?,
            database_url: lookup("CAREWATCH_DATABASE_URL").unwrap_or(defaults.database_url),
            rules_path: lookup("CAREWATCH_RULES_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            detection,
            detection_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
