// ⚙️ Worker Configuration
// Built-in defaults, then an optional TOML file, then RATES__* env overrides.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// EMBEDDED DEFAULTS
// ============================================================================

const DEFAULT_CONFIG: &str = r#"
[feed]
url          = "http://www.cbr.ru/scripts/XML_daily.asp"
timeout_secs = 30
user_agent   = "rate-tracker/0.1"

[schedule]
tick_interval_secs  = 3600
error_cooldown_secs = 300

[database]
path = "rates.db"
"#;

/// Prefix for environment overrides, e.g. `RATES__SCHEDULE__TICK_INTERVAL_SECS`.
const ENV_PREFIX: &str = "RATES";

// ============================================================================
// CONFIG TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    pub schedule: ScheduleConfig,
    pub database: DatabaseConfig,
}

/// `[feed]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// `[schedule]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    pub tick_interval_secs: u64,
    pub error_cooldown_secs: u64,
}

/// `[database]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ScheduleConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }
}

impl Config {
    /// Load defaults, then `path` (required when given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let cfg: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Built-in defaults without touching the filesystem or environment.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .expect("built-in default config must be valid TOML")
            .try_deserialize()
            .expect("built-in default config must deserialize correctly")
    }

    /// Reject durations the scheduler cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.feed.timeout_secs == 0 {
            bail!("feed.timeout_secs must be greater than zero");
        }
        if self.schedule.tick_interval_secs == 0 || self.schedule.error_cooldown_secs == 0 {
            bail!("schedule intervals must be greater than zero");
        }
        if self.schedule.error_cooldown_secs >= self.schedule.tick_interval_secs {
            bail!(
                "schedule.error_cooldown_secs ({}) must be shorter than schedule.tick_interval_secs ({})",
                self.schedule.error_cooldown_secs,
                self.schedule.tick_interval_secs
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_load() {
        let cfg = Config::defaults();
        assert_eq!(cfg.feed.url, "http://www.cbr.ru/scripts/XML_daily.asp");
        assert_eq!(cfg.schedule.tick_interval(), Duration::from_secs(3600));
        assert_eq!(cfg.schedule.error_cooldown(), Duration::from_secs(300));
        assert_eq!(cfg.database.path, PathBuf::from("rates.db"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[schedule]\ntick_interval_secs = 600\n\n[database]\npath = \"/tmp/other.db\""
        )
        .unwrap();

        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.schedule.tick_interval_secs, 600);
        assert_eq!(cfg.schedule.error_cooldown_secs, 300);
        assert_eq!(cfg.database.path, PathBuf::from("/tmp/other.db"));
    }

    #[test]
    fn cooldown_must_be_shorter_than_tick() {
        let mut cfg = Config::defaults();
        cfg.schedule.error_cooldown_secs = cfg.schedule.tick_interval_secs;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/rate-tracker.toml")));
        assert!(result.is_err());
    }
}
