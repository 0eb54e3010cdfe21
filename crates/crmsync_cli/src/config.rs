//! Configuration file support for crmsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (`CRMSYNC_` prefix, `__` between section and key,
//!    e.g. `CRMSYNC_SYNC__WORKERS`), plus the flat shortcuts
//!    `CRMSYNC_DATABASE_URL`, `CRMSYNC_CORP_ID`, `CRMSYNC_CONTACT_SECRET` and
//!    `CRMSYNC_CUSTOMER_SECRET`
//! 3. `./crmsync.toml`
//! 4. `~/.config/crmsync/config.toml`
//! 5. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/crmsync/crmsync.db?mode=rwc"  # optional, this is the default
//!
//! [wecom]
//! corp_id = "ww0123456789abcdef"
//! contact_secret = "..."   # address book secret, lists staff
//! customer_secret = "..."  # customer contact secret
//!
//! [sync]
//! workers = 10
//! stale_after_hours = 6
//! unit_timeout_secs = 30
//! requests_per_second = 20
//! rate_limit_retries = 3
//! schedule_interval_minutes = 60
//! skip_if_running = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use crmsync::platform::rate_limits;
use crmsync::sync::{
    DEFAULT_RATE_LIMIT_RETRIES, DEFAULT_SCHEDULE_INTERVAL_MINUTES, DEFAULT_STALE_AFTER_HOURS,
    DEFAULT_UNIT_TIMEOUT_SECS, DEFAULT_WORKER_COUNT, SyncOptions,
};

const ENV_PREFIX: &str = "CRMSYNC";

/// Flat environment shortcuts and the key each one overrides.
const ENV_ALIASES: &[(&str, &str)] = &[
    ("CRMSYNC_DATABASE_URL", "database.url"),
    ("CRMSYNC_CORP_ID", "wecom.corp_id"),
    ("CRMSYNC_CONTACT_SECRET", "wecom.contact_secret"),
    ("CRMSYNC_CUSTOMER_SECRET", "wecom.customer_secret"),
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub wecom: WeComSection,
    pub sync: SyncConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite://` or `postgres://` URL. Defaults to a file in the XDG state
    /// directory.
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WeComSection {
    pub corp_id: Option<String>,
    pub contact_secret: Option<String>,
    pub customer_secret: Option<String>,
    /// Override for proxies or test servers.
    pub api_base: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub workers: usize,
    pub stale_after_hours: i64,
    pub unit_timeout_secs: u64,
    /// Proactive limit on WeCom calls.
    pub requests_per_second: u32,
    pub rate_limit_retries: usize,
    pub schedule_interval_minutes: u32,
    pub skip_if_running: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKER_COUNT,
            stale_after_hours: DEFAULT_STALE_AFTER_HOURS,
            unit_timeout_secs: DEFAULT_UNIT_TIMEOUT_SECS,
            requests_per_second: rate_limits::WECOM_DEFAULT_RPS,
            rate_limit_retries: DEFAULT_RATE_LIMIT_RETRIES,
            schedule_interval_minutes: DEFAULT_SCHEDULE_INTERVAL_MINUTES,
            skip_if_running: true,
        }
    }
}

impl SyncConfig {
    /// Orchestrator options with optional CLI overrides applied.
    pub fn to_options(&self, workers: Option<usize>, stale_after_hours: Option<i64>) -> SyncOptions {
        SyncOptions {
            worker_count: workers.unwrap_or(self.workers).max(1),
            stale_after: chrono::Duration::hours(
                stale_after_hours.unwrap_or(self.stale_after_hours).max(0),
            ),
            unit_timeout: Duration::from_secs(self.unit_timeout_secs.max(1)),
            rate_limit_retries: self.rate_limit_retries,
        }
    }
}

impl Config {
    /// Load configuration from every layer. Errors fall back to defaults with
    /// a warning.
    pub fn load() -> Self {
        match Self::settings().and_then(|settings| settings.try_deserialize::<Config>()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}", e);
                Config::default()
            }
        }
    }

    fn settings() -> Result<ConfigBuilder, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = Self::default_config_path()
            && path.exists()
        {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let local_config = PathBuf::from("crmsync.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./crmsync.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g. CRMSYNC_SYNC__WORKERS -> sync.workers
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        for (var, key) in ENV_ALIASES {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        builder.build()
    }

    /// Configured database URL, or a SQLite file in the state directory.
    ///
    /// The default carries `mode=rwc` so the file is created on first use.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("crmsync.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "crmsync").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// `$XDG_STATE_HOME/crmsync` on Linux, the data directory elsewhere.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "crmsync").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.url.is_none());
        assert!(config.wecom.corp_id.is_none());
        assert_eq!(config.sync.workers, 10);
        assert_eq!(config.sync.stale_after_hours, 6);
        assert_eq!(config.sync.unit_timeout_secs, 30);
        assert_eq!(config.sync.rate_limit_retries, 3);
        assert_eq!(config.sync.schedule_interval_minutes, 60);
        assert!(config.sync.skip_if_running);
    }

    #[test]
    fn test_full_config_parsing() {
        let config = parse(
            r#"
            [database]
            url = "sqlite:///tmp/crm.db"

            [wecom]
            corp_id = "ww123"
            contact_secret = "c1"
            customer_secret = "c2"
            api_base = "http://localhost:9000/cgi-bin"

            [sync]
            workers = 4
            stale_after_hours = 12
            unit_timeout_secs = 5
            requests_per_second = 10
            rate_limit_retries = 0
            schedule_interval_minutes = 15
            skip_if_running = false
        "#,
        );

        assert_eq!(config.database.url.as_deref(), Some("sqlite:///tmp/crm.db"));
        assert_eq!(config.wecom.corp_id.as_deref(), Some("ww123"));
        assert_eq!(config.wecom.customer_secret.as_deref(), Some("c2"));
        assert_eq!(
            config.wecom.api_base.as_deref(),
            Some("http://localhost:9000/cgi-bin")
        );
        assert_eq!(config.sync.workers, 4);
        assert_eq!(config.sync.stale_after_hours, 12);
        assert_eq!(config.sync.requests_per_second, 10);
        assert_eq!(config.sync.rate_limit_retries, 0);
        assert_eq!(config.sync.schedule_interval_minutes, 15);
        assert!(!config.sync.skip_if_running);
    }

    #[test]
    fn test_config_partial_override() {
        let config = parse(
            r#"
            [sync]
            workers = 3
        "#,
        );
        assert_eq!(config.sync.workers, 3);
        assert_eq!(config.sync.stale_after_hours, 6);
    }

    #[test]
    fn test_config_merging_order() {
        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                "[sync]\nworkers = 20\nstale_after_hours = 6",
                FileFormat::Toml,
            ))
            .add_source(config::File::from_str("[sync]\nworkers = 5", FileFormat::Toml))
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();
        assert_eq!(config.sync.workers, 5);
        assert_eq!(config.sync.stale_after_hours, 6);
    }

    #[test]
    fn test_override_option_sets_nested_key() {
        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str("[wecom]\ncorp_id = \"file\"", FileFormat::Toml))
            .set_override_option("wecom.corp_id", Some("env"))
            .unwrap()
            .set_override_option("database.url", None::<String>)
            .unwrap()
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();
        assert_eq!(config.wecom.corp_id.as_deref(), Some("env"));
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_config_invalid_toml() {
        let result = ConfigBuilder::builder()
            .add_source(config::File::from_str("[sync\nworkers = 1", FileFormat::Toml))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_to_options_applies_overrides() {
        let sync = SyncConfig::default();
        let options = sync.to_options(Some(2), Some(24));
        assert_eq!(options.worker_count, 2);
        assert_eq!(options.stale_after, chrono::Duration::hours(24));
        assert_eq!(options.unit_timeout, Duration::from_secs(30));

        let options = sync.to_options(Some(0), None);
        assert_eq!(options.worker_count, 1);
        assert_eq!(options.stale_after, chrono::Duration::hours(6));
    }

    #[test]
    fn test_database_url_defaults_to_state_dir() {
        let config = Config::default();
        if let Some(url) = config.database_url() {
            assert!(url.starts_with("sqlite://"));
            assert!(url.ends_with("crmsync.db?mode=rwc"));
        }
    }

    #[test]
    fn test_database_url_respects_configured_value() {
        let config = parse("[database]\nurl = \"postgres://localhost/crm\"");
        assert_eq!(
            config.database_url().as_deref(),
            Some("postgres://localhost/crm")
        );
    }
}
