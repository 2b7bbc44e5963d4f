//! Settings for the ledger service.
//!
//! Values come from a TOML file (`config/ledger.toml` unless `--config` or
//! `CONFIG_PATH` says otherwise) and are overridden by `LEDGER__*`
//! environment variables, e.g. `LEDGER__SERVER__PORT=8080`.

use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "config/ledger.toml";
const ENV_PREFIX: &str = "LEDGER";

/// Where the ledger is stored.
///
/// ```toml
/// database = "memory"
/// # or
/// [database]
/// sqlite = "ledger.db"
/// # or
/// [database]
/// url = "postgres://ledger@localhost/ledger"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
    Url(String),
}

impl Default for Database {
    fn default() -> Self {
        Self::Sqlite("ledger.db".to_string())
    }
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Self::Memory => "sqlite::memory:".to_string(),
            Self::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
            Self::Url(url) => url.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub port: u16,
    pub request_timeout_ms: u64,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout_ms: 30_000,
        }
    }
}

impl Server {
    pub fn options(&self) -> server::ServerOptions {
        server::ServerOptions {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retry {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for Retry {
    fn default() -> Self {
        let policy = engine::RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl Retry {
    pub fn policy(&self) -> engine::RetryPolicy {
        engine::RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// Wallets created when the store holds none.
#[derive(Debug, Clone, Deserialize)]
pub struct Seed {
    pub wallets: usize,
    /// Opening balance of every seeded wallet, as a decimal string.
    pub balance: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub server: Server,
    pub database: Database,
    pub retry: Retry,
    pub seed: Option<Seed>,
}

#[derive(Debug, Parser)]
#[command(name = "ledger", version, about = "Wallet ledger HTTP service")]
struct Args {
    /// Config file path (TOML). Defaults to `config/ledger.toml`, which may
    /// be absent; a path given here must exist.
    #[arg(long, env = "CONFIG_PATH")]
    config: Option<String>,
    /// Override the listening address.
    #[arg(long)]
    bind: Option<String>,
    /// Override the listening port.
    #[arg(long)]
    port: Option<u16>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let args = Args::parse();

        let mut settings = Self::from_path(args.config.as_deref())?;
        if let Some(bind) = args.bind {
            settings.server.bind = bind;
        }
        if let Some(port) = args.port {
            settings.server.port = port;
        }

        Ok(settings)
    }

    /// Load the file at `path`, or the optional default file when no path
    /// was given.
    fn from_path(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_PATH).required(false),
        };
        Self::load(Config::builder().add_source(file))
    }

    /// Parse settings from TOML text, still honoring environment overrides.
    #[cfg(test)]
    fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Self::load(Config::builder().add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn load(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    /// `bind:port` the server listens on.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.app.level, "info");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.database, Database::Sqlite("ledger.db".to_string()));
        assert_eq!(settings.retry.policy(), engine::RetryPolicy::default());
        assert!(settings.seed.is_none());
    }

    #[test]
    fn full_file_is_parsed() {
        let settings = Settings::from_toml(
            r#"
            [app]
            level = "debug"

            [server]
            bind = "0.0.0.0"
            port = 8080
            request_timeout_ms = 1500

            [database]
            url = "postgres://ledger@localhost/ledger"

            [retry]
            max_attempts = 9
            base_delay_ms = 2
            max_delay_ms = 100

            [seed]
            wallets = 10
            balance = "100.00"
            "#,
        )
        .unwrap();

        assert_eq!(settings.app.level, "debug");
        assert_eq!(settings.listen_addr(), "0.0.0.0:8080");
        assert_eq!(
            settings.server.options().request_timeout,
            Duration::from_millis(1500)
        );
        assert_eq!(
            settings.database.url(),
            "postgres://ledger@localhost/ledger"
        );
        let policy = settings.retry.policy();
        assert_eq!(policy.max_attempts, 9);
        assert_eq!(policy.base_delay, Duration::from_millis(2));
        let seed = settings.seed.unwrap();
        assert_eq!(seed.wallets, 10);
        assert_eq!(seed.balance, "100.00");
    }

    #[test]
    fn explicit_config_path_must_exist() {
        assert!(Settings::from_path(Some("config/no-such-ledger.toml")).is_err());
    }

    #[test]
    fn config_path_is_loaded_and_default_is_optional() {
        let dir = std::env::temp_dir().join(format!("ledger-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ledger.toml");
        std::fs::write(&path, "[server]\nport = 4100\n").unwrap();

        let settings = Settings::from_path(path.to_str()).unwrap();
        assert_eq!(settings.server.port, 4100);
        let _ = std::fs::remove_dir_all(&dir);

        // No file at the default location is not an error.
        assert!(Settings::from_path(None).is_ok());
    }

    #[test]
    fn database_variants() {
        let memory = Settings::from_toml(r#"database = "memory""#).unwrap();
        assert_eq!(memory.database.url(), "sqlite::memory:");

        let sqlite = Settings::from_toml("[database]\nsqlite = \"data/ledger.db\"").unwrap();
        assert_eq!(sqlite.database.url(), "sqlite:data/ledger.db?mode=rwc");
    }
}
