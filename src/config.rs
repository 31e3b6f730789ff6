use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::contract::Address;
use crate::error::ClientError;

pub const CONFIG_FILE_STEM: &str = "voting-client";
pub const ENV_PREFIX: &str = "VOTING_CLIENT";

/// Main configuration structure for the voting client
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Account settings
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Confirmation polling policy
    pub confirmation: ConfirmationConfig,
    /// Change-event subscription settings
    pub events: EventsConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Account that owns the contract and sends the workflow transitions
    pub account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConfirmationConfig {
    /// Delay between two receipt queries while a handle is armed
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventsConfig {
    /// Log name carrying workflow transitions
    pub event_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level directive used when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            confirmation: ConfirmationConfig {
                poll_interval_ms: 1000,
            },
            events: EventsConfig {
                event_name: crate::ledger::WORKFLOW_STATUS_CHANGE.to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
        }
    }
}

impl LedgerConfig {
    /// The configured account, or `fallback` when none is set
    pub fn account_or(&self, fallback: &Address) -> Result<Address, ClientError> {
        match self.account.as_deref() {
            Some(raw) => Address::parse(raw),
            None => Ok(fallback.clone()),
        }
    }
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl ClientConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. `voting-client.toml` in the current directory
    /// 3. Environment variables (`VOTING_CLIENT_SECTION__KEY`)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`ClientConfig::load`], looking for the file in `dir`
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&ClientConfig::default())?);

        let file = dir.join(format!("{CONFIG_FILE_STEM}.toml"));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
