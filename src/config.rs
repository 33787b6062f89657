use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shipped default wire contract. Writer and reader must agree on these two
/// URIs exactly; override them together or not at all.
pub const DEFAULT_PROTOCOL_URI: &str = "http://dinger.dev/ding";
pub const DEFAULT_SCHEMA_URI: &str = "http://dinger.dev/ding/ding";

const PROTOCOL_URI_ENV: &str = "DING_PROTOCOL_URI";
const SCHEMA_URI_ENV: &str = "DING_SCHEMA_URI";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_protocol_uri")]
    pub protocol_uri: String,
    #[serde(default = "default_schema_uri")]
    pub schema_uri: String,
    /// Seconds between reconciliations.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Upper bound on any single store call, so a hung call cannot block the
    /// next tick forever.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_protocol_uri() -> String {
    DEFAULT_PROTOCOL_URI.to_string()
}

fn default_schema_uri() -> String {
    DEFAULT_SCHEMA_URI.to_string()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_call_timeout_secs() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            protocol_uri: default_protocol_uri(),
            schema_uri: default_schema_uri(),
            poll_interval_secs: default_poll_interval_secs(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    let mut config = match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    };

    apply_env_overrides(&mut config, |key| env::var(key).ok());
    config
}

/// Apply the `DING_PROTOCOL_URI` / `DING_SCHEMA_URI` overrides from an
/// environment lookup. Split out so the override logic is testable without
/// touching process-global state.
fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(uri) = lookup(PROTOCOL_URI_ENV) {
        config.protocol_uri = uri;
    }
    if let Some(uri) = lookup(SCHEMA_URI_ENV) {
        config.schema_uri = uri;
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}
