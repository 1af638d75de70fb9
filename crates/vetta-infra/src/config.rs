//! Application configuration loader.
//!
//! Reads `config.toml` from the data directory (`VETTA_DATA_DIR`, falling
//! back to `~/.vetta/`) and deserializes it into [`AppConfig`]. A missing
//! file yields defaults; a malformed file logs a warning and yields
//! defaults. The checkpoint mode selects between the ephemeral in-memory
//! store and the durable SQLite store with identical semantics.

use std::path::Path;

use serde::{Deserialize, Serialize};

use vetta_types::config::{InterviewConfig, LlmSettings};

/// Which checkpoint store backs session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointMode {
    /// In-process state, zero external dependencies; lost on restart.
    Memory,
    /// SQLite-backed state that survives restarts.
    Sqlite,
}

impl Default for CheckpointMode {
    fn default() -> Self {
        CheckpointMode::Memory
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub checkpoint_mode: CheckpointMode,

    /// Database URL for durable mode; derived from the data directory when
    /// absent.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub interview: InterviewConfig,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub provider: ProviderConfig,
}

/// LLM provider transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key. The key itself never
    /// lives in the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "VETTA_API_KEY".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: returns [`AppConfig::default()`].
/// - Unreadable or malformed file: logs a warning and returns the default.
pub async fn load_app_config(data_dir: &Path) -> AppConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no config.toml at {}, using defaults", config_path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("failed to read {}: {err}, using defaults", config_path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            AppConfig::default()
        }
    }
}

/// Default data directory: `VETTA_DATA_DIR`, else `~/.vetta`.
pub fn default_data_dir() -> String {
    std::env::var("VETTA_DATA_DIR").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{home}/.vetta")
    })
}

/// Database URL for durable mode: the configured URL, else a SQLite file in
/// the data directory.
pub fn database_url(config: &AppConfig) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| format!("sqlite://{}/vetta.db", default_data_dir()))
}
