//! Configuration loading.
//!
//! TOML file with serde defaults for every field, so a missing file or a
//! partial file both work. API keys come from the environment first and the
//! file second; config files in dotfiles repos should not need secrets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

const API_KEY_ENV_VARS: &[&str] = &["CINEQUERY_API_KEY", "OPENAI_API_KEY"];
const METADATA_KEY_ENV_VAR: &str = "OMDB_API_KEY";

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/databases")
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/vector_index.sqlite")
}

fn default_tag_column() -> String {
    "listed_in".to_string()
}

fn default_base_url() -> String {
    crate::oracle::DEFAULT_BASE_URL.to_string()
}

fn default_chat_model() -> String {
    crate::oracle::DEFAULT_CHAT_MODEL.to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_oracle_timeout_secs() -> u64 {
    60
}

fn default_metadata_base_url() -> String {
    "https://www.omdbapi.com/".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    20
}

fn default_max_iterations() -> u32 {
    2
}

/// Reasoning oracle endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Fallback when no API key environment variable is set.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            api_key: String::new(),
            timeout_secs: default_oracle_timeout_secs(),
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// External metadata lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: default_metadata_base_url(),
            api_key: String::new(),
        }
    }
}

/// Tool invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-invocation timeout; a timed-out tool is an ordinary error result.
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Turn loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Hard ceiling on planning passes per turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory of SQLite sources the catalog is built from.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Prebuilt similarity index for the semantic tool.
    #[serde(default = "default_index_path")]
    pub semantic_index: PathBuf,
    /// Comma-joined categorical column flattened into a tag vocabulary.
    #[serde(default = "default_tag_column")]
    pub tag_column: String,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub turn: TurnConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            semantic_index: default_index_path(),
            tag_column: default_tag_column(),
            oracle: OracleConfig::default(),
            metadata: MetadataConfig::default(),
            tools: ToolsConfig::default(),
            turn: TurnConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used when present and pure defaults otherwise. Environment variables
    /// override file-provided API keys either way.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::from_file(path)?
            }
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => {
                    debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// `~/.config/cinequery/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cinequery").join("config.toml"))
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        for var in API_KEY_ENV_VARS {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    self.oracle.api_key = key;
                    break;
                }
            }
        }
        if let Ok(key) = std::env::var(METADATA_KEY_ENV_VAR) {
            if !key.is_empty() {
                self.metadata.api_key = key;
            }
        }
    }
}
