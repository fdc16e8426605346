use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 4000;
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    pub store: Store,
    #[serde(default)]
    pub analysis: Analysis,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_builtin_seed")]
    pub builtin_seed: bool,
    #[serde(default)]
    pub seed_path: Option<String>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            kind: "memory".to_string(),
            builtin_seed: default_builtin_seed(),
            seed_path: None,
        }
    }
}

/// Optional replacements for the built-in word lists. `None` keeps the default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub positive_words: Option<Vec<String>>,
    #[serde(default)]
    pub negative_words: Option<Vec<String>>,
    #[serde(default)]
    pub urgency_phrases: Option<Vec<String>>,
    #[serde(default)]
    pub tag_keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_builtin_seed() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Loads the file when given, falls back to defaults otherwise, then applies
/// the `PORT` environment override.
pub fn resolve(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut cfg = match path {
        Some(path) => load_and_validate(path)?,
        None => Config::default(),
    };
    let port = std::env::var(PORT_ENV).ok();
    cfg.server.listen_addr = override_port(&cfg.server.listen_addr, port.as_deref())?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

/// Replaces the port of `listen_addr` with `port` when one is set.
pub fn override_port(listen_addr: &str, port: Option<&str>) -> Result<String, ConfigError> {
    let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(listen_addr.to_string());
    };
    let port: u16 = port
        .parse()
        .map_err(|_| ConfigError::UnsupportedConfig(format!("{PORT_ENV}={port} is not a port")))?;
    let mut addr: SocketAddr = listen_addr.parse().map_err(|e| {
        ConfigError::UnsupportedConfig(format!("server.listen_addr={listen_addr}: {e}"))
    })?;
    addr.set_port(port);
    Ok(addr.to_string())
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.store.kind != "memory" {
        return Err(ConfigError::UnsupportedConfig(format!(
            "store.type={} is not implemented; supported: memory",
            cfg.store.kind
        )));
    }
    if cfg.server.listen_addr.parse::<SocketAddr>().is_err() {
        return Err(ConfigError::UnsupportedConfig(format!(
            "server.listen_addr={} is not a socket address",
            cfg.server.listen_addr
        )));
    }
    if cfg
        .store
        .seed_path
        .as_ref()
        .map(|v| v.trim().is_empty())
        .unwrap_or(false)
    {
        return Err(ConfigError::UnsupportedConfig(
            "store.seed_path must not be empty when set".to_string(),
        ));
    }
    let lists = [
        ("analysis.positive_words", &cfg.analysis.positive_words),
        ("analysis.negative_words", &cfg.analysis.negative_words),
        ("analysis.urgency_phrases", &cfg.analysis.urgency_phrases),
        ("analysis.tag_keywords", &cfg.analysis.tag_keywords),
    ];
    for (name, list) in lists {
        if let Some(words) = list {
            if words.iter().all(|w| w.trim().is_empty()) {
                return Err(ConfigError::UnsupportedConfig(format!(
                    "{name} must contain at least one non-empty entry"
                )));
            }
        }
    }
    Ok(())
}
