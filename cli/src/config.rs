//! `atlas.toml` loading
//!
//! Looked up at `--config`, then `$ATLAS_CONFIG`, then
//! `~/.config/atlas/atlas.toml`. A missing default file means defaults; a
//! missing explicit file is an error.

use anyhow::{Context, Result};
use atlas_ingest::IngestConfig;
use atlas_reasoning::ChatConfig;
use atlas_retrieval::RetrievalConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "ATLAS_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtlasConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file; `~/` is expanded. Defaults to `atlas.db` next to the
    /// default config file.
    #[serde(default)]
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token, if any.
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_auth_token_env() -> String {
    "ATLAS_REASONING_TOKEN".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent_calls() -> usize {
    8
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token_env: default_auth_token_env(),
            request_timeout_ms: default_request_timeout_ms(),
            max_concurrent_calls: default_max_concurrent_calls(),
        }
    }
}

impl ReasoningConfig {
    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            base_url: self.base_url.clone(),
            auth_token: std::env::var(&self.auth_token_env)
                .ok()
                .filter(|token| !token.trim().is_empty()),
            request_timeout_ms: self.request_timeout_ms,
        }
    }
}

fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("atlas"))
}

impl AtlasConfig {
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }
        match default_config_dir().map(|dir| dir.join("atlas.toml")) {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config
            .retrieval
            .validate()
            .with_context(|| format!("invalid [retrieval] in {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.store.db_path {
            Some(raw) => Ok(expand_home(raw)),
            None => default_config_dir()
                .map(|dir| dir.join("atlas.db"))
                .context("no config directory on this platform; set [store] db_path"),
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw)),
        None => PathBuf::from(raw),
    }
}
