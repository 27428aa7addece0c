//! Embedding subsystem configuration types.
//!
//! `EmbedSettings` is the resolved (non-optional) form used by
//! `inkling-embed`. It is created from the user-facing
//! `EmbedToolsSettings` TOML struct via `From`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Resolved embedding engine settings (all values filled with defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedSettings {
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    /// Embedding model name. `None` means no model is configured and
    /// every embedding operation is rejected up front.
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Expected embedding dimension. When set, a mismatching provider
    /// response is treated as an error instead of silently resizing the
    /// vector table.
    #[serde(default)]
    pub embedding_dim: Option<usize>,
    #[serde(default = "default_embedding_batch")]
    pub embedding_batch: usize,
    /// Timeout applied to each embedding HTTP request.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Override the content database location. Primarily for testing.
    #[serde(default)]
    pub db_path_override: Option<PathBuf>,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            embedding_url: default_embedding_url(),
            embedding_model: None,
            embedding_dim: None,
            embedding_batch: default_embedding_batch(),
            request_timeout_seconds: default_request_timeout_seconds(),
            db_path_override: None,
        }
    }
}

/// User-facing embedding settings as written in the config file.
/// Everything is optional; missing values fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedToolsSettings {
    pub embedding_url: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_dim: Option<usize>,
    pub embedding_batch: Option<usize>,
    pub request_timeout_seconds: Option<u64>,
    pub db_path: Option<String>,
}

impl From<&EmbedToolsSettings> for EmbedSettings {
    fn from(value: &EmbedToolsSettings) -> Self {
        let mut settings = EmbedSettings::default();
        if let Some(url) = &value.embedding_url {
            settings.embedding_url = url.clone();
        }
        if let Some(model) = &value.embedding_model {
            settings.embedding_model = Some(model.clone());
        }
        if let Some(dim) = value.embedding_dim {
            settings.embedding_dim = Some(dim);
        }
        if let Some(batch) = value.embedding_batch {
            settings.embedding_batch = batch;
        }
        if let Some(seconds) = value.request_timeout_seconds {
            settings.request_timeout_seconds = seconds;
        }
        if let Some(path) = &value.db_path {
            settings.db_path_override = Some(PathBuf::from(path));
        }
        settings
    }
}

/// Load resolved embedding settings from a TOML file.
pub fn load_embed_settings(path: &Path) -> Result<EmbedSettings, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let user: EmbedToolsSettings = toml::from_str(&raw)?;
    Ok(EmbedSettings::from(&user))
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embedding_batch() -> usize {
    32
}

fn default_request_timeout_seconds() -> u64 {
    60
}
