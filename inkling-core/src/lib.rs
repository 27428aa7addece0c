//! Shared configuration types for Inkling.

pub mod config;

pub use config::{ConfigError, EmbedSettings, EmbedToolsSettings, load_embed_settings};
