//! Engine Configuration
//!
//! Settings live in the `"views"` section of a JSON settings file, with
//! `VIEWFORGE_*` environment variables layered on top.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_layout_name")]
    pub layout_name: String,
    #[serde(default = "default_buffer_limit")]
    pub buffer_limit: usize,
    #[serde(default = "default_max_partial_depth")]
    pub max_partial_depth: usize,
    #[serde(default)]
    pub cache_compiled: bool,
    #[serde(default)]
    pub layouts_for_partials: bool,
}

fn default_extensions() -> Vec<String> { vec!["html".to_string()] }
fn default_layout_name() -> String { "_ViewStart".to_string() }
fn default_buffer_limit() -> usize { 64 * 1024 }
fn default_max_partial_depth() -> usize { 16 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            layout_name: default_layout_name(),
            buffer_limit: default_buffer_limit(),
            max_partial_depth: default_max_partial_depth(),
            cache_compiled: false,
            layouts_for_partials: false,
        }
    }
}

impl EngineConfig {
    /// Parse a settings document; a missing `"views"` section means defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let root: Value = serde_json::from_str(text)?;
        match root.get("views") {
            Some(section) => Ok(serde_json::from_value(section.clone())?),
            None => Ok(Self::default()),
        }
    }

    /// Settings file (if any), then process environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if p.exists() => Self::from_json_str(&fs::read_to_string(p)?)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VIEWFORGE_LAYOUT_NAME") {
            self.layout_name = v;
        }
        if let Some(v) = lookup("VIEWFORGE_BUFFER_LIMIT") {
            self.buffer_limit = parse_field("VIEWFORGE_BUFFER_LIMIT", &v)?;
        }
        if let Some(v) = lookup("VIEWFORGE_MAX_PARTIAL_DEPTH") {
            self.max_partial_depth = parse_field("VIEWFORGE_MAX_PARTIAL_DEPTH", &v)?;
        }
        if let Some(v) = lookup("VIEWFORGE_CACHE") {
            self.cache_compiled = parse_field("VIEWFORGE_CACHE", &v)?;
        }
        if let Some(v) = lookup("VIEWFORGE_EXTENSIONS") {
            self.extensions = v
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_string())
                .filter(|e| !e.is_empty())
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "extensions".into(),
                reason: "at least one extension is required".into(),
            });
        }
        if self.layout_name.trim().is_empty() || self.layout_name.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "layoutName".into(),
                reason: format!("'{}' is not a plain view name", self.layout_name),
            });
        }
        Ok(())
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        field: field.to_string(),
        reason: e.to_string(),
    })
}
