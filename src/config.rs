//! Configuration file parser for `feedstock.toml`.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted by serde and logged as
//! warnings, since they are usually typos.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::feed::{ParseOptions, DEFAULT_MAX_DEPTH, DEFAULT_MAX_DOCUMENT_BYTES, DEFAULT_SUMMARY_CHARS};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `[parser]` table.
    pub parser: ParserConfig,
}

/// Limits applied to every document the parser sees.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Documents larger than this are rejected before decoding.
    pub max_document_bytes: usize,

    /// Maximum element nesting depth.
    pub max_depth: usize,

    /// Length of each entry's plain-text summary, in characters.
    pub summary_chars: usize,

    /// Whether a failed decode is retried once after escaping bare `&`.
    pub repair_entities: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            max_depth: DEFAULT_MAX_DEPTH,
            summary_chars: DEFAULT_SUMMARY_CHARS,
            repair_entities: true,
        }
    }
}

impl From<&ParserConfig> for ParseOptions {
    fn from(config: &ParserConfig) -> Self {
        Self {
            max_document_bytes: config.max_document_bytes,
            max_depth: config.max_depth,
            summary_chars: config.summary_chars,
            repair_entities: config.repair_entities,
        }
    }
}

const KNOWN_SECTIONS: [&str; 1] = ["parser"];
const KNOWN_PARSER_KEYS: [&str; 4] = [
    "max_document_bytes",
    "max_depth",
    "summary_chars",
    "repair_entities",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            max_document_bytes = config.parser.max_document_bytes,
            max_depth = config.parser.max_depth,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses configuration from TOML text. Blank text yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        Ok(toml::from_str(content)?)
    }

    /// Parser options described by this configuration.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::from(&self.parser)
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for (key, value) in raw {
        if !KNOWN_SECTIONS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            continue;
        }
        if let Some(table) = value.as_table() {
            for parser_key in table.keys() {
                if !KNOWN_PARSER_KEYS.contains(&parser_key.as_str()) {
                    tracing::warn!(key = %format!("{key}.{parser_key}"), "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
