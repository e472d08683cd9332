// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spell configuration: the immutable snapshot of one downstream tool server.
//!
//! Spells are loaded from `<name>.spell.yaml` files. All reads of the
//! transport and auth settings go through the sum types below; there is no
//! duck typing anywhere downstream of the parser.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// 32-byte digest of a spell's indexable text.
pub type ContentHash = [u8; 32];

/// Minimum number of keywords a spell must declare.
pub const MIN_KEYWORDS: usize = 3;

/// A configured downstream tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellConfig {
    /// Unique, lowercase-dash-alphanumeric, primary key.
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Intent keywords; at least [`MIN_KEYWORDS`] required.
    pub keywords: Vec<String>,
    /// Optional prose appended to each advertised tool description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steering: Option<String>,
    pub server: ServerConfig,
}

/// Transport settings, one variant per supported transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ServerConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// Values may contain `${VAR}` placeholders; expanded at connection time.
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default)]
        auth: AuthConfig,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default)]
        auth: AuthConfig,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl ServerConfig {
    /// Short transport label for logs and error messages.
    pub fn transport(&self) -> &'static str {
        match self {
            ServerConfig::Stdio { .. } => "stdio",
            ServerConfig::Sse { .. } => "sse",
            ServerConfig::Http { .. } => "http",
        }
    }
}

/// Authentication settings for remote transports.
///
/// Secret fields may contain `${VAR}` placeholders; the persisted config
/// retains the placeholder and expansion happens only at connection time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        user: String,
        pass: String,
    },
    ClientCredentials {
        client_id: String,
        client_secret: String,
        token_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
    Oauth2 {
        client_id: String,
        client_secret: String,
        token_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
}

/// Spell file problems. Offending files are skipped with a warning at
/// runtime; the validator CLI surfaces them directly.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid spell file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("spell name {0:?} must be lowercase alphanumeric with dashes")]
    InvalidName(String),

    #[error("spell {0}: version is required")]
    MissingVersion(String),

    #[error("spell {0}: at least {MIN_KEYWORDS} keywords are required, got {1}")]
    TooFewKeywords(String, usize),

    #[error("spell {0}: stdio transport requires a command")]
    MissingCommand(String),

    #[error("spell {0}: {1} transport requires a url")]
    MissingUrl(String, &'static str),

    #[error("duplicate spell name {0:?}")]
    DuplicateName(String),
}

impl SpellConfig {
    /// Parse and validate a spell from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: SpellConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the required-field and naming rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_name(&self.name) {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }
        if self.version.trim().is_empty() {
            return Err(ConfigError::MissingVersion(self.name.clone()));
        }
        if self.keywords.len() < MIN_KEYWORDS {
            return Err(ConfigError::TooFewKeywords(self.name.clone(), self.keywords.len()));
        }
        match &self.server {
            ServerConfig::Stdio { command, .. } if command.trim().is_empty() => {
                Err(ConfigError::MissingCommand(self.name.clone()))
            }
            ServerConfig::Sse { url, .. } if url.trim().is_empty() => {
                Err(ConfigError::MissingUrl(self.name.clone(), "sse"))
            }
            ServerConfig::Http { url, .. } if url.trim().is_empty() => {
                Err(ConfigError::MissingUrl(self.name.clone(), "http"))
            }
            _ => Ok(()),
        }
    }

    /// The text the embedding index is built from: keywords, description,
    /// and steering, in that order.
    pub fn indexable_text(&self) -> String {
        let mut text = self.keywords.join(" ");
        if !self.description.is_empty() {
            text.push(' ');
            text.push_str(&self.description);
        }
        if let Some(steering) = self.steering.as_deref() {
            if !steering.is_empty() {
                text.push(' ');
                text.push_str(steering);
            }
        }
        text
    }

    /// Digest of [`Self::indexable_text`]. A persisted embedding whose hash
    /// differs from this is stale and gets recomputed.
    pub fn content_hash(&self) -> ContentHash {
        Sha256::digest(self.indexable_text().as_bytes()).into()
    }
}

/// Names are non-empty, lowercase alphanumeric plus dashes, and start and
/// end with an alphanumeric character.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

#[cfg(test)]
#[path = "spell_tests.rs"]
mod tests;
