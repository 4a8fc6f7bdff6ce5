//! Runtime configuration for the relay server and the terminal client.
//!
//! Values are layered: command-line flags and environment variables (resolved
//! by the binary) override an optional TOML file, which overrides defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_CREDENTIALS_PATH: &str = ".quickmark/credentials.toml";

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the relay listens on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Upstream automation endpoint (the `/mark` route of the external API).
    /// Absence is reported per request as HTTP 500.
    #[serde(default)]
    pub upstream_url: Option<String>,
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            upstream_url: None,
        }
    }
}

impl RelayConfig {
    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides coming from flags or environment.
    pub fn with_overrides(mut self, bind_addr: Option<String>, upstream_url: Option<String>) -> Self {
        if let Some(addr) = bind_addr {
            self.bind_addr = addr;
        }
        if upstream_url.is_some() {
            self.upstream_url = upstream_url;
        }
        self
    }

    /// The configured upstream URL, treating blank values as unset.
    pub fn upstream_url(&self) -> Option<&str> {
        self.upstream_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Terminal client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the relay, without the route path
    pub relay_url: String,
    /// Location of the credential file
    pub credentials_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn blank_upstream_url_counts_as_unset() {
        let config = RelayConfig {
            upstream_url: Some("   ".to_string()),
            ..RelayConfig::default()
        };
        assert_eq!(config.upstream_url(), None);
    }

    #[test]
    fn file_values_are_overridden_by_flags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quickmark.toml");
        std::fs::write(&path, "upstream_url = \"https://api.example.test/mark\"\n").unwrap();

        let config = RelayConfig::from_file(&path).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.upstream_url(), Some("https://api.example.test/mark"));

        let config = config.with_overrides(Some("0.0.0.0:8080".to_string()), None);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.upstream_url(), Some("https://api.example.test/mark"));
    }

    #[test]
    fn unreadable_file_reports_path() {
        let err = RelayConfig::from_file(Path::new("/nonexistent/quickmark.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/quickmark.toml"));
    }
}
