use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SiteDataError};

pub const DEFAULT_FILE_NAME: &str = "SiteData";
pub const DEFAULT_ALIAS_SCHEME: &str = "dat";

/// Tunables for opening the site data database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteDataConfig {
    /// Database file name inside the setup directory.
    pub file_name: String,
    /// URL scheme whose host is an alias resolved through the name lookup.
    pub alias_scheme: String,
    pub busy_timeout_ms: u64,
    /// Journal mode pragma applied on open (skipped for in-memory databases).
    pub journal_mode: String,
}

impl Default for SiteDataConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_FILE_NAME.to_string(),
            alias_scheme: DEFAULT_ALIAS_SCHEME.to_string(),
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
        }
    }
}

impl SiteDataConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: SiteDataConfig =
            toml::from_str(raw).map_err(|e| SiteDataError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Apply `SITEDATA_*` environment overrides. Values that fail to parse are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(name) = env_nonempty("SITEDATA_FILE_NAME") {
            self.file_name = name;
        }
        if let Some(scheme) = env_nonempty("SITEDATA_ALIAS_SCHEME") {
            self.alias_scheme = scheme;
        }
        if let Some(ms) = env_nonempty("SITEDATA_SQLITE_BUSY_MS").and_then(|s| s.parse().ok()) {
            self.busy_timeout_ms = ms;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_name.trim().is_empty() {
            return Err(SiteDataError::Config("file_name must not be empty".into()));
        }
        if self.file_name.contains(|c| c == '/' || c == '\\') {
            return Err(SiteDataError::Config(format!(
                "file_name must be a bare file name, got {:?}",
                self.file_name
            )));
        }
        let scheme_ok = self
            .alias_scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && self
                .alias_scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !scheme_ok {
            return Err(SiteDataError::Config(format!(
                "alias_scheme {:?} is not a valid URL scheme",
                self.alias_scheme
            )));
        }
        Ok(())
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}
