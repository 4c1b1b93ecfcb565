//! Runtime settings for database, logging and paging defaults.
//!
//! # Responsibility
//! - Deserialize settings from JSON with a default for every field.
//! - Apply `DATAREPO_*` environment overrides on top of file values.
//! - Turn raw page parameters into validated `PageRequest`s.
//!
//! # Invariants
//! - An absent `database.path` means an in-memory database.
//! - `paging.default_page_size` is clamped to `1..=max_page_size`.

use crate::page::{PageRequest, PageRequestError, Sort};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "DATAREPO_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "DATAREPO_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "DATAREPO_LOG_DIR";

/// Settings loading failure.
#[derive(Debug)]
pub enum SettingsError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read settings `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid settings document: {err}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
    pub paging: PagingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSettings {
    /// Database file. `None` opens an in-memory database.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute log directory. File logging stays off when unset.
    pub dir: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PagingSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Treat incoming page numbers as 1-based.
    pub one_indexed: bool,
}

impl Default for PagingSettings {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 2_000,
            one_indexed: false,
        }
    }
}

impl PagingSettings {
    /// Builds a page request from raw caller input.
    ///
    /// Missing sizes fall back to `default_page_size`; oversized requests are
    /// clamped to `max_page_size`. With `one_indexed`, page `1` is the first page.
    pub fn page_request(
        &self,
        page: Option<u32>,
        size: Option<u32>,
        sort: Sort,
    ) -> Result<PageRequest, PageRequestError> {
        let max = self.max_page_size.max(1);
        let size = size
            .unwrap_or(self.default_page_size)
            .clamp(1, max);
        let page = match (page, self.one_indexed) {
            (None, _) => 0,
            (Some(value), true) => value.saturating_sub(1),
            (Some(value), false) => value,
        };
        PageRequest::of(page, size, sort)
    }
}

impl Settings {
    /// Parses settings from a JSON document.
    pub fn from_json_str(document: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Reads and parses a JSON settings file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&document)
    }

    /// Applies `DATAREPO_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|value| !value.trim().is_empty()) {
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|value| !value.trim().is_empty()) {
            self.logging.level = level;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|value| !value.trim().is_empty()) {
            self.logging.dir = Some(dir);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{PagingSettings, Settings, ENV_DB_PATH, ENV_LOG_LEVEL};
    use crate::page::Sort;
    use std::path::PathBuf;

    #[test]
    fn empty_document_uses_defaults() {
        let settings = Settings::from_json_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.database.path.is_none());
        assert_eq!(settings.paging.default_page_size, 20);
    }

    #[test]
    fn partial_document_keeps_remaining_defaults() {
        let settings = Settings::from_json_str(
            r#"{ "database": { "path": "/tmp/study.db" }, "paging": { "one_indexed": true } }"#,
        )
        .unwrap();
        assert_eq!(settings.database.path, Some(PathBuf::from("/tmp/study.db")));
        assert_eq!(settings.database.busy_timeout_ms, 5_000);
        assert!(settings.paging.one_indexed);
        assert_eq!(settings.paging.max_page_size, 2_000);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Settings::from_json_str(r#"{ "databse": {} }"#).is_err());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let settings = Settings::default().with_overrides(|key| match key {
            ENV_DB_PATH => Some("/var/lib/study.db".to_string()),
            ENV_LOG_LEVEL => Some("warn".to_string()),
            _ => None,
        });
        assert_eq!(
            settings.database.path,
            Some(PathBuf::from("/var/lib/study.db"))
        );
        assert_eq!(settings.logging.level, "warn");
        assert!(settings.logging.dir.is_none());
    }

    #[test]
    fn page_request_clamps_and_honors_one_indexed_pages() {
        let paging = PagingSettings {
            default_page_size: 10,
            max_page_size: 50,
            one_indexed: true,
        };
        let request = paging.page_request(Some(1), Some(500), Sort::unsorted()).unwrap();
        assert_eq!(request.page(), 0);
        assert_eq!(request.size(), 50);

        let request = paging.page_request(Some(3), None, Sort::unsorted()).unwrap();
        assert_eq!(request.page(), 2);
        assert_eq!(request.size(), 10);
    }
}
