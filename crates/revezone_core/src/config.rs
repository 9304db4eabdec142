//! Runtime configuration for the workspace core.
//!
//! # Responsibility
//! - Load database, storage-root, logging and debounce settings from a
//!   settings JSON file or `REVEZONE_*` environment variables.
//!
//! # Invariants
//! - Blank values mean "unset".
//! - A missing storage root disables the mirror; it is never guessed.

use crate::logging::normalize_level;
use crate::service::debounce::DEFAULT_CONTENT_DEBOUNCE;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DB_PATH: &str = "REVEZONE_DB_PATH";
pub const ENV_STORAGE_ROOT: &str = "REVEZONE_STORAGE_ROOT";
pub const ENV_LOG_LEVEL: &str = "REVEZONE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "REVEZONE_LOG_DIR";
pub const ENV_CONTENT_DEBOUNCE_MS: &str = "REVEZONE_CONTENT_DEBOUNCE_MS";

const DEFAULT_DB_FILE_NAME: &str = "revezone.sqlite3";

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors from loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    InvalidValue { key: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config JSON: {err}"),
            Self::InvalidValue { key, message } => write!(f, "invalid `{key}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Core settings shared by the FFI layer and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SQLite database file; `None` uses [`CoreConfig::default_db_path`].
    pub db_path: Option<PathBuf>,
    /// Absolute mirror root; `None` disables the mirror.
    pub storage_root: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub content_debounce_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            storage_root: None,
            log_level: None,
            log_dir: None,
            content_debounce_ms: DEFAULT_CONTENT_DEBOUNCE.as_millis() as u64,
        }
    }
}

impl CoreConfig {
    /// Parses a settings JSON document.
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let parsed: Self = serde_json::from_str(raw)?;
        Ok(parsed.normalized())
    }

    /// Reads and parses a settings JSON file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Reads `REVEZONE_*` process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds config from any key lookup using the `REVEZONE_*` names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let read = |key: &str| lookup(key).and_then(non_blank);
        let mut config = Self {
            db_path: read(ENV_DB_PATH).map(PathBuf::from),
            storage_root: read(ENV_STORAGE_ROOT).map(PathBuf::from),
            log_level: read(ENV_LOG_LEVEL),
            log_dir: read(ENV_LOG_DIR).map(PathBuf::from),
            ..Self::default()
        };
        if let Some(raw) = read(ENV_CONTENT_DEBOUNCE_MS) {
            config.content_debounce_ms =
                raw.parse().map_err(|err| ConfigError::InvalidValue {
                    key: ENV_CONTENT_DEBOUNCE_MS,
                    message: format!("`{raw}` is not a millisecond count: {err}"),
                })?;
        }
        Ok(config)
    }

    /// Checks path and level constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(root) = self.storage_root.as_deref() {
            if !root.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    key: "storage_root",
                    message: format!("must be an absolute path, got `{}`", root.display()),
                });
            }
        }
        if let Some(dir) = self.log_dir.as_deref() {
            if !dir.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    key: "log_dir",
                    message: format!("must be an absolute path, got `{}`", dir.display()),
                });
            }
        }
        if let Some(level) = self.log_level.as_deref() {
            normalize_level(level).map_err(|message| ConfigError::InvalidValue {
                key: "log_level",
                message,
            })?;
        }
        Ok(())
    }

    /// Database path, falling back to a file in the temp directory.
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(Self::default_db_path)
    }

    pub fn default_db_path() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)
    }

    pub fn content_debounce(&self) -> Duration {
        Duration::from_millis(self.content_debounce_ms)
    }

    fn normalized(self) -> Self {
        Self {
            db_path: self.db_path.and_then(non_blank_path),
            storage_root: self.storage_root.and_then(non_blank_path),
            log_level: self.log_level.and_then(non_blank),
            log_dir: self.log_dir.and_then(non_blank_path),
            content_debounce_ms: self.content_debounce_ms,
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn non_blank_path(value: PathBuf) -> Option<PathBuf> {
    match value.to_str() {
        Some(text) => non_blank(text.to_string()).map(PathBuf::from),
        None => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, ENV_CONTENT_DEBOUNCE_MS, ENV_STORAGE_ROOT};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_disable_mirror_and_use_standard_debounce() {
        let config = CoreConfig::default();
        assert!(config.storage_root.is_none());
        assert_eq!(config.content_debounce(), Duration::from_millis(200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_fields_are_optional_and_blank_means_unset() {
        let config = CoreConfig::from_json_str(
            r#"{ "storage_root": "/home/user/Revezone", "log_level": "  " }"#,
        )
        .unwrap();
        assert_eq!(config.storage_root, Some(PathBuf::from("/home/user/Revezone")));
        assert_eq!(config.log_level, None);
        assert_eq!(config.content_debounce_ms, 200);
    }

    #[test]
    fn load_reads_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "content_debounce_ms": 50 }"#).unwrap();

        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(config.content_debounce(), Duration::from_millis(50));

        let missing = CoreConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn lookup_reads_env_names_and_rejects_bad_numbers() {
        let config = CoreConfig::from_lookup(lookup(&[
            (ENV_STORAGE_ROOT, " /srv/mirror "),
            (ENV_CONTENT_DEBOUNCE_MS, "350"),
        ]))
        .unwrap();
        assert_eq!(config.storage_root, Some(PathBuf::from("/srv/mirror")));
        assert_eq!(config.content_debounce_ms, 350);

        let err = CoreConfig::from_lookup(lookup(&[(ENV_CONTENT_DEBOUNCE_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: ENV_CONTENT_DEBOUNCE_MS,
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_relative_root_and_unknown_level() {
        let relative = CoreConfig {
            storage_root: Some(PathBuf::from("mirror")),
            ..CoreConfig::default()
        };
        assert!(relative.validate().is_err());

        let bad_level = CoreConfig {
            log_level: Some("loud".to_string()),
            ..CoreConfig::default()
        };
        assert!(matches!(
            bad_level.validate(),
            Err(ConfigError::InvalidValue { key: "log_level", .. })
        ));
    }
}
