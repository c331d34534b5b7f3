//! Store configuration.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    constants::{DEFAULT_FILE_NAME, DEFAULT_INDENT, TEMP_SUFFIX},
    JnbaseError,
    Result,
};

/// Configuration of a [`crate::Store`].
///
/// Every field has a default, so the struct can be embedded in an application's own
/// configuration file and only the relevant keys overridden:
///
/// ```rust
/// use jnbase::StoreConfig;
///
/// let config: StoreConfig = serde_json::from_str(r#"{ "path": "/var/lib/app/db.json" }"#).unwrap();
/// assert_eq!(config.temp_suffix, ".tmp");
/// assert_eq!(config.indent, Some(4));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the backing JSON file
    pub path:            PathBuf,
    /// Suffix appended to `path` to form the temporary write path
    pub temp_suffix:     String,
    /// Indentation of the persisted JSON, `None` for compact output
    pub indent:          Option<usize>,
    /// Whether the temporary file is fsynced before it replaces the real file
    pub sync_on_persist: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path:            PathBuf::from(DEFAULT_FILE_NAME),
            temp_suffix:     TEMP_SUFFIX.to_owned(),
            indent:          Some(DEFAULT_INDENT),
            sync_on_persist: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for the given file path, keeping every other default.
    pub fn new<P>(path: P) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Sets the temporary file suffix.
    #[must_use]
    pub fn with_temp_suffix<S>(mut self, suffix: S) -> Self
    where
        S: Into<String>,
    {
        self.temp_suffix = suffix.into();
        self
    }

    /// Sets the indentation width; `None` writes compact JSON.
    #[must_use]
    pub const fn with_indent(mut self, indent: Option<usize>) -> Self {
        self.indent = indent;
        self
    }

    /// Enables or disables fsync of the temporary file before the rename.
    #[must_use]
    pub const fn with_sync_on_persist(mut self, sync: bool) -> Self {
        self.sync_on_persist = sync;
        self
    }

    /// Returns the temporary write path: the real path with the suffix appended.
    ///
    /// The suffix is appended to the full file name rather than replacing the extension, so
    /// `db.json` becomes `db.json.tmp`.
    pub fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(&self.temp_suffix);
        PathBuf::from(name)
    }

    /// Checks that the temporary write path is a sibling of the real file and distinct from it.
    ///
    /// An empty suffix would make the temporary path the real file itself, so loading would
    /// discard the data as a stale leftover. A suffix containing a path separator would place the
    /// temporary file in another directory, where the rename is no longer atomic.
    ///
    /// ```rust
    /// use jnbase::StoreConfig;
    ///
    /// assert!(StoreConfig::new("db.json").validate().is_ok());
    /// assert!(StoreConfig::new("db.json").with_temp_suffix("").validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.path.file_name().is_none() {
            return Err(JnbaseError::InvalidConfig {
                reason: format!("path {:?} does not name a file", self.path),
            });
        }
        if self.temp_suffix.is_empty() {
            return Err(JnbaseError::InvalidConfig {
                reason: "temp_suffix must not be empty".to_owned(),
            });
        }
        if self.temp_suffix.contains(std::path::is_separator) {
            return Err(JnbaseError::InvalidConfig {
                reason: format!(
                    "temp_suffix {:?} must not contain a path separator",
                    self.temp_suffix
                ),
            });
        }
        Ok(())
    }
}
