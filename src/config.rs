//! Database configuration

use std::path::{Path, PathBuf};

use crate::storage::WriteOptions;

/// Default database name
pub const DEFAULT_NAME: &str = "simpldb";

/// Default storage root, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = "data";

/// Configuration for opening a [`crate::Database`]
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Logical database name, reported by `database_info` and exports
    pub name: String,
    /// Directory holding the catalog, table and index files
    pub data_dir: PathBuf,
    /// fsync every file write before renaming it into place
    pub sync_writes: bool,
    /// Write indented JSON
    pub pretty_json: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            sync_writes: true,
            pretty_json: true,
        }
    }
}

impl DatabaseConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the storage root
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Enable or disable fsync on write
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Enable or disable indented JSON output
    pub fn pretty_json(mut self, pretty: bool) -> Self {
        self.pretty_json = pretty;
        self
    }

    pub(crate) fn write_options(&self) -> WriteOptions {
        WriteOptions {
            sync: self.sync_writes,
            pretty: self.pretty_json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = DatabaseConfig::new()
            .name("inventory")
            .data_dir("/tmp/inv")
            .sync_writes(false);

        assert_eq!(config.name, "inventory");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/inv"));
        assert!(!config.write_options().sync);
        assert!(config.write_options().pretty);
    }
}
