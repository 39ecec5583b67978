//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::file::File;

/// Default base directory
pub const DEFAULT_BASE_DIR: &str = "/etc/dockyard";

/// On-disk layout of the panel's configuration
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIR)
    }
}
