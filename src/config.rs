//! Runtime configuration.
//!
//! The process environment is consulted once, at the boundary, and the
//! resulting [`Config`] is passed explicitly to everything that needs it.

use std::path::PathBuf;

/// Environment variable naming the directory relative image names are looked up in.
pub const DATA_ROOT_ENV: &str = "MED_BV_DATA_ROOT";

/// Environment variable naming the viewer executable.
pub const VIEWER_COMMAND_ENV: &str = "MED_BV_VIEWER_COMMAND";

/// Used when `MED_BV_DATA_ROOT` is unset.
pub const DEFAULT_DATA_ROOT: &str = "/GB/images3D";

/// Used when `MED_BV_VIEWER_COMMAND` is unset.
pub const DEFAULT_VIEWER_COMMAND: &str = "/GB/itksnap/bin/itksnap";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root directory for relative image names
    pub data_root: PathBuf,
    /// Viewer executable launched for display
    pub viewer_command: PathBuf,
    /// Directory temporary header/raw pairs are created in
    pub temp_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            viewer_command: PathBuf::from(DEFAULT_VIEWER_COMMAND),
            temp_dir: std::env::temp_dir(),
        }
    }
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        let defaults = Self::default();

        Self {
            data_root: value(DATA_ROOT_ENV).unwrap_or(defaults.data_root),
            viewer_command: value(VIEWER_COMMAND_ENV).unwrap_or(defaults.viewer_command),
            temp_dir: defaults.temp_dir,
        }
    }

    pub fn with_data_root(mut self, data_root: impl Into<PathBuf>) -> Self {
        self.data_root = data_root.into();
        self
    }

    pub fn with_viewer_command(mut self, viewer_command: impl Into<PathBuf>) -> Self {
        self.viewer_command = viewer_command.into();
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }
}
