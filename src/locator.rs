use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("image \"{name}\" not found (also tried '{}')", candidate.display())]
    NotFound { name: String, candidate: PathBuf },
}

/// Turns user supplied image names into existing file paths.
#[derive(Debug, Clone)]
pub struct ImageLocator {
    data_root: PathBuf,
}

impl ImageLocator {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.data_root)
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Resolve `name` to an existing file.
    ///
    /// A name that already points at a file is returned unchanged, otherwise
    /// it is looked up relative to the data root.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] if neither location holds a file.
    pub fn resolve(&self, name: impl AsRef<Path>) -> Result<PathBuf, ResolveError> {
        let name = name.as_ref();
        if name.is_file() {
            return Ok(name.to_path_buf());
        }

        let candidate = self.data_root.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }

        warn!("image \"{}\" not found", name.display());
        Err(ResolveError::NotFound {
            name: name.display().to_string(),
            candidate,
        })
    }
}
