//! Temporary header/raw pairs for handing in-memory images to other processes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::meta_image::{HEADER_EXTENSION, ImageIoError, raw_data_path};
use crate::volume_loader::{VolumeLoader, WritableImage};

/// Joins the label and the random part of a temporary file name.
const LABEL_SEPARATOR: &str = "___";

/// A header/raw pair written by [`materialize`].
///
/// Dropping a `TempImage` leaves the files in place; call
/// [`TempImage::remove`] once the consumer is done with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempImage {
    header: PathBuf,
}

impl TempImage {
    pub fn header(&self) -> &Path {
        &self.header
    }

    pub fn raw(&self) -> PathBuf {
        raw_data_path(&self.header)
    }

    /// Delete the header and then the raw file.
    pub fn remove(&self) -> io::Result<()> {
        fs::remove_file(&self.header)?;
        fs::remove_file(self.raw())?;
        debug!("removed {}", self.header.display());
        Ok(())
    }

    /// Delete whatever part of the pair exists.
    pub(crate) fn discard(&self) {
        for path in [self.header.clone(), self.raw()] {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!("could not remove {}: {e}", path.display());
                }
            }
        }
    }
}

/// Write `image` to a uniquely named header/raw pair in `dir`.
///
/// Returns `Ok(None)` without touching the file system when there is no
/// image. A non-empty `label` prefixes the generated file name.
///
/// # Errors
///
/// Fails if the name cannot be allocated or the image cannot be written.
/// Files created before the failure are removed again.
pub fn materialize(
    image: Option<&dyn WritableImage>,
    label: &str,
    dir: &Path,
) -> Result<Option<TempImage>, ImageIoError> {
    let Some(image) = image else {
        return Ok(None);
    };

    let prefix = if label.is_empty() {
        String::new()
    } else {
        format!("{label}{LABEL_SEPARATOR}")
    };
    let suffix = format!(".{HEADER_EXTENSION}");

    // only the unique name is needed, the handle is closed right away
    let header = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .tempfile_in(dir)
        .and_then(|file| file.into_temp_path().keep().map_err(|e| e.error))
        .map_err(|source| ImageIoError::Write {
            path: dir.display().to_string(),
            source,
        })?;

    let temp = TempImage { header };
    if let Err(e) = VolumeLoader::write_image(temp.header(), image, false) {
        temp.discard();
        return Err(e);
    }
    debug!("materialized {}", temp.header().display());
    Ok(Some(temp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;
    use ndarray::Array3;
    use tempfile::TempDir;

    fn file_count(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    fn small_volume() -> Volume<u8> {
        Volume::new(Array3::from_elem((2, 2, 2), 3), (1.0, 1.0, 1.0))
    }

    #[test]
    fn test_none_creates_nothing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(materialize(None, "grey", dir.path()).unwrap(), None);
        assert_eq!(file_count(dir.path()), 0);
    }

    #[test]
    fn test_creates_exactly_one_pair() {
        let dir = TempDir::new().unwrap();
        let volume = small_volume();

        let temp = materialize(Some(&volume), "grey", dir.path()).unwrap().unwrap();

        assert!(temp.header().is_file());
        assert!(temp.raw().is_file());
        assert_eq!(file_count(dir.path()), 2);
        let name = temp.header().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("grey___"));
        assert!(name.ends_with(".mhd"));
    }

    #[test]
    fn test_unlabelled_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let volume = small_volume();

        let first = materialize(Some(&volume), "", dir.path()).unwrap().unwrap();
        let second = materialize(Some(&volume), "", dir.path()).unwrap().unwrap();

        assert_ne!(first, second);
        assert!(!first.header().file_name().unwrap().to_str().unwrap().contains("___"));
        assert_eq!(file_count(dir.path()), 4);
    }

    #[test]
    fn test_remove_deletes_pair() {
        let dir = TempDir::new().unwrap();
        let temp = materialize(Some(&small_volume()), "x", dir.path()).unwrap().unwrap();

        temp.remove().unwrap();
        assert_eq!(file_count(dir.path()), 0);
    }

    #[test]
    fn test_remove_fails_without_raw() {
        let dir = TempDir::new().unwrap();
        let temp = materialize(Some(&small_volume()), "x", dir.path()).unwrap().unwrap();
        fs::remove_file(temp.raw()).unwrap();

        assert!(temp.remove().is_err());
        assert!(!temp.header().exists());
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let result = materialize(Some(&small_volume()), "x", &dir.path().join("gone"));
        assert!(matches!(result, Err(ImageIoError::Write { .. })));
    }
}
