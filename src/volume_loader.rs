use crate::locator::{ImageLocator, ResolveError};
use crate::meta_image::{ImageIoError, MetaImageHeader, raw_data_path};
use crate::volume::{Volume, Voxel};

use ndarray::Array3;
use std::{
    borrow::Cow,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Io(#[from] ImageIoError),
}

/// Anything that can be stored as a MetaImage header/raw pair.
pub trait WritableImage: Send + Sync {
    /// Write the header to `header_path` and the voxels to its paired raw file.
    fn write_meta_image(&self, header_path: &Path) -> Result<(), ImageIoError>;
}

impl<T: Voxel> WritableImage for Volume<T> {
    fn write_meta_image(&self, header_path: &Path) -> Result<(), ImageIoError> {
        let raw_path = raw_data_path(header_path);
        if raw_path == header_path {
            // the voxels would overwrite the header
            return Err(ImageIoError::Unsupported {
                path: header_path.display().to_string(),
                reason: "header name must not end in \"raw\"".into(),
            });
        }
        let data_file = raw_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let (depth, height, width) = self.dim();
        let (sx, sy, sz) = self.spacing;
        let (ox, oy, oz) = self.origin;
        let mut header = MetaImageHeader::new(
            vec![width, height, depth],
            T::ELEMENT_TYPE,
            vec![sx, sy, sz],
            vec![ox, oy, oz],
            data_file,
        );
        header.byte_order_msb = cfg!(target_endian = "big");

        let voxels: Cow<'_, [T]> = match self.data.as_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(self.data.iter().copied().collect()),
        };

        write_file(header_path, header.to_text().as_bytes())?;
        write_file(&raw_path, bytemuck::cast_slice::<T, u8>(&voxels))
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ImageIoError> {
    fs::write(path, contents).map_err(|source| ImageIoError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, ImageIoError> {
    fs::read(path).map_err(|source| ImageIoError::Read {
        path: path.display().to_string(),
        source,
    })
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Read an image by name.
    ///
    /// # Arguments
    ///
    /// * `locator` - Resolves `name` against the data root
    /// * `name` - File name, absolute or relative to the data root
    /// * `dim` - Expected image dimension, 2 or 3
    /// * `verbose` - Log a message once the image is loaded
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Resolve`] if the image cannot be found and
    /// [`LoadError::Io`] if it cannot be decoded.
    pub fn read_image<T: Voxel>(
        locator: &ImageLocator,
        name: impl AsRef<Path>,
        dim: usize,
        verbose: bool,
    ) -> Result<Volume<T>, LoadError> {
        let path = locator.resolve(name)?;
        let volume = Self::read_path(&path, dim)?;
        if verbose {
            info!("image \"{}\" read", path.display());
        }
        Ok(volume)
    }

    /// Read the MetaImage at `path`, converting voxels to `T`.
    pub fn read_path<T: Voxel>(path: &Path, dim: usize) -> Result<Volume<T>, ImageIoError> {
        let unsupported = |reason: String| ImageIoError::Unsupported {
            path: path.display().to_string(),
            reason,
        };

        if !(2..=3).contains(&dim) {
            return Err(unsupported(format!("{dim}-dimensional images")));
        }

        let header_bytes = read_file(path)?;
        let (header, data_start) = MetaImageHeader::parse(&header_bytes, path)?;

        if header.ndims() != dim {
            return Err(ImageIoError::DimensionMismatch {
                path: path.display().to_string(),
                expected: dim,
                found: header.ndims(),
            });
        }
        if header.compressed {
            return Err(unsupported("compressed voxel data".into()));
        }
        if header.channels != 1 {
            return Err(unsupported(format!("{} channels per voxel", header.channels)));
        }

        let expected = header.data_len(path)?;
        let mut bytes = if header.is_local() {
            header_bytes[data_start..].to_vec()
        } else {
            let data_path = Self::data_file_path(path, &header.data_file);
            debug!("reading voxel data from {}", data_path.display());
            Self::skip_header(read_file(&data_path)?, header.header_size, expected)
        };

        if bytes.len() < expected {
            return Err(ImageIoError::Truncated {
                path: path.display().to_string(),
                expected,
                found: bytes.len(),
            });
        }
        bytes.truncate(expected);

        let element_size = header.element_type.size();
        if header.byte_order_msb != cfg!(target_endian = "big") && element_size > 1 {
            bytes
                .chunks_exact_mut(element_size)
                .for_each(|element| element.reverse());
        }

        let voxels = Self::decode::<T>(&bytes, &header);
        let (shape, spacing, origin) = Self::geometry(&header);
        let data = Array3::from_shape_vec(shape, voxels).map_err(|e| ImageIoError::Header {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Volume::new(data, spacing).with_origin(origin))
    }

    /// Store `image` as a header/raw pair at `path`.
    ///
    /// The destination directory must exist and be writable.
    pub fn write_image(
        path: impl AsRef<Path>,
        image: &(impl WritableImage + ?Sized),
        verbose: bool,
    ) -> Result<(), ImageIoError> {
        let path = path.as_ref();
        image.write_meta_image(path)?;
        if verbose {
            info!("file \"{}\" written", path.display());
        }
        Ok(())
    }

    fn data_file_path(header_path: &Path, data_file: &str) -> PathBuf {
        match header_path.parent() {
            Some(dir) => dir.join(data_file),
            None => PathBuf::from(data_file),
        }
    }

    fn skip_header(bytes: Vec<u8>, header_size: i64, data_len: usize) -> Vec<u8> {
        let skip = if header_size < 0 {
            bytes.len().saturating_sub(data_len)
        } else {
            usize::try_from(header_size).map_or(bytes.len(), |size| size.min(bytes.len()))
        };
        if skip == 0 {
            bytes
        } else {
            bytes[skip..].to_vec()
        }
    }

    fn decode<T: Voxel>(bytes: &[u8], header: &MetaImageHeader) -> Vec<T> {
        use crate::enums::ElementType;

        fn convert<S: Voxel, T: Voxel>(bytes: &[u8]) -> Vec<T> {
            bytes
                .chunks_exact(std::mem::size_of::<S>())
                .map(|chunk| T::from_f64(bytemuck::pod_read_unaligned::<S>(chunk).to_f64()))
                .collect()
        }

        match header.element_type {
            ElementType::Char => convert::<i8, T>(bytes),
            ElementType::UChar => convert::<u8, T>(bytes),
            ElementType::Short => convert::<i16, T>(bytes),
            ElementType::UShort => convert::<u16, T>(bytes),
            ElementType::Int => convert::<i32, T>(bytes),
            ElementType::UInt => convert::<u32, T>(bytes),
            ElementType::Float => convert::<f32, T>(bytes),
            ElementType::Double => convert::<f64, T>(bytes),
        }
    }

    /// Array shape (z, y, x), spacing and origin (x, y, z) of the header.
    #[allow(clippy::type_complexity)]
    fn geometry(
        header: &MetaImageHeader,
    ) -> ((usize, usize, usize), (f32, f32, f32), (f32, f32, f32)) {
        let extent = |i: usize| header.dim_size.get(i).copied().unwrap_or(1);
        let spacing = |i: usize| header.element_spacing.get(i).copied().unwrap_or(1.0);
        let origin = |i: usize| header.offset.get(i).copied().unwrap_or(0.0);

        (
            (extent(2), extent(1), extent(0)),
            (spacing(0), spacing(1), spacing(2)),
            (origin(0), origin(1), origin(2)),
        )
    }
}
