use crate::enums::{ElementType, Orientation};

use image::{GrayImage, ImageBuffer};
use ndarray::{Array3, ArrayView2, s};
use rayon::prelude::*;

/// Scalar voxel types a [`Volume`] can hold.
pub trait Voxel: bytemuck::Pod + PartialEq + Send + Sync + 'static {
    const ELEMENT_TYPE: ElementType;

    fn to_f64(self) -> f64;

    /// Convert with `as` semantics, saturating for integer targets.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_voxel {
    ($($ty:ty => $element:ident),* $(,)?) => {
        $(
            impl Voxel for $ty {
                const ELEMENT_TYPE: ElementType = ElementType::$element;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value as $ty
                }
            }
        )*
    };
}

impl_voxel!(
    i8 => Char,
    u8 => UChar,
    i16 => Short,
    u16 => UShort,
    i32 => Int,
    u32 => UInt,
    f32 => Float,
    f64 => Double,
);

/// An in-memory image volume.
///
/// Data is stored as (depth, height, width), spacing and origin as (x, y, z).
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T: Voxel> {
    pub data: Array3<T>,
    pub spacing: (f32, f32, f32),
    pub origin: (f32, f32, f32),
}

impl<T: Voxel> Volume<T> {
    pub fn new(data: Array3<T>, spacing: (f32, f32, f32)) -> Self {
        Self {
            data,
            spacing,
            origin: (0.0, 0.0, 0.0),
        }
    }

    pub fn with_origin(mut self, origin: (f32, f32, f32)) -> Self {
        self.origin = origin;
        self
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<T> {
        &mut self.data
    }

    /// Convert every voxel to another voxel type.
    pub fn cast<U: Voxel>(&self) -> Volume<U> {
        Volume {
            data: self.data.mapv(|v| U::from_f64(v.to_f64())),
            spacing: self.spacing,
            origin: self.origin,
        }
    }

    /// Smallest and largest voxel value, `None` for an empty volume.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        if self.data.is_empty() {
            return None;
        }
        let range = self
            .data
            .par_iter()
            .map(|&v| (v.to_f64(), v.to_f64()))
            .reduce(
                || (f64::INFINITY, f64::NEG_INFINITY),
                |a, b| (a.0.min(b.0), a.1.max(b.1)),
            );
        Some(range)
    }

    pub fn slice(&self, index: usize, orientation: Orientation) -> Option<ArrayView2<'_, T>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let view = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(view)
    }

    /// Render one slice as an 8 bit image.
    ///
    /// Grey values are windowed to the value range of the whole volume so
    /// slices of the same volume stay comparable.
    pub fn slice_image(&self, index: usize, orientation: Orientation) -> Option<GrayImage> {
        let slice = self.slice(index, orientation)?;
        let (low, high) = self.value_range()?;
        let scale = if high > low { 255.0 / (high - low) } else { 0.0 };

        let (height, width) = slice.dim();
        let pixels: Vec<u8> = slice
            .iter()
            .map(|&v| ((v.to_f64() - low) * scale).round().clamp(0.0, 255.0) as u8)
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixels)
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let dim = self.data.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        };
        index < max_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Volume<u16> {
        let data = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 100 + y * 10 + x) as u16);
        Volume::new(data, (1.0, 1.0, 2.5))
    }

    #[test]
    fn test_slice_shapes() {
        let volume = ramp();
        assert_eq!(volume.slice(0, Orientation::Axial).unwrap().dim(), (3, 4));
        assert_eq!(volume.slice(2, Orientation::Coronal).unwrap().dim(), (2, 4));
        assert_eq!(volume.slice(3, Orientation::Sagittal).unwrap().dim(), (2, 3));
        assert!(volume.slice(2, Orientation::Axial).is_none());
        assert!(volume.slice(4, Orientation::Sagittal).is_none());
    }

    #[test]
    fn test_slice_image_windowing() {
        let volume = ramp();
        let image = volume.slice_image(1, Orientation::Axial).unwrap();

        assert_eq!(image.dimensions(), (4, 3));
        // 123 is the global maximum, 100 is 100/123 of the range
        assert_eq!(image.get_pixel(3, 2)[0], 255);
        assert_eq!(image.get_pixel(0, 0)[0], (100.0_f64 * 255.0 / 123.0).round() as u8);
    }

    #[test]
    fn test_constant_volume_renders_black() {
        let volume = Volume::new(Array3::from_elem((1, 2, 2), 7.0_f32), (1.0, 1.0, 1.0));
        let image = volume.slice_image(0, Orientation::Axial).unwrap();
        assert!(image.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_cast_saturates() {
        let volume = Volume::new(Array3::from_elem((1, 1, 2), 300.5_f32), (1.0, 1.0, 1.0));
        let cast: Volume<u8> = volume.cast();
        assert!(cast.data.iter().all(|&v| v == 255));
        assert_eq!(cast.spacing, volume.spacing);
    }

    #[test]
    fn test_value_range() {
        assert_eq!(ramp().value_range(), Some((0.0, 123.0)));
        let empty: Volume<u8> = Volume::new(Array3::zeros((0, 2, 2)), (1.0, 1.0, 1.0));
        assert_eq!(empty.value_range(), None);
    }
}
