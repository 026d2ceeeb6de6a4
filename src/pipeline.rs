use crate::diffusion::{DiffusionParams, GradientAnisotropicDiffusion};
use crate::volume::Volume;

use tracing::info;

/// Smoothing followed by segmentation.
pub struct Pipeline {
    diffusion: GradientAnisotropicDiffusion,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(DiffusionParams::default())
    }
}

impl Pipeline {
    pub fn new(params: DiffusionParams) -> Self {
        Self {
            diffusion: GradientAnisotropicDiffusion::new(params),
        }
    }

    pub fn smooth(&self, input: &Volume<f32>) -> Volume<f32> {
        let params = self.diffusion.params();
        info!(
            "anisotropic diffusion: {} iterations, time step {}, conductance {}",
            params.iterations, params.time_step, params.conductance
        );
        self.diffusion.apply(input)
    }

    /// Segmentation stage.
    ///
    /// No segmentation is performed yet: the input is returned unchanged.
    pub fn segment(&self, input: Volume<f32>) -> Volume<f32> {
        input
    }

    /// Smooth `input`, then run the segmentation stage on the result.
    pub fn segment_image(&self, input: &Volume<f32>) -> Volume<f32> {
        self.segment(self.smooth(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn gradient_volume() -> Volume<f32> {
        let data = Array3::from_shape_fn((4, 4, 4), |(z, y, x)| ((x * 3 + y * 5 + z * 11) % 7) as f32);
        Volume::new(data, (1.0, 1.0, 1.0))
    }

    #[test]
    fn test_segment_returns_input_unchanged() {
        let volume = gradient_volume();
        assert_eq!(Pipeline::default().segment(volume.clone()), volume);
    }

    #[test]
    fn test_segment_image_equals_smoothing() {
        let pipeline = Pipeline::default();
        let volume = gradient_volume();
        assert_eq!(pipeline.segment_image(&volume), pipeline.smooth(&volume));
        assert_ne!(pipeline.smooth(&volume), volume);
    }
}
