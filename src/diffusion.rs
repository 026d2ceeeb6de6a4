//! Gradient anisotropic diffusion.
//!
//! Perona-Malik diffusion with the exponential conductance function
//! `g(d) = exp(-d² / K)`, where `K` is twice the conductance parameter
//! squared times the mean squared gradient magnitude of the current
//! iterate, matching ITK's `GradientNDAnisotropicDiffusionFunction`. Edges
//! whose gradient is large relative to the image average diffuse little,
//! homogeneous regions are smoothed.

use ndarray::{Array3, Axis};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::parameters::{ParameterDictionary, ParameterError};
use crate::volume::Volume;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffusionParams {
    pub iterations: usize,
    pub time_step: f32,
    pub conductance: f32,
}

impl Default for DiffusionParams {
    fn default() -> Self {
        Self {
            iterations: 5,
            time_step: 0.025,
            conductance: 1.0,
        }
    }
}

impl DiffusionParams {
    /// Defaults overridden by `NumberOfIterations`, `TimeStep` and
    /// `ConductanceParameter` entries of a parameter file.
    pub fn from_parameters(parameters: &ParameterDictionary) -> Result<Self, ParameterError> {
        let defaults = Self::default();
        Ok(Self {
            iterations: parameters
                .get_parsed("NumberOfIterations", 0)?
                .unwrap_or(defaults.iterations),
            time_step: parameters
                .get_parsed("TimeStep", 0)?
                .unwrap_or(defaults.time_step),
            conductance: parameters
                .get_parsed("ConductanceParameter", 0)?
                .unwrap_or(defaults.conductance),
        })
    }
}

pub struct GradientAnisotropicDiffusion {
    params: DiffusionParams,
}

impl GradientAnisotropicDiffusion {
    pub fn new(params: DiffusionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DiffusionParams {
        &self.params
    }

    /// Run the configured number of iterations and return the result as a new volume.
    pub fn apply(&self, input: &Volume<f32>) -> Volume<f32> {
        let spacing = [input.spacing.2, input.spacing.1, input.spacing.0];
        self.check_time_step(&spacing);

        let mut current = input.data.clone();
        for iteration in 0..self.params.iterations {
            let mean_gradient = Self::mean_squared_gradient(&current, &spacing);
            let k = 2.0 * self.params.conductance * self.params.conductance * mean_gradient;
            if !(k.is_finite() && k > 0.0) {
                debug!("image is flat after {iteration} iterations, stopping");
                break;
            }
            current = self.step(&current, &spacing, k);
        }

        Volume {
            data: current,
            spacing: input.spacing,
            origin: input.origin,
        }
    }

    fn check_time_step(&self, spacing: &[f32; 3]) {
        let min_spacing = spacing.iter().copied().fold(f32::INFINITY, f32::min);
        // explicit scheme limit for three dimensions
        let limit = min_spacing / 16.0;
        if self.params.time_step > limit {
            warn!(
                "time step {} exceeds the stable limit {limit} for spacing {min_spacing}",
                self.params.time_step
            );
        }
    }

    /// One explicit update. `spacing` is in array axis order (z, y, x).
    fn step(&self, current: &Array3<f32>, spacing: &[f32; 3], k: f32) -> Array3<f32> {
        let dim = current.dim();
        let extents = [dim.0, dim.1, dim.2];
        let dt = self.params.time_step;
        let mut next = Array3::<f32>::zeros(dim);

        next.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(z, mut plane)| {
                for y in 0..extents[1] {
                    for x in 0..extents[2] {
                        let index = [z, y, x];
                        let center = current[index];
                        let mut update = 0.0;

                        for axis in 0..3 {
                            let h = spacing[axis];
                            let forward = current[Self::neighbor(index, axis, 1, &extents)];
                            let backward = current[Self::neighbor(index, axis, -1, &extents)];

                            let d_forward = (forward - center) / h;
                            let d_backward = (center - backward) / h;
                            let flux_forward = (-(d_forward * d_forward) / k).exp() * d_forward;
                            let flux_backward = (-(d_backward * d_backward) / k).exp() * d_backward;
                            update += (flux_forward - flux_backward) / h;
                        }

                        plane[[y, x]] = center + dt * update;
                    }
                }
            });

        next
    }

    fn mean_squared_gradient(data: &Array3<f32>, spacing: &[f32; 3]) -> f32 {
        let dim = data.dim();
        let extents = [dim.0, dim.1, dim.2];
        let count = data.len();
        if count == 0 {
            return 0.0;
        }

        let total: f64 = (0..extents[0])
            .into_par_iter()
            .map(|z| {
                let mut sum = 0.0_f64;
                for y in 0..extents[1] {
                    for x in 0..extents[2] {
                        let index = [z, y, x];
                        for axis in 0..3 {
                            let forward = data[Self::neighbor(index, axis, 1, &extents)];
                            let backward = data[Self::neighbor(index, axis, -1, &extents)];
                            let derivative = (forward - backward) / (2.0 * spacing[axis]);
                            sum += f64::from(derivative * derivative);
                        }
                    }
                }
                sum
            })
            .sum();

        (total / count as f64) as f32
    }

    /// Neighbour along `axis`, clamped to the volume (zero flux across the border).
    #[inline]
    fn neighbor(index: [usize; 3], axis: usize, delta: isize, extents: &[usize; 3]) -> [usize; 3] {
        let mut neighbor = index;
        neighbor[axis] = index[axis]
            .saturating_add_signed(delta)
            .min(extents[axis].saturating_sub(1));
        neighbor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_step() -> Volume<f32> {
        let data = Array3::from_shape_fn((6, 8, 8), |(z, y, x)| {
            let base = if x < 4 { 0.0 } else { 100.0 };
            let noise = ((x * 7 + y * 13 + z * 17) % 5) as f32 - 2.0;
            base + noise
        });
        Volume::new(data, (1.0, 1.0, 1.0))
    }

    fn variance(values: impl Iterator<Item = f32>) -> f32 {
        let values: Vec<f32> = values.collect();
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32
    }

    #[test]
    fn test_default_params() {
        let params = DiffusionParams::default();
        assert_eq!(params.iterations, 5);
        assert_eq!(params.time_step, 0.025);
        assert_eq!(params.conductance, 1.0);
    }

    #[test]
    fn test_params_from_parameter_file() {
        let parameters = ParameterDictionary::parse("NumberOfIterations 10\nTimeStep 0.01\n", '#', "p");
        let params = DiffusionParams::from_parameters(&parameters).unwrap();
        assert_eq!(params.iterations, 10);
        assert_eq!(params.time_step, 0.01);
        assert_eq!(params.conductance, 1.0);
    }

    #[test]
    fn test_constant_volume_unchanged() {
        let volume = Volume::new(Array3::from_elem((3, 3, 3), 42.0_f32), (1.0, 1.0, 1.0));
        let output = GradientAnisotropicDiffusion::new(DiffusionParams::default()).apply(&volume);
        assert_eq!(output, volume);
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        let volume = noisy_step();
        let filter = GradientAnisotropicDiffusion::new(DiffusionParams {
            iterations: 0,
            ..DiffusionParams::default()
        });
        assert_eq!(filter.apply(&volume), volume);
    }

    #[test]
    fn test_smoothing_reduces_noise_and_keeps_mean() {
        let volume = noisy_step();
        let filter = GradientAnisotropicDiffusion::new(DiffusionParams {
            iterations: 20,
            time_step: 0.05,
            conductance: 1.0,
        });
        let output = filter.apply(&volume);

        let left = |v: &Volume<f32>| {
            v.data
                .indexed_iter()
                .filter(|((_, _, x), _)| *x < 3)
                .map(|(_, &value)| value)
                .collect::<Vec<_>>()
        };
        assert!(variance(left(&output).into_iter()) < variance(left(&volume).into_iter()));

        let mean_in = volume.data.mean().unwrap();
        let mean_out = output.data.mean().unwrap();
        assert!((mean_in - mean_out).abs() < 1e-2);

        // the step edge survives
        assert!(output.data[[3, 4, 7]] - output.data[[3, 4, 0]] > 80.0);
    }

    #[test]
    fn test_single_step_matches_hand_computation() {
        // mean squared gradient is 0.25, so K = 2 * 1² * 0.25 = 0.5
        let data = Array3::from_shape_vec((1, 1, 2), vec![0.0, 1.0]).unwrap();
        let volume = Volume::new(data, (1.0, 1.0, 1.0));
        let filter = GradientAnisotropicDiffusion::new(DiffusionParams {
            iterations: 1,
            time_step: 0.05,
            conductance: 1.0,
        });
        let output = filter.apply(&volume);

        let flux = (-2.0_f32).exp();
        assert!((output.data[[0, 0, 0]] - 0.05 * flux).abs() < 1e-6);
        assert!((output.data[[0, 0, 1]] - (1.0 - 0.05 * flux)).abs() < 1e-6);
    }

    #[test]
    fn test_geometry_preserved() {
        let volume = noisy_step().with_origin((1.0, 2.0, 3.0));
        let output = GradientAnisotropicDiffusion::new(DiffusionParams::default()).apply(&volume);
        assert_eq!(output.dim(), volume.dim());
        assert_eq!(output.origin, (1.0, 2.0, 3.0));
        assert_eq!(output.spacing, volume.spacing);
    }

    #[test]
    fn test_neighbor_clamps_at_border() {
        let extents = [2, 3, 4];
        assert_eq!(GradientAnisotropicDiffusion::neighbor([0, 0, 0], 0, -1, &extents), [0, 0, 0]);
        assert_eq!(GradientAnisotropicDiffusion::neighbor([1, 2, 3], 2, 1, &extents), [1, 2, 3]);
        assert_eq!(GradientAnisotropicDiffusion::neighbor([1, 1, 1], 1, 1, &extents), [1, 2, 1]);
    }
}
