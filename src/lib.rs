//! # medbv-view
//!
//! Load MetaImage volumes, smooth them with gradient anisotropic diffusion
//! and look at the result in an external viewer such as ITK-SNAP.
//!
//! Image names are resolved against a data root (`MED_BV_DATA_ROOT`) when
//! they do not point at an existing file. In-memory volumes handed to the
//! viewer are written to uniquely named temporary `.mhd`/`.raw` pairs that
//! are deleted as soon as the viewer process exits. The viewer executable is
//! taken from `MED_BV_VIEWER_COMMAND`.
//!
//! Environment variables are read once into a [`Config`] that is passed
//! explicitly from there on.
//!
//! # Examples
//!
//! ## Smoothing a volume and displaying it next to the original
//!
//! ```no_run
//! # use medbv_view::{Config, ImageLocator, ImageViewer, Pipeline, ViewRequest, ViewerInput, VolumeLoader};
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env();
//! let locator = ImageLocator::from_config(&config);
//!
//! let volume = VolumeLoader::read_image::<f32>(&locator, "CThead/CThead_l3.mhd", 3, true)?;
//! let smoothed = Pipeline::default().smooth(&volume);
//!
//! let viewer = ImageViewer::new(config);
//! let original = viewer.view(ViewRequest::new(ViewerInput::file("CThead/CThead_l3.mhd")));
//! let filtered = viewer.view(ViewRequest::new(ViewerInput::image(smoothed)).with_comment("smoothed"));
//!
//! original.wait().await?;
//! filtered.wait().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Reading a parameter file
//!
//! ```no_run
//! # use medbv_view::{DiffusionParams, ParameterDictionary};
//! let parameters = ParameterDictionary::from_file("smoothing.par").expect("should have read parameters");
//! let params = DiffusionParams::from_parameters(&parameters).expect("should have valid values");
//! ```

pub mod config;
pub mod diffusion;
pub mod enums;
pub mod locator;
pub mod meta_image;
pub mod parameters;
pub mod pipeline;
pub mod prompt;
pub mod temp_image;
pub mod viewer;
pub mod volume;
pub mod volume_loader;

pub use config::Config;
pub use diffusion::{DiffusionParams, GradientAnisotropicDiffusion};
pub use enums::{ElementType, Orientation, ViewerState};
pub use locator::{ImageLocator, ResolveError};
pub use meta_image::{ImageIoError, raw_data_path};
pub use parameters::{ParameterDictionary, ParameterError};
pub use pipeline::Pipeline;
pub use temp_image::{TempImage, materialize};
pub use viewer::{
    ImageViewer, ProcessRunner, SystemRunner, ViewReport, ViewRequest, ViewerCommand, ViewerError,
    ViewerHandle, ViewerInput,
};
pub use volume::{Volume, Voxel};
pub use volume_loader::{LoadError, VolumeLoader, WritableImage};
