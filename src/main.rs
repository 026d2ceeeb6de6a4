use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use medbv_view::{
    Config, DiffusionParams, ImageLocator, ImageViewer, Orientation, ParameterDictionary, Pipeline,
    ViewRequest, ViewerInput, Volume, VolumeLoader,
    prompt::{ArgumentSpec, fill_missing},
};

const FIND_CARIES_ARGUMENTS: [ArgumentSpec<'static>; 1] =
    [ArgumentSpec::new("Name of input image:", "CThead/CThead_l3.mhd")];

#[derive(Parser)]
#[command(name = "medbv-view")]
#[command(about = "Smooth MetaImage volumes and display them in an external viewer", version)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory relative image names are resolved against
    #[arg(long, env = "MED_BV_DATA_ROOT", global = true)]
    data_root: Option<PathBuf>,

    /// Viewer executable
    #[arg(long, env = "MED_BV_VIEWER_COMMAND", global = true)]
    viewer: Option<PathBuf>,

    /// Directory for temporary images handed to the viewer
    #[arg(long, global = true)]
    temp_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display an image, optionally with a segmentation overlay
    View {
        /// Grey value image
        grey: PathBuf,
        /// Segmentation image
        #[arg(short, long)]
        seg: Option<PathBuf>,
        /// Prefix for the names of temporary files
        #[arg(short, long, default_value = "")]
        comment: String,
    },

    /// Smooth an image with gradient anisotropic diffusion
    Smooth {
        /// Input image
        input: PathBuf,
        /// Where to write the smoothed image
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Parameter file overriding the diffusion defaults
        #[arg(short, long)]
        params: Option<PathBuf>,
        /// Display the smoothed image
        #[arg(long)]
        view: bool,
    },

    /// Smooth and segment an image, then display the result
    FindCaries {
        /// Input image, asked for interactively when omitted
        input: Option<PathBuf>,
        /// Parameter file overriding the diffusion defaults
        #[arg(short, long)]
        params: Option<PathBuf>,
    },

    /// Export one slice of an image as PNG
    Slice {
        /// Input image
        input: PathBuf,
        /// Output PNG file
        #[arg(short, long)]
        output: PathBuf,
        /// Slice index, defaults to the centre of the volume
        #[arg(short, long)]
        index: Option<usize>,
        /// axial, coronal or sagittal
        #[arg(long, default_value = "axial")]
        orientation: Orientation,
    },

    /// Print the contents of a parameter file
    Params {
        /// Parameter file
        file: PathBuf,
        /// Lines starting with this character are ignored
        #[arg(long, default_value_t = '#')]
        comment_char: char,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn build_config(cli: &Cli) -> Config {
    let mut config = Config::from_env();
    if let Some(data_root) = &cli.data_root {
        config = config.with_data_root(data_root);
    }
    if let Some(viewer) = &cli.viewer {
        config = config.with_viewer_command(viewer);
    }
    if let Some(temp_dir) = &cli.temp_dir {
        config = config.with_temp_dir(temp_dir);
    }
    config
}

fn load_pipeline(params: Option<&Path>) -> Result<Pipeline> {
    let params = match params {
        Some(path) => {
            let parameters = ParameterDictionary::from_file(path)?;
            DiffusionParams::from_parameters(&parameters)?
        }
        None => DiffusionParams::default(),
    };
    Ok(Pipeline::new(params))
}

fn read_volume(locator: &ImageLocator, name: &Path) -> Result<Volume<f32>> {
    VolumeLoader::read_image::<f32>(locator, name, 3, true)
        .with_context(|| format!("could not load \"{}\"", name.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = build_config(&cli);
    let locator = ImageLocator::from_config(&config);
    let viewer = ImageViewer::new(config);

    match cli.command {
        Commands::View { grey, seg, comment } => {
            let mut request = ViewRequest::new(ViewerInput::file(grey)).with_comment(comment);
            if let Some(seg) = seg {
                request = request.with_segmentation(ViewerInput::file(seg));
            }
            viewer.view_blocking(request)?;
        }

        Commands::Smooth {
            input,
            output,
            params,
            view,
        } => {
            let pipeline = load_pipeline(params.as_deref())?;
            let smoothed = pipeline.smooth(&read_volume(&locator, &input)?);

            if let Some(output) = &output {
                VolumeLoader::write_image(output, &smoothed, true)?;
            }
            if view {
                let request = ViewRequest::new(ViewerInput::image(smoothed)).with_comment("smoothed");
                viewer.view(request).wait().await?;
            } else if output.is_none() {
                warn!("neither --output nor --view given, result discarded");
            }
        }

        Commands::FindCaries { input, params } => {
            let supplied: Vec<String> = input.iter().map(|p| p.display().to_string()).collect();
            let stdin = io::stdin();
            let arguments = fill_missing(
                "find-caries",
                supplied,
                &FIND_CARIES_ARGUMENTS,
                !stdin.is_terminal(),
                &mut stdin.lock(),
                &mut io::stdout(),
            )?;
            let input = PathBuf::from(&arguments[0]);
            info!("{}", input.display());

            let pipeline = load_pipeline(params.as_deref())?;
            let segmented = pipeline.segment_image(&read_volume(&locator, &input)?);

            let handle =
                viewer.view(ViewRequest::new(ViewerInput::image(segmented)).with_comment("segmented"));
            info!("waiting for the viewer to exit");
            handle.wait().await?;
        }

        Commands::Slice {
            input,
            output,
            index,
            orientation,
        } => {
            let volume = read_volume(&locator, &input)?;
            let (depth, height, width) = volume.dim();
            let index = index.unwrap_or(match orientation {
                Orientation::Axial => depth / 2,
                Orientation::Coronal => height / 2,
                Orientation::Sagittal => width / 2,
            });
            let image = volume
                .slice_image(index, orientation)
                .with_context(|| format!("slice {index} is outside the volume"))?;
            image
                .save(&output)
                .with_context(|| format!("could not write {}", output.display()))?;
            info!("slice {index} written to {}", output.display());
        }

        Commands::Params { file, comment_char } => {
            let parameters = ParameterDictionary::from_file_with_comment(&file, comment_char)?;
            print!("{parameters}");
        }
    }

    Ok(())
}
