//! Display images with an external viewer.
//!
//! Every invocation walks through [`ViewerState`]: inputs are resolved or
//! written to temporary files, the viewer command is built and run, and the
//! temporary files are deleted once the viewer process has exited. An
//! invocation owns its temporary files and child process exclusively, so any
//! number of invocations may run side by side.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::enums::ViewerState;
use crate::locator::{ImageLocator, ResolveError};
use crate::meta_image::ImageIoError;
use crate::temp_image::{TempImage, materialize};
use crate::volume_loader::WritableImage;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("grey image unavailable: {0}")]
    Resolve(#[from] ResolveError),

    #[error("failed to write temporary image: {0}")]
    Materialize(#[from] ImageIoError),

    #[error("failed to run viewer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove temporary image '{path}': {source}")]
    Cleanup {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("viewer task failed: {0}")]
    Task(String),
}

/// An image to display: a file name or an image held in memory.
#[derive(Clone)]
pub enum ViewerInput {
    /// Resolved against the data root; never deleted.
    File(PathBuf),
    /// Written to a temporary pair that is deleted after display.
    Image(Arc<dyn WritableImage>),
}

impl ViewerInput {
    pub fn file(name: impl Into<PathBuf>) -> Self {
        Self::File(name.into())
    }

    pub fn image(image: impl WritableImage + 'static) -> Self {
        Self::Image(Arc::new(image))
    }

    pub fn shared(image: Arc<dyn WritableImage>) -> Self {
        Self::Image(image)
    }
}

impl fmt::Debug for ViewerInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Image(_) => f.write_str("Image(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewRequest {
    pub grey: ViewerInput,
    pub segmentation: Option<ViewerInput>,
    /// Prefix for the temporary grey image name
    pub comment: String,
    /// Overrides the configured viewer executable
    pub viewer_command: Option<PathBuf>,
}

impl ViewRequest {
    pub fn new(grey: ViewerInput) -> Self {
        Self {
            grey,
            segmentation: None,
            comment: String::new(),
            viewer_command: None,
        }
    }

    pub fn with_segmentation(mut self, segmentation: ViewerInput) -> Self {
        self.segmentation = Some(segmentation);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_viewer_command(mut self, viewer_command: impl Into<PathBuf>) -> Self {
        self.viewer_command = Some(viewer_command.into());
        self
    }
}

/// Command line of one viewer launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl ViewerCommand {
    /// `program grey`, or `program -g grey -s segmentation`.
    pub fn new(program: impl Into<PathBuf>, grey: &Path, segmentation: Option<&Path>) -> Self {
        let args = match segmentation {
            Some(segmentation) => vec![
                OsString::from("-g"),
                grey.as_os_str().to_owned(),
                OsString::from("-s"),
                segmentation.as_os_str().to_owned(),
            ],
            None => vec![grey.as_os_str().to_owned()],
        };
        Self {
            program: program.into(),
            args,
        }
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(self.program.as_os_str().to_owned())
            .chain(self.args.iter().cloned())
            .collect()
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

/// Runs a viewer command to completion.
pub trait ProcessRunner: Send + Sync {
    /// Spawn `command` and block until it exits.
    ///
    /// Returns the exit code, `None` if the process was killed by a signal.
    fn run(&self, command: &ViewerCommand) -> io::Result<Option<i32>>;
}

/// Spawns real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, command: &ViewerCommand) -> io::Result<Option<i32>> {
        let status = command.to_command().status()?;
        Ok(status.code())
    }
}

/// Outcome of a finished viewer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewReport {
    pub command: ViewerCommand,
    /// Headers of the temporary pairs that were deleted
    pub removed: Vec<PathBuf>,
    /// Recorded but never interpreted as success or failure
    pub exit_code: Option<i32>,
}

/// Completion handle of a viewer running in the background.
pub struct ViewerHandle {
    task: JoinHandle<Result<ViewReport, ViewerError>>,
}

impl ViewerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the viewer to close and its temporary files to be removed.
    pub async fn wait(self) -> Result<ViewReport, ViewerError> {
        self.task
            .await
            .map_err(|e| ViewerError::Task(e.to_string()))?
    }
}

/// Per-invocation bookkeeping.
struct Session {
    state: ViewerState,
    temporaries: Vec<TempImage>,
}

impl Session {
    fn new() -> Self {
        Self {
            state: ViewerState::Preparing,
            temporaries: Vec::new(),
        }
    }

    fn transition(&mut self, next: ViewerState) {
        debug!(from = ?self.state, to = ?next, "viewer state");
        self.state = next;
    }

    /// Delete every temporary pair, reporting the first failure.
    fn clean_up(&mut self) -> Result<Vec<PathBuf>, ViewerError> {
        let mut removed = Vec::with_capacity(self.temporaries.len());
        let mut first_error = None;

        for temp in self.temporaries.drain(..) {
            match temp.remove() {
                Ok(()) => removed.push(temp.header().to_path_buf()),
                Err(source) => {
                    warn!("failed to remove {}: {source}", temp.header().display());
                    first_error.get_or_insert(ViewerError::Cleanup {
                        path: temp.header().display().to_string(),
                        source,
                    });
                }
            }
        }
        self.transition(ViewerState::CleanedUp);

        match first_error {
            Some(error) => Err(error),
            None => Ok(removed),
        }
    }

    /// Drop temporaries after a failure before launch.
    fn abort(&mut self) {
        self.temporaries.drain(..).for_each(|temp| temp.discard());
    }
}

#[derive(Clone)]
pub struct ImageViewer {
    config: Config,
    locator: ImageLocator,
    runner: Arc<dyn ProcessRunner>,
}

impl ImageViewer {
    pub fn new(config: Config) -> Self {
        Self::with_runner(config, Arc::new(SystemRunner))
    }

    pub fn with_runner(config: Config, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            locator: ImageLocator::from_config(&config),
            config,
            runner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Display the request and block until the viewer has exited and its
    /// temporary files are removed.
    ///
    /// # Errors
    ///
    /// Fails before launch if the grey image cannot be resolved or written,
    /// and afterwards if the viewer cannot be spawned or the temporary
    /// files cannot be deleted.
    pub fn view_blocking(&self, request: ViewRequest) -> Result<ViewReport, ViewerError> {
        let mut session = Session::new();

        let (grey, segmentation) = match self.prepare(&request, &mut session) {
            Ok(paths) => paths,
            Err(e) => {
                session.abort();
                return Err(e);
            }
        };

        let program = request
            .viewer_command
            .clone()
            .unwrap_or_else(|| self.config.viewer_command.clone());
        let command = ViewerCommand::new(program, &grey, segmentation.as_deref());
        session.transition(ViewerState::Launched);
        info!("launching viewer: {:?}", command.argv());

        session.transition(ViewerState::Waiting);
        let outcome = self.runner.run(&command).map_err(|source| ViewerError::Spawn {
            program: command.program.display().to_string(),
            source,
        });
        if let Ok(code) = &outcome {
            debug!("viewer exited with {code:?}");
        }

        let cleanup = session.clean_up();
        let exit_code = outcome?;
        let removed = cleanup?;

        Ok(ViewReport {
            command,
            removed,
            exit_code,
        })
    }

    /// Run [`ImageViewer::view_blocking`] on a background task.
    ///
    /// Returns immediately. Dropping the handle detaches the viewer, which
    /// still cleans up after itself.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn view(&self, request: ViewRequest) -> ViewerHandle {
        let viewer = self.clone();
        let task = tokio::task::spawn_blocking(move || viewer.view_blocking(request));
        ViewerHandle { task }
    }

    fn prepare(
        &self,
        request: &ViewRequest,
        session: &mut Session,
    ) -> Result<(PathBuf, Option<PathBuf>), ViewerError> {
        let grey = self.input_path(&request.grey, &request.comment, session)?;

        let segmentation = match &request.segmentation {
            None => None,
            Some(input) => match self.input_path(input, "", session) {
                Ok(path) => Some(path),
                Err(ViewerError::Resolve(e)) => {
                    warn!("showing grey image only: {e}");
                    None
                }
                Err(e) => return Err(e),
            },
        };

        Ok((grey, segmentation))
    }

    fn input_path(
        &self,
        input: &ViewerInput,
        label: &str,
        session: &mut Session,
    ) -> Result<PathBuf, ViewerError> {
        match input {
            ViewerInput::File(name) => Ok(self.locator.resolve(name)?),
            ViewerInput::Image(image) => {
                let temp = materialize(Some(&**image), label, &self.config.temp_dir)?
                    .ok_or_else(|| ImageIoError::Unsupported {
                        path: self.config.temp_dir.display().to_string(),
                        reason: "nothing to materialize".into(),
                    })?;
                let path = temp.header().to_path_buf();
                session.temporaries.push(temp);
                Ok(path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grey_only_command() {
        let command = ViewerCommand::new("/GB/itksnap/bin/itksnap", Path::new("/tmp/grey.mhd"), None);
        assert_eq!(
            command.argv(),
            vec![OsString::from("/GB/itksnap/bin/itksnap"), OsString::from("/tmp/grey.mhd")]
        );
    }

    #[test]
    fn test_grey_and_segmentation_command() {
        let command = ViewerCommand::new(
            "snap",
            Path::new("/tmp/grey.mhd"),
            Some(Path::new("/tmp/seg.mhd")),
        );
        let argv: Vec<_> = command.argv().into_iter().map(|a| a.into_string().unwrap()).collect();
        assert_eq!(argv, ["snap", "-g", "/tmp/grey.mhd", "-s", "/tmp/seg.mhd"]);
    }

    #[test]
    fn test_to_command_matches_argv() {
        let command = ViewerCommand::new("snap", Path::new("a.mhd"), None);
        let process = command.to_command();
        assert_eq!(process.get_program(), "snap");
        assert_eq!(process.get_args().collect::<Vec<_>>(), ["a.mhd"]);
    }

    #[test]
    fn test_input_debug_hides_image() {
        use crate::volume::Volume;
        use ndarray::Array3;

        let input = ViewerInput::image(Volume::new(Array3::<u8>::zeros((1, 1, 1)), (1.0, 1.0, 1.0)));
        assert_eq!(format!("{input:?}"), "Image(..)");
        assert_eq!(format!("{:?}", ViewerInput::file("a.mhd")), "File(\"a.mhd\")");
    }
}
