// Docker tooling: compose control for boulder, image build and the subject run

pub mod compose;
pub mod image;
pub mod subject;

use crate::errors::{HarnessError, Result};
use crate::exec::{CommandRunner, CommandSpec};

pub use compose::{ComposeJob, ComposeProject};
pub use image::{build_image, ImageRef};
pub use subject::{run_subject, subject_command};

/// Verify that the Docker daemon is reachable
pub fn ensure_available(runner: &dyn CommandRunner) -> Result<()> {
    let cmd = CommandSpec::new("docker").args(["version", "--format", "{{.Server.Version}}"]);
    let out = runner.output(&cmd).map_err(|e| {
        if e.is_missing_program() {
            HarnessError::DockerError("Docker is not installed. Please install Docker.".to_string())
        } else {
            e
        }
    })?;

    if !out.success() {
        return Err(HarnessError::DockerError(format!(
            "docker daemon is not running: {}",
            out.stderr.trim()
        )));
    }
    tracing::debug!("docker server version {}", out.stdout.trim());
    Ok(())
}
