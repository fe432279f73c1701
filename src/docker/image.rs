use crate::config::ImageConfig;
use crate::errors::{HarnessError, Result};
use crate::exec::{CommandRunner, CommandSpec};
use std::fmt;

/// Reference to the subject image for the rest of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn build_command(config: &ImageConfig) -> CommandSpec {
    let mut cmd = CommandSpec::new("docker").args(["build", "-t", config.tag.as_str()]);
    if let Some(dockerfile) = &config.dockerfile {
        cmd = cmd
            .arg("-f")
            .arg(dockerfile.to_string_lossy().to_string());
    }
    cmd.arg(config.context.to_string_lossy().to_string())
}

/// Build the subject image, streaming docker's output to the terminal.
///
/// With `build: false` the configured tag is used as is.
pub fn build_image(runner: &dyn CommandRunner, config: &ImageConfig) -> Result<ImageRef> {
    if !config.build {
        tracing::info!("skipping image build, using {}", config.tag);
        return Ok(ImageRef::new(config.tag.clone()));
    }

    super::ensure_available(runner)?;

    let cmd = build_command(config);
    tracing::info!("building {} from {}", config.tag, config.context.display());
    match runner.status(&cmd)? {
        Some(0) => Ok(ImageRef::new(config.tag.clone())),
        Some(code) => Err(HarnessError::DockerError(format!(
            "image build failed with exit code {}",
            code
        ))),
        None => Err(HarnessError::DockerError(
            "image build was terminated by a signal".to_string(),
        )),
    }
}
