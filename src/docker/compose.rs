// Docker Compose control for the boulder project
// Commands run with the boulder checkout as working directory; the harness
// never changes its own.

use crate::errors::{HarnessError, Result};
use crate::exec::{CommandRunner, CommandSpec};
use crate::jobs::BackgroundJob;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Docker Compose command variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeVariant {
    /// Legacy docker-compose (with hyphen)
    Hyphenated,
    /// Modern docker compose (no hyphen, subcommand of docker)
    Subcommand,
}

/// A compose project rooted at a directory
pub struct ComposeProject {
    runner: Arc<dyn CommandRunner>,
    dir: PathBuf,
    variant: ComposeVariant,
}

impl ComposeProject {
    /// Open the project in `dir`, detecting which compose CLI is installed
    pub fn detect(runner: Arc<dyn CommandRunner>, dir: &Path) -> Self {
        let variant = Self::detect_variant(runner.as_ref());
        Self::with_variant(runner, dir, variant)
    }

    pub fn with_variant(runner: Arc<dyn CommandRunner>, dir: &Path, variant: ComposeVariant) -> Self {
        Self {
            runner,
            dir: dir.to_path_buf(),
            variant,
        }
    }

    fn detect_variant(runner: &dyn CommandRunner) -> ComposeVariant {
        // Try modern "docker compose" first
        let modern = runner
            .output(&CommandSpec::new("docker").args(["compose", "version"]))
            .map(|out| out.success())
            .unwrap_or(false);

        if modern {
            ComposeVariant::Subcommand
        } else {
            ComposeVariant::Hyphenated
        }
    }

    pub fn variant(&self) -> ComposeVariant {
        self.variant
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cmd = match self.variant {
            ComposeVariant::Subcommand => CommandSpec::new("docker").arg("compose"),
            ComposeVariant::Hyphenated => CommandSpec::new("docker-compose"),
        };
        cmd.args(args).current_dir(&self.dir)
    }

    fn execute(&self, cmd: &CommandSpec) -> Result<String> {
        let out = self.runner.output(cmd)?;
        if !out.success() {
            return Err(HarnessError::DockerError(format!(
                "`{}` failed: {}",
                cmd.display(),
                out.stderr.trim()
            )));
        }
        Ok(out.stdout)
    }

    /// Stop any running containers of the project
    pub fn stop(&self) -> Result<()> {
        self.execute(&self.command(["stop"]))?;
        Ok(())
    }

    /// Start `service` detached with its ports published on the host.
    ///
    /// `envs` are set on the compose process, where the compose file
    /// interpolates them. Returns the started container's name.
    pub fn run_detached(&self, service: &str, envs: &[(String, String)]) -> Result<String> {
        let mut cmd = self.command(["run", "-d", "--service-ports", service]);
        for (key, value) in envs {
            cmd = cmd.env(key.clone(), value.clone());
        }
        let stdout = self.execute(&cmd)?;
        let container = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .unwrap_or(service)
            .to_string();
        Ok(container)
    }

    /// Hand the project to the job set; terminating the job stops it
    pub fn into_job(self, label: &str) -> ComposeJob {
        ComposeJob {
            label: label.to_string(),
            project: self,
            stopped: false,
        }
    }
}

/// Background job for a detached compose project started by this run
pub struct ComposeJob {
    label: String,
    project: ComposeProject,
    stopped: bool,
}

impl BackgroundJob for ComposeJob {
    fn label(&self) -> &str {
        &self.label
    }

    fn pid(&self) -> Option<u32> {
        None
    }

    fn is_running(&mut self) -> bool {
        !self.stopped
    }

    fn terminate(&mut self) -> Result<()> {
        tracing::info!("stopping {} in {}", self.label, self.project.dir().display());
        self.project.stop()?;
        self.stopped = true;
        Ok(())
    }
}
