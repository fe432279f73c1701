// External command execution
// Every tool the harness drives (docker, compose, lsof, kill) goes through
// CommandRunner so the orchestration can be exercised without a host.

use crate::errors::{HarnessError, Result};
use crate::jobs::{BackgroundJob, ChildJob};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A fully described command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Human readable form used in logs, e.g. `FAKE_DNS=1.2.3.4 docker compose up`
    pub fn display(&self) -> String {
        let mut parts: Vec<String> = self
            .envs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        parts.push(self.program.clone());
        parts.extend(self.args.iter().map(|a| {
            if a.is_empty() || a.contains(char::is_whitespace) {
                format!("'{}'", a)
            } else {
                a.clone()
            }
        }));
        parts.join(" ")
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }

    fn spawn_error(&self, source: std::io::Error) -> HarnessError {
        HarnessError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// None when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Seam between the harness and the host's process table
pub trait CommandRunner: Send + Sync {
    /// Run to completion with stdout/stderr captured
    fn output(&self, cmd: &CommandSpec) -> Result<CommandOutput>;

    /// Run to completion with stdio inherited, returning the exit code
    fn status(&self, cmd: &CommandSpec) -> Result<Option<i32>>;

    /// Start in the background; the caller owns the returned job
    fn spawn(&self, cmd: &CommandSpec, label: &str) -> Result<Box<dyn BackgroundJob>>;
}

/// Runs commands on the local host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn output(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!("running: {}", cmd.display());
        let output = cmd
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| cmd.spawn_error(e))?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn status(&self, cmd: &CommandSpec) -> Result<Option<i32>> {
        tracing::debug!("running: {}", cmd.display());
        let status = cmd
            .to_command()
            .stdin(Stdio::null())
            .status()
            .map_err(|e| cmd.spawn_error(e))?;
        Ok(status.code())
    }

    fn spawn(&self, cmd: &CommandSpec, label: &str) -> Result<Box<dyn BackgroundJob>> {
        let child = cmd
            .to_command()
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| cmd.spawn_error(e))?;
        tracing::info!("started {} ({})", label, child.id());
        Ok(Box::new(ChildJob::new(label, child)))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_whitespace_and_prefixes_env() {
        let cmd = CommandSpec::new("docker")
            .args(["compose", "run"])
            .arg("two words")
            .env("FAKE_DNS", "172.17.0.1");

        assert_eq!(
            cmd.display(),
            "FAKE_DNS=172.17.0.1 docker compose run 'two words'"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_output() {
        let cmd = CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]);
        let out = SystemRunner.output(&cmd).unwrap();

        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_applies_env_and_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let cmd = CommandSpec::new("sh")
            .args(["-c", "echo $HARNESS_VALUE; pwd"])
            .env("HARNESS_VALUE", "abc")
            .current_dir(temp.path());
        let out = SystemRunner.output(&cmd).unwrap();

        let mut lines = out.stdout.lines();
        assert_eq!(lines.next(), Some("abc"));
        let pwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(pwd, std::fs::canonicalize(temp.path()).unwrap());
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let cmd = CommandSpec::new("acme-harness-no-such-program");
        let err = SystemRunner.output(&cmd).unwrap_err();
        assert!(err.is_missing_program());
    }
}
