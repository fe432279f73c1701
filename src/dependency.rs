// Dependency starter: makes sure boulder answers before the subject runs
use crate::clock::Clock;
use crate::config::BoulderConfig;
use crate::docker::ComposeProject;
use crate::errors::{HarnessError, Result};
use crate::exec::CommandRunner;
use crate::jobs::JobSet;
use crate::probe::{wait_until_ready, ReadinessProbe, RetryPolicy};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyOutcome {
    /// Boulder answered the first check; nothing was stopped or started
    AlreadyRunning,
    /// Boulder was restarted and answered after `attempts` checks
    Started { container: String, attempts: u32 },
}

pub struct DependencyStarter<'a> {
    config: &'a BoulderConfig,
    runner: Arc<dyn CommandRunner>,
    probe: &'a dyn ReadinessProbe,
    clock: &'a dyn Clock,
    policy: RetryPolicy,
}

impl<'a> DependencyStarter<'a> {
    pub fn new(
        config: &'a BoulderConfig,
        runner: Arc<dyn CommandRunner>,
        probe: &'a dyn ReadinessProbe,
        clock: &'a dyn Clock,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            config,
            runner,
            probe,
            clock,
            policy,
        }
    }

    /// Ensure boulder is reachable, (re)starting it from its checkout if not.
    ///
    /// A boulder started here is tracked in `jobs` unless `keep_running` is set.
    pub fn ensure_running(&self, jobs: &mut JobSet) -> Result<DependencyOutcome> {
        if self.probe.check() {
            tracing::info!("boulder is already running at {}", self.probe.target());
            return Ok(DependencyOutcome::AlreadyRunning);
        }

        let dir = self.boulder_dir()?;
        tracing::info!("boulder is not running, starting it from {}", dir.display());

        let project = ComposeProject::detect(self.runner.clone(), &dir);
        if let Err(e) = project.stop() {
            tracing::warn!("could not stop previous boulder: {}", e);
        }
        let container = project.run_detached(
            &self.config.service,
            &[("FAKE_DNS".to_string(), self.config.fake_dns.clone())],
        )?;
        tracing::info!("started {}", container);

        if self.config.keep_running {
            tracing::info!("boulder will be left running after this run");
        } else {
            jobs.track(Box::new(project.into_job("boulder")));
        }

        let attempts = wait_until_ready(self.probe, self.clock, self.policy)?;
        Ok(DependencyOutcome::Started {
            container,
            attempts,
        })
    }

    fn boulder_dir(&self) -> Result<PathBuf> {
        let dir = self.config.dir.clone().ok_or(HarnessError::BoulderNotFound)?;
        if !dir.is_dir() {
            return Err(HarnessError::ConfigError(format!(
                "boulder directory {} does not exist",
                dir.display()
            )));
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;
    use crate::exec::test_support::RecordingRunner;
    use crate::probe::test_support::ScriptedProbe;
    use std::time::Duration;
    use tempfile::TempDir;

    fn policy() -> RetryPolicy {
        RetryPolicy::unbounded(Duration::from_secs(1))
    }

    #[test]
    fn test_running_dependency_is_left_alone() {
        let runner = Arc::new(RecordingRunner::new());
        let probe = ScriptedProbe::ready();
        let clock = FakeClock::new();
        let config = BoulderConfig::default();
        let mut jobs = JobSet::new();

        let starter = DependencyStarter::new(&config, runner.clone(), &probe, &clock, policy());
        let outcome = starter.ensure_running(&mut jobs).unwrap();

        assert_eq!(outcome, DependencyOutcome::AlreadyRunning);
        assert!(runner.commands().is_empty());
        assert!(jobs.is_empty());
        assert_eq!(probe.checks(), 1);
    }

    #[test]
    fn test_missing_dir_is_fatal() {
        let runner = Arc::new(RecordingRunner::new());
        let probe = ScriptedProbe::never_ready();
        let clock = FakeClock::new();
        let config = BoulderConfig::default();
        let mut jobs = JobSet::new();

        let starter = DependencyStarter::new(&config, runner.clone(), &probe, &clock, policy());
        let result = starter.ensure_running(&mut jobs);

        assert!(matches!(result, Err(HarnessError::BoulderNotFound)));
        assert!(runner.commands().is_empty());
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_nonexistent_dir_is_config_error() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let probe = ScriptedProbe::never_ready();
        let clock = FakeClock::new();
        let config = BoulderConfig {
            dir: Some(temp.path().join("missing")),
            ..Default::default()
        };
        let mut jobs = JobSet::new();

        let starter = DependencyStarter::new(&config, runner, &probe, &clock, policy());
        assert!(matches!(
            starter.ensure_running(&mut jobs),
            Err(HarnessError::ConfigError(_))
        ));
    }

    #[test]
    fn test_single_stop_start_cycle_then_polling() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        // First check decides to start; three more failures while booting
        let probe = ScriptedProbe::failing_times(4);
        let clock = FakeClock::new();
        let config = BoulderConfig {
            dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let mut jobs = JobSet::new();

        let starter = DependencyStarter::new(&config, runner.clone(), &probe, &clock, policy());
        let outcome = starter.ensure_running(&mut jobs).unwrap();

        assert_eq!(
            outcome,
            DependencyOutcome::Started {
                container: "boulder".into(),
                attempts: 4
            }
        );
        assert_eq!(
            runner.commands(),
            vec![
                "docker compose version",
                "docker compose stop",
                "FAKE_DNS=172.17.0.1 docker compose run -d --service-ports boulder",
            ]
        );
        assert_eq!(clock.sleeps().len(), 3);
        assert_eq!(jobs.labels(), vec!["boulder"]);
        // Dropping the set at the end of the test stops the project
        drop(jobs);
        assert_eq!(runner.count_matching("docker compose stop"), 2);
    }

    #[test]
    fn test_keep_running_is_not_tracked() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let probe = ScriptedProbe::failing_times(1);
        let clock = FakeClock::new();
        let config = BoulderConfig {
            dir: Some(temp.path().to_path_buf()),
            keep_running: true,
            ..Default::default()
        };
        let mut jobs = JobSet::new();

        let starter = DependencyStarter::new(&config, runner, &probe, &clock, policy());
        starter.ensure_running(&mut jobs).unwrap();
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_start_failure_skips_polling() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new().reply("--service-ports", 1, ""));
        let probe = ScriptedProbe::never_ready();
        let clock = FakeClock::new();
        let config = BoulderConfig {
            dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let mut jobs = JobSet::new();

        let starter = DependencyStarter::new(&config, runner, &probe, &clock, policy());
        assert!(matches!(
            starter.ensure_running(&mut jobs),
            Err(HarnessError::DockerError(_))
        ));
        assert_eq!(probe.checks(), 1);
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_stop_failure_still_starts() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new().reply("stop", 1, ""));
        let probe = ScriptedProbe::failing_times(1);
        let clock = FakeClock::new();
        let config = BoulderConfig {
            dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let mut jobs = JobSet::new();

        let starter = DependencyStarter::new(&config, runner.clone(), &probe, &clock, policy());
        let outcome = starter.ensure_running(&mut jobs).unwrap();

        assert!(matches!(outcome, DependencyOutcome::Started { .. }));
        assert_eq!(runner.count_matching("--service-ports"), 1);
        assert_eq!(jobs.len(), 1);
    }
}
