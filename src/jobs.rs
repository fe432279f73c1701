// Background job tracking
// Everything a run starts in the background lands in a JobSet and is
// terminated by that same run, either explicitly or when the set is dropped.

use crate::errors::{HarnessError, Result};
use std::process::Child;

/// A process (or group of processes) running alongside the harness
pub trait BackgroundJob: Send {
    /// Short name used in logs, e.g. "redirect helper"
    fn label(&self) -> &str;

    /// OS process id, if the job is a single local process
    fn pid(&self) -> Option<u32>;

    /// Whether the job still needs terminating
    fn is_running(&mut self) -> bool;

    /// Terminate without waiting for a graceful shutdown
    fn terminate(&mut self) -> Result<()>;
}

/// A child process spawned by this harness
pub struct ChildJob {
    label: String,
    child: Child,
}

impl ChildJob {
    pub fn new(label: &str, child: Child) -> Self {
        Self {
            label: label.to_string(),
            child,
        }
    }
}

impl BackgroundJob for ChildJob {
    fn label(&self) -> &str {
        &self.label
    }

    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self) -> Result<()> {
        tracing::info!("sending SIGKILL to pid {}", self.child.id());
        match self.child.kill() {
            Ok(()) => {}
            // Already reaped: nothing left to kill
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => {
                return Err(HarnessError::CommandFailed(format!(
                    "failed to kill {} ({}): {}",
                    self.label,
                    self.child.id(),
                    e
                )))
            }
        }
        // Reap the zombie
        let _ = self.child.wait();
        Ok(())
    }
}

/// What happened to one job at cleanup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Terminated { label: String },
    AlreadyExited { label: String },
    Failed { label: String, reason: String },
}

impl JobOutcome {
    pub fn label(&self) -> &str {
        match self {
            JobOutcome::Terminated { label }
            | JobOutcome::AlreadyExited { label }
            | JobOutcome::Failed { label, .. } => label,
        }
    }
}

/// Arena of background jobs owned by a single harness run
#[derive(Default)]
pub struct JobSet {
    jobs: Vec<Box<dyn BackgroundJob>>,
}

impl JobSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a job until cleanup
    pub fn track(&mut self, job: Box<dyn BackgroundJob>) {
        match job.pid() {
            Some(pid) => tracing::debug!("tracking {} ({})", job.label(), pid),
            None => tracing::debug!("tracking {}", job.label()),
        }
        self.jobs.push(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.label().to_string()).collect()
    }

    /// Terminate every tracked job in the order it was tracked.
    ///
    /// Failures are reported per job, never propagated; the set is empty
    /// afterwards.
    pub fn terminate_all(&mut self) -> Vec<JobOutcome> {
        if !self.jobs.is_empty() {
            tracing::info!("performing shutdown clean up ({} jobs)", self.jobs.len());
        }

        self.jobs
            .drain(..)
            .map(|mut job| {
                let label = job.label().to_string();
                if !job.is_running() {
                    return JobOutcome::AlreadyExited { label };
                }
                match job.terminate() {
                    Ok(()) => JobOutcome::Terminated { label },
                    Err(e) => {
                        tracing::warn!("failed to terminate {}: {}", label, e);
                        JobOutcome::Failed {
                            label,
                            reason: e.to_string(),
                        }
                    }
                }
            })
            .collect()
    }
}

impl Drop for JobSet {
    fn drop(&mut self) {
        if !self.jobs.is_empty() {
            let _ = self.terminate_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::{FakeJob, JobLog};

    #[test]
    fn test_terminate_all_in_tracking_order() {
        let log = JobLog::default();
        let mut jobs = JobSet::new();
        jobs.track(Box::new(FakeJob::new("redirect helper", 10, log.clone())));
        jobs.track(Box::new(FakeJob::new("boulder", 11, log.clone())));

        let outcomes = jobs.terminate_all();

        assert_eq!(
            outcomes,
            vec![
                JobOutcome::Terminated {
                    label: "redirect helper".into()
                },
                JobOutcome::Terminated {
                    label: "boulder".into()
                },
            ]
        );
        assert_eq!(log.terminated(), vec!["redirect helper", "boulder"]);
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_exited_jobs_are_not_killed() {
        let log = JobLog::default();
        let mut jobs = JobSet::new();
        jobs.track(Box::new(FakeJob::new("gone", 10, log.clone()).exited()));

        let outcomes = jobs.terminate_all();

        assert_eq!(
            outcomes,
            vec![JobOutcome::AlreadyExited {
                label: "gone".into()
            }]
        );
        assert!(log.terminated().is_empty());
    }

    #[test]
    fn test_drop_terminates_leftovers() {
        let log = JobLog::default();
        {
            let mut jobs = JobSet::new();
            jobs.track(Box::new(FakeJob::new("leftover", 10, log.clone())));
        }
        assert_eq!(log.terminated(), vec!["leftover"]);
    }

    #[test]
    fn test_second_terminate_all_is_noop() {
        let log = JobLog::default();
        let mut jobs = JobSet::new();
        jobs.track(Box::new(FakeJob::new("once", 10, log.clone())));

        assert_eq!(jobs.terminate_all().len(), 1);
        assert!(jobs.terminate_all().is_empty());
        assert_eq!(log.terminated().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_child_job_kill() {
        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let mut job = ChildJob::new("sleeper", child);

        assert!(job.is_running());
        job.terminate().unwrap();
        assert!(!job.is_running());
    }
}
