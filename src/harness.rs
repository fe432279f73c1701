// Harness orchestrator
// Linear run: build, reap ports, ensure boulder, launch redirect helper,
// run the subject; cleanup always follows, whichever stage stopped the run.

use crate::clock::{Clock, SystemClock};
use crate::config::HarnessConfig;
use crate::dependency::{DependencyOutcome, DependencyStarter};
use crate::docker::{self, ImageRef};
use crate::errors::Result;
use crate::exec::{CommandRunner, SystemRunner};
use crate::jobs::{JobOutcome, JobSet};
use crate::ports::{self, PortReaper, ReapOutcome};
use crate::probe::{HttpProbe, ReadinessProbe, RetryPolicy};
use crate::redirect::{self, RedirectLauncher};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BuildImage,
    ReapPorts,
    EnsureDependency,
    LaunchRedirect,
    RunTest,
    Cleanup,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::BuildImage => "build image",
            Stage::ReapPorts => "reap ports",
            Stage::EnsureDependency => "ensure boulder",
            Stage::LaunchRedirect => "launch redirect helper",
            Stage::RunTest => "run subject",
            Stage::Cleanup => "cleanup",
        }
    }
}

/// Everything one run did, in the order it happened
#[derive(Debug, Default)]
pub struct RunReport {
    pub stages: Vec<Stage>,
    pub image: Option<ImageRef>,
    pub reaped: Vec<(u16, ReapOutcome)>,
    pub dependency: Option<DependencyOutcome>,
    pub subject_exit: Option<i32>,
    pub cleanup: Vec<JobOutcome>,
}

impl RunReport {
    /// Process exit code for the harness: the subject's, or 1 if it never
    /// produced one
    pub fn exit_code(&self) -> i32 {
        self.subject_exit.unwrap_or(1)
    }

    pub fn succeeded(&self) -> bool {
        self.subject_exit == Some(0)
    }
}

pub struct Harness {
    config: HarnessConfig,
    runner: Arc<dyn CommandRunner>,
    probe: Box<dyn ReadinessProbe>,
    clock: Arc<dyn Clock>,
    helper_exe: PathBuf,
}

impl Harness {
    /// Harness wired to the local host: real processes, HTTP and time
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let probe = HttpProbe::new(
            &config.boulder.directory_url,
            config.readiness.request_timeout()?,
        )?;
        let helper_exe = std::env::current_exe()?;
        Ok(Self::with_parts(
            config,
            Arc::new(SystemRunner),
            Box::new(probe),
            Arc::new(SystemClock),
            helper_exe,
        ))
    }

    pub fn with_parts(
        config: HarnessConfig,
        runner: Arc<dyn CommandRunner>,
        probe: Box<dyn ReadinessProbe>,
        clock: Arc<dyn Clock>,
        helper_exe: PathBuf,
    ) -> Self {
        Self {
            config,
            runner,
            probe,
            clock,
            helper_exe,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every stage. Cleanup runs even when a stage fails; the stage's
    /// error is returned after it.
    pub fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::default();
        let mut jobs = JobSet::new();

        let result = self.run_stages(&mut jobs, &mut report);

        self.enter(Stage::Cleanup, &mut report);
        report.cleanup = jobs.terminate_all();
        for outcome in &report.cleanup {
            match outcome {
                JobOutcome::Terminated { label } => println!("  {} stopped {}", "✓".green(), label),
                JobOutcome::AlreadyExited { label } => {
                    println!("  {} {} had already exited", "✓".green(), label)
                }
                JobOutcome::Failed { label, reason } => {
                    println!("  {} could not stop {}: {}", "⚠".yellow(), label, reason)
                }
            }
        }

        result.map(|()| report)
    }

    fn run_stages(&self, jobs: &mut JobSet, report: &mut RunReport) -> Result<()> {
        self.enter(Stage::BuildImage, report);
        let image = docker::build_image(self.runner.as_ref(), &self.config.image)?;
        println!("  {} image {}", "✓".green(), image.to_string().cyan());
        report.image = Some(image.clone());

        self.enter(Stage::ReapPorts, report);
        if !self.config.reap_ports.is_empty() {
            ports::warn_if_unprivileged();
        }
        report.reaped = PortReaper::new(self.runner.clone()).reap_all(&self.config.reap_ports);
        for (port, outcome) in &report.reaped {
            print_reap(*port, outcome);
        }

        self.enter(Stage::EnsureDependency, report);
        let starter = DependencyStarter::new(
            &self.config.boulder,
            self.runner.clone(),
            self.probe.as_ref(),
            self.clock.as_ref(),
            self.retry_policy()?,
        );
        let dependency = starter.ensure_running(jobs)?;
        match &dependency {
            DependencyOutcome::AlreadyRunning => {
                println!("  {} boulder already running", "✓".green())
            }
            DependencyOutcome::Started { container, attempts } => println!(
                "  {} boulder started ({}, ready after {} checks)",
                "✓".green(),
                container,
                attempts
            ),
        }
        report.dependency = Some(dependency);

        self.enter(Stage::LaunchRedirect, report);
        let helper = redirect::helper_command(&self.config.redirect, &self.helper_exe);
        let reaped = RedirectLauncher::new(&self.config.redirect, self.runner.clone())
            .launch(&helper, jobs)?;
        print_reap(self.config.redirect.port, &reaped);
        println!(
            "  {} redirect helper on port {}",
            "✓".green(),
            self.config.redirect.port
        );

        self.enter(Stage::RunTest, report);
        report.subject_exit = docker::run_subject(self.runner.as_ref(), &image, &self.config)?;
        match report.subject_exit {
            Some(0) => println!("  {} subject passed", "✓".green().bold()),
            Some(code) => println!("  {} subject failed with exit code {}", "✗".red().bold(), code),
            None => println!("  {} subject was killed by a signal", "✗".red().bold()),
        }

        Ok(())
    }

    fn retry_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy {
            interval: self.config.readiness.interval()?,
            max_attempts: self.config.readiness.max_attempts,
        })
    }

    fn enter(&self, stage: Stage, report: &mut RunReport) {
        tracing::debug!("entering stage {:?}", stage);
        println!("{} {}", "==>".cyan().bold(), stage.as_str().bold());
        report.stages.push(stage);
    }
}

fn print_reap(port: u16, outcome: &ReapOutcome) {
    match outcome {
        ReapOutcome::NotFound => println!("  {} port {} is free", "✓".green(), port),
        ReapOutcome::Killed(pids) => println!(
            "  {} port {} freed (killed {})",
            "✓".green(),
            port,
            pids.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
        ),
        ReapOutcome::KillFailed { pid, reason, .. } => println!(
            "  {} port {}: could not kill pid {}: {}",
            "⚠".yellow(),
            port,
            pid,
            reason
        ),
        ReapOutcome::LookupFailed(reason) => {
            println!("  {} port {}: {}", "⚠".yellow(), port, reason)
        }
    }
}
