// Port reaper
// Frees fixed host ports by force-killing whatever is listening on them.
// Best effort: every failure becomes a ReapOutcome, never an error.

use crate::errors::{HarnessError, Result};
use crate::exec::{CommandRunner, CommandSpec};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

/// Result of freeing a single port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Nothing was listening; no kill was attempted
    NotFound,
    /// Every listener was killed
    Killed(Vec<u32>),
    /// At least one listener survived; `killed` lists the ones that did not
    KillFailed {
        pid: u32,
        reason: String,
        killed: Vec<u32>,
    },
    /// Listeners could not be enumerated at all
    LookupFailed(String),
}

pub struct PortReaper {
    runner: Arc<dyn CommandRunner>,
}

impl PortReaper {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Free every port in order, returning one outcome per port
    pub fn reap_all(&self, ports: &[u16]) -> Vec<(u16, ReapOutcome)> {
        ports.iter().map(|&port| (port, self.reap(port))).collect()
    }

    /// Kill every process listening on `port` with SIGKILL
    pub fn reap(&self, port: u16) -> ReapOutcome {
        let pids = match self.listeners(port) {
            Ok(pids) => pids,
            Err(e) => {
                tracing::warn!("could not look up listeners on port {}: {}", port, e);
                return ReapOutcome::LookupFailed(e.to_string());
            }
        };

        if pids.is_empty() {
            tracing::debug!("port {} is free", port);
            return ReapOutcome::NotFound;
        }

        let mut killed = Vec::new();
        let mut first_failure: Option<(u32, String)> = None;

        for pid in pids {
            match self.kill(pid) {
                Ok(()) => {
                    tracing::info!("killed pid {} listening on port {}", pid, port);
                    killed.push(pid);
                }
                Err(e) => {
                    tracing::warn!("failed to kill pid {} on port {}: {}", pid, port, e);
                    first_failure.get_or_insert((pid, e.to_string()));
                }
            }
        }

        match first_failure {
            None => ReapOutcome::Killed(killed),
            Some((pid, reason)) => ReapOutcome::KillFailed {
                pid,
                reason,
                killed,
            },
        }
    }

    /// Pids listening on a TCP port, excluding this process.
    ///
    /// Uses `lsof`, falling back to `netstat -tlnp` when lsof is not installed.
    pub fn listeners(&self, port: u16) -> Result<Vec<u32>> {
        let lsof = CommandSpec::new("lsof").args([
            "-t".to_string(),
            format!("-iTCP:{}", port),
            "-sTCP:LISTEN".to_string(),
        ]);

        let pids = match self.runner.output(&lsof) {
            // lsof exits 1 when nothing matches
            Ok(out) => parse_lsof_pids(&out.stdout),
            Err(e) if e.is_missing_program() => {
                tracing::debug!("lsof not installed, falling back to netstat");
                let netstat = CommandSpec::new("netstat").arg("-tlnp");
                match self.runner.output(&netstat) {
                    Ok(out) => parse_netstat_pids(&out.stdout, port),
                    Err(e) if e.is_missing_program() => {
                        return Err(HarnessError::CommandFailed(
                            "neither lsof nor netstat is installed".to_string(),
                        ))
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        let own_pid = std::process::id();
        Ok(pids.into_iter().filter(|&pid| pid != own_pid).collect())
    }

    fn kill(&self, pid: u32) -> Result<()> {
        let cmd = CommandSpec::new("kill").args(["-9".to_string(), pid.to_string()]);
        let out = self.runner.output(&cmd)?;
        if !out.success() {
            return Err(HarnessError::CommandFailed(format!(
                "kill -9 {}: {}",
                pid,
                out.stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Warn when listeners owned by other users will be invisible to lsof/netstat
pub fn warn_if_unprivileged() {
    #[cfg(unix)]
    {
        // SAFETY: geteuid() is a POSIX getter that always succeeds and has no side effects.
        let euid = unsafe { libc::geteuid() };
        if euid != 0 {
            tracing::warn!(
                "not running as root; listeners owned by other users on reaped ports may be missed"
            );
        }
    }
}

/// `lsof -t` prints one pid per line
fn parse_lsof_pids(stdout: &str) -> Vec<u32> {
    let unique: BTreeSet<u32> = stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect();
    unique.into_iter().collect()
}

fn netstat_line() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(r"^tcp6?\s+\d+\s+\d+\s+(\S+):(\d+)\s+\S+\s+LISTEN\s+(\d+)/")
            .expect("netstat pattern is valid")
    })
}

/// Extract listener pids for `port` from `netstat -tlnp` output
fn parse_netstat_pids(stdout: &str, port: u16) -> Vec<u32> {
    let unique: BTreeSet<u32> = stdout
        .lines()
        .filter_map(|line| netstat_line().captures(line.trim()))
        .filter(|caps| caps[2].parse::<u16>().ok() == Some(port))
        .filter_map(|caps| caps[3].parse::<u32>().ok())
        .collect();
    unique.into_iter().collect()
}
