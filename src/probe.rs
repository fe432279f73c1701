// Readiness probing for the ACME test server
use crate::clock::Clock;
use crate::errors::{HarnessError, Result};
use std::time::Duration;

/// Something that can tell whether a service answers yet
pub trait ReadinessProbe: Send + Sync {
    /// What is being probed, for log messages
    fn target(&self) -> &str;

    /// One check; true means the service is up
    fn check(&self) -> bool;
}

/// Treats any HTTP response from `url` as "running", whatever its status
pub struct HttpProbe {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

impl ReadinessProbe for HttpProbe {
    fn target(&self) -> &str {
        &self.url
    }

    fn check(&self) -> bool {
        match self.client.get(&self.url).send() {
            Ok(response) => {
                tracing::debug!("{} answered {}", self.url, response.status());
                true
            }
            Err(e) => {
                tracing::debug!("{} not reachable: {}", self.url, e);
                false
            }
        }
    }
}

/// How long to keep checking before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// None keeps checking forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn bounded(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }
}

/// Check, sleep, check again until the probe succeeds.
///
/// Returns the number of checks performed, so N failures followed by one
/// success yields N + 1. No sleep happens after the final check.
pub fn wait_until_ready(
    probe: &dyn ReadinessProbe,
    clock: &dyn Clock,
    policy: RetryPolicy,
) -> Result<u32> {
    let start = clock.now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if probe.check() {
            tracing::info!(
                "{} is ready after {} attempt(s) ({:.1}s)",
                probe.target(),
                attempts,
                clock.now().duration_since(start).as_secs_f64()
            );
            return Ok(attempts);
        }

        if let Some(max) = policy.max_attempts {
            if attempts >= max {
                return Err(HarnessError::ReadinessTimeout {
                    url: probe.target().to_string(),
                    attempts,
                });
            }
        }

        if attempts % 10 == 0 {
            tracing::info!("still waiting for {} ({} attempts)", probe.target(), attempts);
        }
        clock.sleep(policy.interval);
    }
}
