use crate::errors::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File picked up from the working directory when no --config is given
pub const DEFAULT_CONFIG_FILE: &str = ".acme-harness.yml";

/// Environment fallback for the boulder project directory
pub const BOULDER_PATH_ENV: &str = "BOULDER_PATH";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Ports freed before the run starts
    pub reap_ports: Vec<u16>,
    pub image: ImageConfig,
    pub boulder: BoulderConfig,
    pub readiness: ReadinessConfig,
    pub redirect: RedirectConfig,
    pub subject: SubjectConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            reap_ports: vec![443, 5002],
            image: ImageConfig::default(),
            boulder: BoulderConfig::default(),
            readiness: ReadinessConfig::default(),
            redirect: RedirectConfig::default(),
            subject: SubjectConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ImageConfig {
    pub tag: String,
    /// Build context handed to `docker build`
    pub context: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<PathBuf>,
    /// When false the tag must already exist locally
    pub build: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            tag: "acme-harness/subject:latest".to_string(),
            context: PathBuf::from("."),
            dockerfile: None,
            build: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BoulderConfig {
    /// Checkout of the boulder project; only needed when it is not running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    pub directory_url: String,
    /// Address boulder resolves every name to (the docker bridge gateway)
    pub fake_dns: String,
    /// Compose service started with --service-ports
    pub service: String,
    /// Leave a boulder started by this run up after cleanup
    pub keep_running: bool,
}

impl Default for BoulderConfig {
    fn default() -> Self {
        Self {
            dir: None,
            directory_url: "http://localhost:4000/directory".to_string(),
            fake_dns: "172.17.0.1".to_string(),
            service: "boulder".to_string(),
            keep_running: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Delay between checks, e.g. "1s", "500ms"
    pub interval: String,
    /// None polls until boulder answers
    pub max_attempts: Option<u32>,
    /// Per-check HTTP timeout
    pub request_timeout: String,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval: "1s".to_string(),
            max_attempts: Some(300),
            request_timeout: "5s".to_string(),
        }
    }
}

impl ReadinessConfig {
    pub fn interval(&self) -> Result<Duration> {
        parse_duration(&self.interval)
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration(&self.request_timeout)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RedirectConfig {
    pub port: u16,
    /// Port the helper redirects to (where the subject answers challenges)
    pub target_port: u16,
    /// External helper argv; the built-in helper is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            port: 5002,
            target_port: 80,
            command: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SubjectConfig {
    pub domain: String,
    pub email: String,
    /// ACME directory handed to the subject; defaults to boulder's
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub debug: bool,
    pub staging: bool,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            domain: "harness.le.wtf".to_string(),
            email: "harness@le.wtf".to_string(),
            server: None,
            debug: true,
            staging: false,
        }
    }
}

impl HarnessConfig {
    /// Load config from an explicit file, or from `.acme-harness.yml` in `cwd`.
    ///
    /// A missing default file yields the built-in defaults; a missing explicit
    /// file is an error.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(HarnessError::ConfigError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => {
                let default_path = cwd.join(DEFAULT_CONFIG_FILE);
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let content = fs::read_to_string(&path)?;
        let config: HarnessConfig = serde_yml::from_str(&content).map_err(|e| {
            HarnessError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Fill unset values from the environment
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.boulder.dir.is_none() {
            self.boulder.dir = lookup(BOULDER_PATH_ENV)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from);
        }
    }

    /// ACME directory URL the subject is pointed at
    pub fn subject_server(&self) -> &str {
        self.subject
            .server
            .as_deref()
            .unwrap_or(&self.boulder.directory_url)
    }

    /// Reject settings the run would only trip over later
    pub fn validate(&self) -> Result<()> {
        if self.subject.domain.trim().is_empty() {
            return Err(HarnessError::ConfigError(
                "subject.domain must not be empty".to_string(),
            ));
        }

        if !self.subject.email.contains('@') {
            return Err(HarnessError::ConfigError(format!(
                "subject.email '{}' is not an email address",
                self.subject.email
            )));
        }

        if self.image.tag.trim().is_empty() {
            return Err(HarnessError::ConfigError(
                "image.tag must not be empty".to_string(),
            ));
        }

        if self.readiness.interval()?.is_zero() {
            return Err(HarnessError::ConfigError(
                "readiness.interval must be greater than zero".to_string(),
            ));
        }
        self.readiness.request_timeout()?;

        if self.readiness.max_attempts == Some(0) {
            return Err(HarnessError::ConfigError(
                "readiness.max_attempts must be at least 1 (omit it to wait forever)".to_string(),
            ));
        }

        for (field, url) in [
            ("boulder.directory_url", self.boulder.directory_url.as_str()),
            ("subject.server", self.subject_server()),
        ] {
            let parsed = reqwest::Url::parse(url).map_err(|e| {
                HarnessError::ConfigError(format!("{} '{}' is invalid: {}", field, url, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(HarnessError::ConfigError(format!(
                    "{} must be an http(s) URL, got '{}'",
                    field, url
                )));
            }
        }

        if self.redirect.port == self.redirect.target_port {
            return Err(HarnessError::ConfigError(format!(
                "redirect.port and redirect.target_port are both {}",
                self.redirect.port
            )));
        }

        if let Some(command) = &self.redirect.command {
            if command.is_empty() {
                return Err(HarnessError::ConfigError(
                    "redirect.command must name a program".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Parse a duration string such as "500ms", "30s" or "1m".
/// A bare number is taken as seconds.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    let invalid = || HarnessError::ConfigError(format!("Invalid duration value: {}", value));

    if let Some(num) = value.strip_suffix("ms") {
        num.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(num) = value.strip_suffix('s') {
        num.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(num) = value.strip_suffix('m') {
        let minutes = num.trim().parse::<u64>().map_err(|_| invalid())?;
        let secs = minutes.checked_mul(60).ok_or_else(invalid)?;
        Ok(Duration::from_secs(secs))
    } else {
        value.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}
