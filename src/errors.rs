use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("where is boulder? pass its directory as an argument or set BOULDER_PATH")]
    BoulderNotFound,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Docker error: {0}")]
    DockerError(String),

    #[error("{url} did not become ready after {attempts} attempts")]
    ReadinessTimeout { url: String, attempts: u32 },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// True when a program could not be started because it is not installed
    pub fn is_missing_program(&self) -> bool {
        matches!(
            self,
            HarnessError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
