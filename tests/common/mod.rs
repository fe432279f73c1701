/// Common test utilities for acme-harness integration tests
use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tempfile::TempDir;

/// A scratch working directory for running the harness binary
pub struct TestWorkspace {
    pub temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        TestWorkspace { temp_dir }
    }

    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `.acme-harness.yml` into the workspace
    #[allow(dead_code)]
    pub fn create_config(&self, content: &str) {
        std::fs::write(self.temp_dir.path().join(".acme-harness.yml"), content)
            .expect("Failed to write config file");
    }

    /// Config that never touches docker or host ports and points boulder at
    /// a port nothing listens on
    #[allow(dead_code)]
    pub fn create_offline_config(&self) -> u16 {
        let dead_port = free_port();
        self.create_config(&format!(
            r#"
reap_ports: []
image:
  tag: subject:test
  build: false
boulder:
  directory_url: http://127.0.0.1:{}/directory
readiness:
  interval: 10ms
  max_attempts: 2
  request_timeout: 1s
"#,
            dead_port
        ));
        dead_port
    }

    /// Run the harness binary in this workspace without BOULDER_PATH set
    pub fn harness(&self, args: &[&str]) -> CommandResult {
        let output = Command::new(env!("CARGO_BIN_EXE_acme-harness"))
            .args(args)
            .current_dir(self.temp_dir.path())
            .env_remove("BOULDER_PATH")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute acme-harness");

        CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code(),
        }
    }
}

/// Start the binary in the background
#[allow(dead_code)]
pub fn spawn_harness(args: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_acme-harness"))
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn acme-harness")
}

/// A port that was free a moment ago
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind ephemeral port")
        .local_addr()
        .expect("Failed to read local address")
        .port()
}

/// Result of running a command
#[allow(dead_code)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: Option<i32>,
}

impl CommandResult {
    #[allow(dead_code)]
    pub fn assert_success(&self) -> &Self {
        assert!(
            self.success,
            "Command failed:\nstdout: {}\nstderr: {}",
            self.stdout, self.stderr
        );
        self
    }

    #[allow(dead_code)]
    pub fn assert_exit_code(&self, code: i32) -> &Self {
        assert_eq!(
            self.exit_code,
            Some(code),
            "Unexpected exit code:\nstdout: {}\nstderr: {}",
            self.stdout,
            self.stderr
        );
        self
    }
}
