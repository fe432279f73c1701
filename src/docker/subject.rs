use super::ImageRef;
use crate::config::HarnessConfig;
use crate::errors::Result;
use crate::exec::{CommandRunner, CommandSpec};

/// `docker run` for the subject image on the host network.
///
/// The image reads SERVER, DOMAIN, EMAIL, DEBUG and STAGING from its
/// environment; DOMAIN and EMAIL are mandatory for it.
pub fn subject_command(image: &ImageRef, config: &HarnessConfig) -> CommandSpec {
    let mut env = vec![
        format!("SERVER={}", config.subject_server()),
        format!("DOMAIN={}", config.subject.domain),
        format!("EMAIL={}", config.subject.email),
    ];
    if config.subject.debug {
        env.push("DEBUG=1".to_string());
    }
    if config.subject.staging {
        env.push("STAGING=1".to_string());
    }

    let mut cmd = CommandSpec::new("docker").args(["run", "--rm", "--net=host"]);
    for var in env {
        cmd = cmd.arg("-e").arg(var);
    }
    cmd.arg(image.as_str())
}

/// Run the subject to completion; returns its exit code (None if signalled)
pub fn run_subject(
    runner: &dyn CommandRunner,
    image: &ImageRef,
    config: &HarnessConfig,
) -> Result<Option<i32>> {
    let cmd = subject_command(image, config);
    tracing::info!("running {}", cmd.display());
    let code = runner.status(&cmd)?;
    match code {
        Some(0) => tracing::info!("subject exited successfully"),
        Some(code) => tracing::warn!("subject exited with code {}", code),
        None => tracing::warn!("subject was terminated by a signal"),
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::RecordingRunner;

    #[test]
    fn test_default_subject_command() {
        let cmd = subject_command(&ImageRef::new("subject:test"), &HarnessConfig::default());
        assert_eq!(
            cmd.display(),
            "docker run --rm --net=host \
             -e SERVER=http://localhost:4000/directory \
             -e DOMAIN=harness.le.wtf -e EMAIL=harness@le.wtf -e DEBUG=1 subject:test"
        );
    }

    #[test]
    fn test_staging_without_debug() {
        let mut config = HarnessConfig::default();
        config.subject.debug = false;
        config.subject.staging = true;
        config.subject.server = Some("https://acme.example/directory".into());

        let cmd = subject_command(&ImageRef::new("subject:test"), &config);
        assert!(cmd.args.contains(&"STAGING=1".to_string()));
        assert!(!cmd.args.iter().any(|a| a.starts_with("DEBUG=")));
        assert!(cmd
            .args
            .contains(&"SERVER=https://acme.example/directory".to_string()));
    }

    #[test]
    fn test_exit_code_is_returned() {
        let runner = RecordingRunner::new().reply("docker run", 17, "");
        let code = run_subject(&runner, &ImageRef::new("subject:test"), &HarnessConfig::default())
            .unwrap();
        assert_eq!(code, Some(17));
    }
}
