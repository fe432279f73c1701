// Redirect helper.
//
// Boulder validates HTTP-01 challenges against port 5002, while the subject
// answers them on port 80. The helper sits on the validation port and
// answers every request with a `302 Found` to the same host and path on the
// target port.
//
// The launcher half frees the helper's port and starts it as a tracked
// background job; the server half is what `acme-harness redirect` runs.

use crate::config::RedirectConfig;
use crate::errors::Result;
use crate::exec::{CommandRunner, CommandSpec};
use crate::jobs::JobSet;
use crate::ports::{PortReaper, ReapOutcome};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

/// Argv for the helper: the configured command, or `<exe> redirect ...`
pub fn helper_command(config: &RedirectConfig, exe: &Path) -> CommandSpec {
    if let Some(argv) = config.command.as_ref().filter(|argv| !argv.is_empty()) {
        return CommandSpec::new(argv[0].clone()).args(argv[1..].iter().cloned());
    }

    CommandSpec::new(exe.to_string_lossy().to_string()).args([
        "redirect".to_string(),
        "--port".to_string(),
        config.port.to_string(),
        "--target-port".to_string(),
        config.target_port.to_string(),
    ])
}

pub struct RedirectLauncher<'a> {
    config: &'a RedirectConfig,
    runner: Arc<dyn CommandRunner>,
}

impl<'a> RedirectLauncher<'a> {
    pub fn new(config: &'a RedirectConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Free the helper port, then start the helper in the background
    pub fn launch(&self, helper: &CommandSpec, jobs: &mut JobSet) -> Result<ReapOutcome> {
        let reaped = PortReaper::new(self.runner.clone()).reap(self.config.port);

        let job = self.runner.spawn(helper, "redirect helper")?;
        jobs.track(job);
        tracing::info!(
            "redirecting port {} to port {}",
            self.config.port,
            self.config.target_port
        );
        Ok(reaped)
    }
}

#[derive(Debug, Clone, Copy)]
struct RedirectState {
    target_port: u16,
}

/// Router answering every method and path with a redirect to `target_port`
pub fn router(target_port: u16) -> Router {
    Router::new()
        .fallback(redirect)
        .with_state(RedirectState { target_port })
}

async fn redirect(
    State(state): State<RedirectState>,
    headers: HeaderMap,
    uri: Uri,
) -> impl IntoResponse {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok());
    let location = redirect_location(host, &uri, state.target_port);
    tracing::debug!("{} -> {}", uri, location);
    (StatusCode::FOUND, [(header::LOCATION, location)])
}

/// Same host (port stripped) and path+query, on `target_port`
pub fn redirect_location(host: Option<&str>, uri: &Uri, target_port: u16) -> String {
    let host = host
        .map(strip_port)
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    if target_port == 80 {
        format!("http://{}{}", host, path)
    } else {
        format!("http://{}:{}{}", host, target_port, path)
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal: keep the brackets, drop anything after them
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Serve redirects on `port` until SIGINT or SIGTERM
pub async fn serve(port: u16, target_port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("redirect helper listening on {} -> port {}", addr, target_port);

    axum::serve(listener, router(target_port))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("redirect helper error: {}", e))?;

    tracing::info!("redirect helper stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
