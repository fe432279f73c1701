// Command-line surface
use crate::config::HarnessConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "acme-harness")]
#[command(
    about = "Run the subject image against a local boulder ACME server",
    long_about = None
)]
#[command(version, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub run: RunArgs,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve HTTP redirects from one port to another (used by the harness)
    Redirect {
        /// Port to listen on
        #[arg(long, default_value_t = 5002)]
        port: u16,
        /// Port every request is redirected to
        #[arg(long, default_value_t = 80)]
        target_port: u16,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Boulder checkout (falls back to $BOULDER_PATH)
    pub boulder_dir: Option<PathBuf>,

    /// Config file (default: ./.acme-harness.yml if present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Image tag to build and run
    #[arg(long, value_name = "TAG")]
    pub image: Option<String>,

    /// Use an existing image instead of building one
    #[arg(long)]
    pub skip_build: bool,

    /// Domain the subject requests a certificate for
    #[arg(long)]
    pub domain: Option<String>,

    /// Account email handed to the subject
    #[arg(long)]
    pub email: Option<String>,

    /// Ask the subject to use the staging environment
    #[arg(long)]
    pub staging: bool,

    /// Give up waiting for boulder after N checks
    #[arg(long, value_name = "N", conflicts_with = "wait_forever")]
    pub max_attempts: Option<u32>,

    /// Wait for boulder without any limit
    #[arg(long)]
    pub wait_forever: bool,

    /// Leave a boulder started by this run running afterwards
    #[arg(long)]
    pub keep_boulder: bool,
}

impl RunArgs {
    /// Command-line flags take precedence over file and environment
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(dir) = &self.boulder_dir {
            config.boulder.dir = Some(dir.clone());
        }
        if let Some(image) = &self.image {
            config.image.tag = image.clone();
        }
        if self.skip_build {
            config.image.build = false;
        }
        if let Some(domain) = &self.domain {
            config.subject.domain = domain.clone();
        }
        if let Some(email) = &self.email {
            config.subject.email = email.clone();
        }
        if self.staging {
            config.subject.staging = true;
        }
        if let Some(max) = self.max_attempts {
            config.readiness.max_attempts = Some(max);
        }
        if self.wait_forever {
            config.readiness.max_attempts = None;
        }
        if self.keep_boulder {
            config.boulder.keep_running = true;
        }
    }
}
