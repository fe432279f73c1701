use acme_harness::cli::{Cli, Commands, RunArgs};
use acme_harness::config::HarnessConfig;
use acme_harness::harness::Harness;
use acme_harness::{logging, redirect};
use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Some(Commands::Redirect { port, target_port }) => run_redirect(port, target_port),
        None => run_harness(&cli.run),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::from(1)
        }
    }
}

fn run_harness(args: &RunArgs) -> anyhow::Result<ExitCode> {
    let cwd = std::env::current_dir()?;
    let mut config = HarnessConfig::load(args.config.as_deref(), &cwd)?;
    config.apply_env(|key| std::env::var(key).ok());
    args.apply(&mut config);

    let harness = Harness::new(config)?;
    let report = harness.run()?;

    let code = report.exit_code();
    if report.succeeded() {
        println!("{} harness run passed", "✓".green().bold());
    } else {
        println!("{} harness run failed (exit code {})", "✗".red().bold(), code);
    }
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}

fn run_redirect(port: u16, target_port: u16) -> anyhow::Result<ExitCode> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(redirect::serve(port, target_port))?;
    Ok(ExitCode::SUCCESS)
}
