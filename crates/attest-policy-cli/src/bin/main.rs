//! attest-policy CLI
//!
//! # Exit Codes
//!
//! - 0: every policy held
//! - 1: a policy failed or the interpreter failed
//! - 2: invalid input, policy or schema
//! - 3: internal error

use attest_policy_cli::{run_cli, Cli};
use clap::Parser;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(verbose: u8, log_path: Option<&Path>) -> anyhow::Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let console = fmt::layer()
        .with_target(verbose > 1)
        .with_writer(std::io::stderr);
    let file = match log_path {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(verbose > 1)
                .with_writer(Mutex::new(File::create(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    if let Some(path) = log_path {
        tracing::info!("Logs of the policy engine are stored in {}", path.display());
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.log_path.as_deref()) {
        eprintln!("Error: cannot set up logging: {:#}", e);
        std::process::exit(attest_policy_cli::ExitCode::InvalidInput.into());
    }

    let exit_code = run_cli(cli);
    std::process::exit(exit_code.into());
}
