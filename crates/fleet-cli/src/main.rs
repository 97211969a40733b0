//! Fleet CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use fleet_cli::cli::Cli;
use fleet_cli::commands::{self, Context};

fn main() {
    // Load .env.local if it exists (for FLEET_STATE_DIR etc.)
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean JSON.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::from_cli(&cli);
    if let Err(e) = commands::execute(cli.command, &ctx) {
        eprintln!("Error: {}", e);
        std::process::exit(fleet_cli::exit_code(e.as_ref()));
    }
}
