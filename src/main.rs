// src/main.rs

use clap::Parser;
use crucible::cli::{Cli, Command};
use crucible::commands;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Build(args) => commands::build(args),
        Command::Resolve(args) => commands::resolve(args),
    }
}
