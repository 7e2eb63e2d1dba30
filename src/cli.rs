// src/cli.rs

//! Command-line interface definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "crucible", version, about = "Dependency-aware source build orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve and build packages into the artifact store
    Build(BuildArgs),
    /// Resolve packages and print the concrete dependency graph
    Resolve(ResolveArgs),
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Package requests, e.g. `zlib` or `pkgX@>=2.0+ssl=on`
    #[arg(required = true)]
    pub specs: Vec<String>,

    /// Directory containing recipe TOML files
    #[arg(long, default_value = "recipes")]
    pub recipes: PathBuf,

    /// Artifact store root
    #[arg(long, default_value = "store")]
    pub store: PathBuf,

    /// Source download cache
    #[arg(long, default_value = "sources")]
    pub sources: PathBuf,

    /// Number of concurrent builds
    #[arg(short, long, default_value_t = 4)]
    pub jobs: usize,

    /// Parallelism passed to each package's build tools
    #[arg(long, default_value_t = 4)]
    pub build_jobs: u32,

    /// Wall-clock limit per build phase, in seconds (0 disables)
    #[arg(long, default_value_t = 3600)]
    pub timeout_secs: u64,

    /// Abort the session on the first failure instead of building
    /// unaffected packages
    #[arg(long)]
    pub stop_on_failure: bool,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Package requests, e.g. `zlib` or `pkgX@>=2.0+ssl=on`
    #[arg(required = true)]
    pub specs: Vec<String>,

    /// Directory containing recipe TOML files
    #[arg(long, default_value = "recipes")]
    pub recipes: PathBuf,

    /// Emit the resolved graph as JSON instead of text
    #[arg(long)]
    pub json: bool,
}
