// src/commands.rs

//! Subcommand implementations
//!
//! Human-readable progress goes to stderr via tracing; machine-readable
//! results (the build report, the resolved graph) go to stdout.

use crate::cli::{BuildArgs, ResolveArgs};
use crate::executor::BuildExecutor;
use crate::fetch::{HttpFetcher, SourceCache};
use crate::recipe::RecipeRegistry;
use crate::scheduler::{BuildScheduler, SchedulerConfig};
use crate::solver::{SolveOptions, Solver};
use crate::spec::RootRequest;
use crate::store::ArtifactStore;
use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

pub fn build(args: &BuildArgs) -> anyhow::Result<()> {
    let roots = parse_roots(&args.specs)?;
    let registry = RecipeRegistry::load_dir(&args.recipes)
        .with_context(|| format!("loading recipes from {}", args.recipes.display()))?;

    let solver = Solver::new(&registry, SolveOptions::default());
    let (graph, resolve_failures) = solver.resolve_independent(&roots);
    for (root, err) in &resolve_failures {
        error!("cannot resolve {}: {}", root, err);
    }

    let sources = SourceCache::new(&args.sources, Box::new(HttpFetcher::new()?))?;
    let executor = Arc::new(BuildExecutor::new(sources).with_patch_dir(&args.recipes));
    let store = Arc::new(ArtifactStore::open(&args.store)?);

    let config = SchedulerConfig {
        workers: args.jobs.max(1),
        build_jobs: args.build_jobs.max(1),
        timeout: match args.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        },
        keep_going: !args.stop_on_failure,
    };

    let report = BuildScheduler::new(executor, store, config).run(&graph, &registry)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.success() || !resolve_failures.is_empty() {
        bail!(
            "{} failed, {} skipped, {} unresolvable",
            report.failed.len(),
            report.skipped.len(),
            resolve_failures.len()
        );
    }
    Ok(())
}

pub fn resolve(args: &ResolveArgs) -> anyhow::Result<()> {
    let roots = parse_roots(&args.specs)?;
    let registry = RecipeRegistry::load_dir(&args.recipes)
        .with_context(|| format!("loading recipes from {}", args.recipes.display()))?;

    let graph = Solver::new(&registry, SolveOptions::default()).resolve(&roots)?;

    if args.json {
        let specs: Vec<&crate::spec::ConcreteSpec> =
            graph.specs().map(|s| s.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&specs)?);
    } else {
        print!("{}", graph.render());
    }
    Ok(())
}

fn parse_roots(specs: &[String]) -> anyhow::Result<Vec<RootRequest>> {
    specs
        .iter()
        .map(|s| RootRequest::parse(s).with_context(|| format!("invalid package request '{}'", s)))
        .collect()
}
