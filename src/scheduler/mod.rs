// src/scheduler/mod.rs

//! Parallel build scheduling over the resolved DAG
//!
//! The scheduler owns all task state on one thread and farms builds out to
//! a fixed pool of workers over channels; workers never see the graph, only
//! self-contained build jobs. A spec becomes ready when every dependency
//! edge is satisfied, ready specs are dispatched in (name, version, hash)
//! order, and specs already present in the store complete without running
//! the executor at all. A failed build fails its transitive dependents and
//! nothing else; independent subgraphs keep building.

use crate::error::{Error, Result};
use crate::executor::{BuildTask, Executor};
use crate::recipe::{DepKind, Recipe, RecipeSource};
use crate::solver::SpecGraph;
use crate::spec::ConcreteSpec;
use crate::store::ArtifactStore;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum concurrently running builds
    pub workers: usize,
    /// Parallelism handed to each build's tools (`%(jobs)s`)
    pub build_jobs: u32,
    /// Per-phase wall-clock limit
    pub timeout: Option<Duration>,
    /// Keep building unaffected specs after a failure
    pub keep_going: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            build_jobs: 4,
            timeout: Some(Duration::from_secs(3600)),
            keep_going: true,
        }
    }
}

/// Per-spec outcome in the final report
#[derive(Debug, Clone, Serialize)]
pub struct SpecSummary {
    pub name: String,
    pub version: String,
    pub hash: String,
    pub cached: bool,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub name: String,
    pub version: String,
    pub hash: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedSummary {
    pub name: String,
    pub version: String,
    pub hash: String,
    /// The failed spec this one was blocked by
    pub blocked_by: String,
}

/// Everything that happened in one scheduling session
#[derive(Debug, Clone, Serialize, Default)]
pub struct BuildReport {
    pub built: Vec<SpecSummary>,
    pub failed: Vec<FailureSummary>,
    pub skipped: Vec<SkippedSummary>,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    fn sort(&mut self) {
        self.built.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        self.failed.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        self.skipped.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeState {
    Pending,
    Running,
    Succeeded { cached: bool, duration_secs: f64 },
    Failed(String),
    Skipped { blocked_by: String },
}

/// A self-contained unit of work handed to a worker
struct Job {
    hash: String,
    spec: Arc<ConcreteSpec>,
    recipe: Arc<Recipe>,
    dep_images: Vec<PathBuf>,
    build_jobs: u32,
    timeout: Option<Duration>,
}

struct JobResult {
    hash: String,
    outcome: Result<()>,
    duration_secs: f64,
}

/// The build scheduler
pub struct BuildScheduler {
    executor: Arc<dyn Executor>,
    store: Arc<ArtifactStore>,
    config: SchedulerConfig,
}

impl BuildScheduler {
    pub fn new(
        executor: Arc<dyn Executor>,
        store: Arc<ArtifactStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            executor,
            store,
            config,
        }
    }

    /// Build every spec in the graph, dependencies first.
    ///
    /// Per-spec failures land in the report; only session-fatal errors
    /// (store integrity violations) abort with `Err`.
    pub fn run(&self, graph: &SpecGraph, recipes: &dyn RecipeSource) -> Result<BuildReport> {
        if graph.is_empty() {
            return Ok(BuildReport::default());
        }
        // validates acyclicity up front
        graph.topological_sort()?;

        let mut states: BTreeMap<String, NodeState> = graph
            .specs()
            .map(|s| (s.hash().to_string(), NodeState::Pending))
            .collect();
        let mut remaining: BTreeMap<String, usize> = graph
            .specs()
            .map(|s| {
                (
                    s.hash().to_string(),
                    graph.dependencies_of(s.hash()).len(),
                )
            })
            .collect();

        let mut ready: BTreeSet<(String, String)> = remaining
            .iter()
            .filter(|(_, deps)| **deps == 0)
            .map(|(h, _)| (sort_key(graph, h), h.clone()))
            .collect();

        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (result_tx, result_rx) = mpsc::channel::<JobResult>();
        let workers = self.spawn_workers(job_rx, result_tx);
        // a zero-worker pool would spawn one thread but dispatch nothing
        let pool_size = self.config.workers.max(1);

        let mut running = 0usize;
        let mut halt = false;
        let mut session_error: Option<Error> = None;

        loop {
            // dispatch as much as the pool allows
            while !halt && running < pool_size {
                let Some(next) = ready.iter().next().cloned() else {
                    break;
                };
                ready.remove(&next);
                let (_, hash) = next;

                if self.store.contains(&hash) {
                    debug!("cache hit, skipping build of {}", hash);
                    states.insert(
                        hash.clone(),
                        NodeState::Succeeded {
                            cached: true,
                            duration_secs: 0.0,
                        },
                    );
                    release_dependents(graph, &hash, &states, &mut remaining, &mut ready);
                    continue;
                }

                match self.make_job(graph, recipes, &hash) {
                    Ok(job) => {
                        states.insert(hash.clone(), NodeState::Running);
                        running += 1;
                        if job_tx.send(job).is_err() {
                            // worker pool died; treated as session-fatal below
                            session_error =
                                Some(Error::IoError("worker pool terminated".to_string()));
                            halt = true;
                            running -= 1;
                        }
                    }
                    Err(e) => {
                        self.fail_node(graph, &hash, e.to_string(), &mut states);
                        if !self.config.keep_going {
                            halt = true;
                        }
                    }
                }
            }

            if running == 0 {
                break;
            }

            let result = match result_rx.recv() {
                Ok(r) => r,
                Err(_) => {
                    session_error =
                        Some(Error::IoError("worker pool terminated".to_string()));
                    break;
                }
            };
            running -= 1;

            match result.outcome {
                Ok(()) => {
                    states.insert(
                        result.hash.clone(),
                        NodeState::Succeeded {
                            cached: false,
                            duration_secs: result.duration_secs,
                        },
                    );
                    release_dependents(graph, &result.hash, &states, &mut remaining, &mut ready);
                }
                Err(e) if e.is_session_fatal() => {
                    error!("fatal store error: {}", e);
                    session_error = Some(e);
                    halt = true;
                }
                Err(e) => {
                    self.fail_node(graph, &result.hash, e.to_string(), &mut states);
                    if !self.config.keep_going {
                        halt = true;
                    }
                }
            }
        }

        drop(job_tx);
        for worker in workers {
            let _ = worker.join();
        }

        if let Some(e) = session_error {
            return Err(e);
        }

        let report = self.assemble_report(graph, states);
        info!(
            "build session: {} built, {} failed, {} skipped",
            report.built.len(),
            report.failed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn spawn_workers(
        &self,
        job_rx: mpsc::Receiver<Job>,
        result_tx: mpsc::Sender<JobResult>,
    ) -> Vec<thread::JoinHandle<()>> {
        let job_rx = Arc::new(Mutex::new(job_rx));
        (0..self.config.workers.max(1))
            .map(|_| {
                let job_rx = Arc::clone(&job_rx);
                let result_tx = result_tx.clone();
                let executor = Arc::clone(&self.executor);
                let store = Arc::clone(&self.store);
                thread::spawn(move || loop {
                    let job = {
                        let guard = match job_rx.lock() {
                            Ok(g) => g,
                            Err(_) => return,
                        };
                        match guard.recv() {
                            Ok(job) => job,
                            Err(_) => return,
                        }
                    };
                    let result = run_job(&*executor, &store, job);
                    if result_tx.send(result).is_err() {
                        return;
                    }
                })
            })
            .collect()
    }

    fn make_job(
        &self,
        graph: &SpecGraph,
        recipes: &dyn RecipeSource,
        hash: &str,
    ) -> Result<Job> {
        let spec = graph
            .node(hash)
            .ok_or_else(|| Error::NotFound(format!("spec {} not in graph", hash)))?
            .clone();
        let recipe = recipes.load_recipe(&spec.name)?;

        // run-only dependencies gate scheduling but stay out of the build env
        let dep_images = graph
            .dependencies_of(hash)
            .iter()
            .filter(|e| matches!(e.kind, DepKind::Build | DepKind::BuildAndRun))
            .map(|e| self.store.image_dir(&e.to))
            .collect();

        Ok(Job {
            hash: hash.to_string(),
            spec,
            recipe,
            dep_images,
            build_jobs: self.config.build_jobs,
            timeout: self.config.timeout,
        })
    }

    /// Mark a node failed and skip everything that can no longer build
    fn fail_node(
        &self,
        graph: &SpecGraph,
        hash: &str,
        message: String,
        states: &mut BTreeMap<String, NodeState>,
    ) {
        let blocked_by = graph
            .node(hash)
            .map(|s| s.name_version())
            .unwrap_or_else(|| hash.to_string());
        warn!("build of {} failed: {}", blocked_by, message);
        states.insert(hash.to_string(), NodeState::Failed(message));

        for dependent in graph.transitive_dependents(hash) {
            let state = states
                .get(&dependent)
                .cloned()
                .unwrap_or(NodeState::Pending);
            if state == NodeState::Pending {
                states.insert(
                    dependent,
                    NodeState::Skipped {
                        blocked_by: blocked_by.clone(),
                    },
                );
            }
        }
    }

    fn assemble_report(
        &self,
        graph: &SpecGraph,
        states: BTreeMap<String, NodeState>,
    ) -> BuildReport {
        let mut report = BuildReport::default();
        for (hash, state) in states {
            let Some(spec) = graph.node(&hash) else {
                continue;
            };
            match state {
                NodeState::Succeeded {
                    cached,
                    duration_secs,
                } => report.built.push(SpecSummary {
                    name: spec.name.clone(),
                    version: spec.version.to_string(),
                    hash,
                    cached,
                    duration_secs,
                }),
                NodeState::Failed(error) => report.failed.push(FailureSummary {
                    name: spec.name.clone(),
                    version: spec.version.to_string(),
                    hash,
                    error,
                }),
                NodeState::Skipped { blocked_by } => report.skipped.push(SkippedSummary {
                    name: spec.name.clone(),
                    version: spec.version.to_string(),
                    hash,
                    blocked_by,
                }),
                // pending or running nodes only remain after a halt; count
                // them as skipped so the report accounts for every spec
                NodeState::Pending | NodeState::Running => report.skipped.push(SkippedSummary {
                    name: spec.name.clone(),
                    version: spec.version.to_string(),
                    hash,
                    blocked_by: "session halted".to_string(),
                }),
            }
        }
        report.sort();
        report
    }
}

/// One worker iteration: stage, build, commit
fn run_job(executor: &dyn Executor, store: &ArtifactStore, job: Job) -> JobResult {
    let start = Instant::now();
    let outcome = (|| {
        let staged = store.stage(&job.hash)?;
        let task = BuildTask {
            spec: job.spec.clone(),
            recipe: job.recipe.clone(),
            dep_images: job.dep_images.clone(),
            image_dir: staged.image_dir(),
            jobs: job.build_jobs,
            timeout: job.timeout,
        };
        let output = executor.build(&task)?;
        store.commit(
            staged,
            &job.spec,
            &output.log,
            start.elapsed().as_secs_f64(),
        )?;
        Ok(())
    })();
    JobResult {
        hash: job.hash,
        outcome,
        duration_secs: start.elapsed().as_secs_f64(),
    }
}

fn sort_key(graph: &SpecGraph, hash: &str) -> String {
    match graph.node(hash) {
        Some(spec) => format!("{}@{}:{}", spec.name, spec.version, hash),
        None => hash.to_string(),
    }
}

fn release_dependents(
    graph: &SpecGraph,
    hash: &str,
    states: &BTreeMap<String, NodeState>,
    remaining: &mut BTreeMap<String, usize>,
    ready: &mut BTreeSet<(String, String)>,
) {
    for dependent in graph.dependents_of(hash) {
        if let Some(deps) = remaining.get_mut(dependent) {
            *deps = deps.saturating_sub(1);
            if *deps == 0 && states.get(dependent) == Some(&NodeState::Pending) {
                ready.insert((sort_key(graph, dependent), dependent.clone()));
            }
        }
    }
}
