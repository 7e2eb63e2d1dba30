// src/lib.rs

//! Crucible: a dependency-aware source build orchestrator
//!
//! The pipeline has three stages:
//! 1. **Resolution**: recipe files plus user requests become a concrete,
//!    cycle-free dependency DAG ([`solver`])
//! 2. **Scheduling**: the DAG is built bottom-up with bounded parallelism,
//!    reusing cached artifacts and isolating failures ([`scheduler`])
//! 3. **Execution**: each build runs its phases in a scrubbed sandbox and
//!    commits the installed image to a content-addressed store
//!    ([`executor`], [`store`])
//!
//! Resolution is fully deterministic: identical inputs always produce an
//! identical DAG and identical spec hashes.

pub mod cli;
pub mod commands;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod hash;
pub mod recipe;
pub mod scheduler;
pub mod solver;
pub mod spec;
pub mod store;
pub mod variant;
pub mod version;

pub use error::{Error, Result};
pub use recipe::{Recipe, RecipeRegistry, RecipeSource};
pub use scheduler::{BuildReport, BuildScheduler, SchedulerConfig};
pub use solver::{SolveOptions, Solver, SpecGraph};
pub use spec::{ConcreteSpec, RootRequest};
pub use store::ArtifactStore;
