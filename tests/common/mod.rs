// tests/common/mod.rs

//! Shared fixtures and helpers for integration tests.

use crucible::error::{Error, Result};
use crucible::executor::{BuildOutput, BuildTask, Executor, Phase};
use crucible::recipe::RecipeRegistry;
use crucible::solver::{SolveOptions, Solver, SpecGraph};
use crucible::spec::RootRequest;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Write a recipe TOML file into a recipes directory.
pub fn write_recipe(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(format!("{}.toml", name)), body).unwrap();
}

/// Render a minimal recipe with the given versions (highest first or not,
/// order does not matter) and `(name, range)` dependencies.
pub fn recipe_toml(name: &str, versions: &[&str], deps: &[(&str, &str)]) -> String {
    let mut out = format!(
        "[package]\nname = \"{}\"\nurl = \"https://example.org/{}-%(version)s.tar.gz\"\n",
        name, name
    );
    for (i, v) in versions.iter().enumerate() {
        // distinct but stable fake checksums
        let fill = char::from_digit((i as u32 + 1) % 10, 10).unwrap();
        out.push_str(&format!(
            "\n[[versions]]\nversion = \"{}\"\nsha256 = \"{}\"\n",
            v,
            fill.to_string().repeat(64)
        ));
    }
    for (dep, range) in deps {
        out.push_str(&format!(
            "\n[[dependencies]]\nname = \"{}\"\nrange = \"{}\"\n",
            dep, range
        ));
    }
    out
}

/// Build a registry from in-memory recipe definitions.
pub fn registry(recipes: &[(&str, &[&str], &[(&str, &str)])]) -> RecipeRegistry {
    let mut reg = RecipeRegistry::new();
    for (name, versions, deps) in recipes {
        let toml_str = recipe_toml(name, versions, deps);
        reg.insert(toml::from_str(&toml_str).unwrap()).unwrap();
    }
    reg
}

/// Resolve root request strings against a registry.
pub fn resolve(reg: &RecipeRegistry, requests: &[&str]) -> Result<SpecGraph> {
    let roots: Vec<RootRequest> = requests
        .iter()
        .map(|r| RootRequest::parse(r).unwrap())
        .collect();
    Solver::new(reg, SolveOptions::default()).resolve(&roots)
}

/// Executor that fakes builds by writing a marker file, while tracking the
/// number of concurrently running builds and total invocations. Packages in
/// the deny list fail their build phase.
pub struct TrackingExecutor {
    fail: Vec<String>,
    delay: Duration,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub builds: AtomicUsize,
}

impl TrackingExecutor {
    pub fn new() -> Self {
        Self::failing(&[])
    }

    pub fn failing(fail: &[&str]) -> Self {
        Self {
            fail: fail.iter().map(|s| s.to_string()).collect(),
            delay: Duration::from_millis(20),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            builds: AtomicUsize::new(0),
        }
    }
}

impl Executor for TrackingExecutor {
    fn build(&self, task: &BuildTask) -> Result<BuildOutput> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.builds.fetch_add(1, Ordering::SeqCst);

        // hold the slot long enough for overlap to be observable
        std::thread::sleep(self.delay);
        let result = if self.fail.contains(&task.spec.name) {
            Err(Error::PhaseFailure {
                phase: Phase::Build,
                exit_code: Some(1),
                output: format!("scripted failure in {}", task.spec.name),
            })
        } else {
            let marker = task.image_dir.join("usr/share").join(&task.spec.name);
            fs::create_dir_all(marker.parent().unwrap())?;
            fs::write(marker, task.spec.name_version())?;
            Ok(BuildOutput {
                log: format!("built {}\n", task.spec.name_version()),
            })
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
