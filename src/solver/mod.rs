// src/solver/mod.rs

//! Constraint solver: root requests → concrete dependency DAG
//!
//! Resolution is deliberately deterministic: the same recipe set and root
//! requests always produce an identical DAG. All intermediate collections
//! are ordered (`BTreeMap`/`BTreeSet`), candidate versions are tried
//! highest-first, and variant assignments are canonically sorted.
//!
//! The dependency declarations of a recipe apply to every version of that
//! recipe, so the reachable package set and the constraint sets are fixed
//! by the recipe graph alone; selection then picks, per package, the
//! highest version satisfying the intersection of all imposed ranges, and
//! variant values from requester constraints with recipe defaults filling
//! the gaps.

pub mod graph;

pub use graph::{SpecEdge, SpecGraph};

use crate::error::{Error, Result};
use crate::recipe::{RecipeSource, Recipe};
use crate::spec::{ConcreteSpec, DepRef, RootRequest, Toolchain};
use crate::variant::{VariantAssignment, VariantConstraint};
use crate::version::{Version, VersionRange};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// Requester name used for user-supplied root constraints
const ROOT_REQUESTER: &str = "<root>";

/// Options applied uniformly to every spec in a resolution
#[derive(Debug, Clone, Default)]
pub struct SolveOptions {
    pub toolchain: Toolchain,
}

/// Accumulated constraints on one package
#[derive(Debug, Default)]
struct Constraints {
    /// (requester, range) pairs from every edge pointing at this package
    version_reqs: Vec<(String, VersionRange)>,
    /// (requester, constraint) pairs for variant demands
    variant_reqs: Vec<(String, VariantConstraint)>,
}

/// What got chosen for one package before specs are materialized
#[derive(Debug)]
struct Selection {
    version: Version,
    variants: VariantAssignment,
}

/// The constraint solver
pub struct Solver<'a> {
    source: &'a dyn RecipeSource,
    options: SolveOptions,
}

impl<'a> Solver<'a> {
    pub fn new(source: &'a dyn RecipeSource, options: SolveOptions) -> Self {
        Self { source, options }
    }

    /// Resolve all roots into one consistent DAG, or fail with the first
    /// unsatisfiable constraint set or cycle
    pub fn resolve(&self, roots: &[RootRequest]) -> Result<SpecGraph> {
        if roots.is_empty() {
            return Ok(SpecGraph::new());
        }

        let (closure, constraints) = self.collect_constraints(roots)?;
        self.check_cycles(&closure)?;

        let selections = self.select(&constraints, &closure)?;
        let graph = self.materialize(roots, &closure, &selections)?;

        info!(
            "resolved {} roots to {} concrete specs",
            roots.len(),
            graph.len()
        );
        Ok(graph)
    }

    /// Resolve each root as independently as possible: first try a single
    /// consistent resolution of everything; if that fails, fall back to
    /// per-root resolution so unrelated roots still succeed. Returns the
    /// merged DAG plus the errors for roots that could not resolve.
    pub fn resolve_independent(
        &self,
        roots: &[RootRequest],
    ) -> (SpecGraph, Vec<(RootRequest, Error)>) {
        match self.resolve(roots) {
            Ok(graph) => (graph, Vec::new()),
            Err(_) if roots.len() > 1 => {
                let mut merged = SpecGraph::new();
                let mut failures = Vec::new();
                for root in roots {
                    match self.resolve(std::slice::from_ref(root)) {
                        Ok(graph) => merged.merge(graph),
                        Err(e) => failures.push((root.clone(), e)),
                    }
                }
                (merged, failures)
            }
            Err(e) => (SpecGraph::new(), vec![(roots[0].clone(), e)]),
        }
    }

    /// Walk the recipe graph from the roots, collecting the reachable
    /// package closure (with loaded recipes) and per-package constraints
    fn collect_constraints(
        &self,
        roots: &[RootRequest],
    ) -> Result<(BTreeMap<String, Arc<Recipe>>, BTreeMap<String, Constraints>)> {
        let mut constraints: BTreeMap<String, Constraints> = BTreeMap::new();
        let mut closure: BTreeMap<String, Arc<Recipe>> = BTreeMap::new();
        let mut worklist: VecDeque<(String, Arc<Recipe>)> = VecDeque::new();

        for root in roots {
            let entry = constraints.entry(root.name.clone()).or_default();
            entry
                .version_reqs
                .push((ROOT_REQUESTER.to_string(), root.range.clone()));
            for vc in &root.variants {
                entry
                    .variant_reqs
                    .push((ROOT_REQUESTER.to_string(), vc.clone()));
            }
            if !closure.contains_key(&root.name) {
                let recipe = self.source.load_recipe(&root.name)?;
                closure.insert(root.name.clone(), recipe.clone());
                worklist.push_back((root.name.clone(), recipe));
            }
        }

        while let Some((pkg, recipe)) = worklist.pop_front() {
            for dep in &recipe.dependencies {
                let entry = constraints.entry(dep.name.clone()).or_default();
                entry.version_reqs.push((pkg.clone(), dep.range.clone()));
                for vc in &dep.variants {
                    entry.variant_reqs.push((pkg.clone(), vc.clone()));
                }
                if !closure.contains_key(&dep.name) {
                    let dep_recipe = self.source.load_recipe(&dep.name)?;
                    closure.insert(dep.name.clone(), dep_recipe.clone());
                    worklist.push_back((dep.name.clone(), dep_recipe));
                }
            }
        }

        debug!("closure covers {} packages", closure.len());
        Ok((closure, constraints))
    }

    /// Reject any package that directly or transitively depends on itself
    fn check_cycles(&self, closure: &BTreeMap<String, Arc<Recipe>>) -> Result<()> {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut in_stack: BTreeSet<&str> = BTreeSet::new();
        let mut path: Vec<&str> = Vec::new();

        for start in closure.keys() {
            if !visited.contains(start.as_str()) {
                self.cycle_dfs(start, closure, &mut visited, &mut in_stack, &mut path)?;
            }
        }
        Ok(())
    }

    fn cycle_dfs<'c>(
        &self,
        node: &'c str,
        closure: &'c BTreeMap<String, Arc<Recipe>>,
        visited: &mut BTreeSet<&'c str>,
        in_stack: &mut BTreeSet<&'c str>,
        path: &mut Vec<&'c str>,
    ) -> Result<()> {
        visited.insert(node);
        in_stack.insert(node);
        path.push(node);

        if let Some(recipe) = closure.get(node) {
            for dep in &recipe.dependencies {
                let target = dep.name.as_str();
                if in_stack.contains(target) {
                    let start = path.iter().position(|p| *p == target).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(target.to_string());
                    return Err(Error::CyclicDependency(cycle));
                }
                if !visited.contains(target) {
                    if let Some((key, _)) = closure.get_key_value(target) {
                        self.cycle_dfs(key, closure, visited, in_stack, path)?;
                    }
                }
            }
        }

        path.pop();
        in_stack.remove(node);
        Ok(())
    }

    /// Pick a version and variant assignment for every package in the
    /// closure, failing fast on unsatisfiable intersections
    fn select(
        &self,
        constraints: &BTreeMap<String, Constraints>,
        closure: &BTreeMap<String, Arc<Recipe>>,
    ) -> Result<BTreeMap<String, Selection>> {
        let mut selections = BTreeMap::new();

        for (pkg, recipe) in closure {
            let empty = Constraints::default();
            let cons = constraints.get(pkg).unwrap_or(&empty);

            let version = self.pick_version(pkg, cons)?;
            let variants = self.pick_variants(pkg, recipe, cons)?;

            debug!("selected {}@{}{}", pkg, version, variants);
            selections.insert(pkg.clone(), Selection { version, variants });
        }

        Ok(selections)
    }

    /// Highest available version satisfying every requester's range
    fn pick_version(&self, pkg: &str, cons: &Constraints) -> Result<Version> {
        let candidates = self.source.list_versions(pkg)?;
        if candidates.is_empty() {
            return Err(Error::NotFound(format!(
                "package '{}' has no available versions",
                pkg
            )));
        }

        for (version, _) in &candidates {
            if cons
                .version_reqs
                .iter()
                .all(|(_, range)| range.satisfies(version))
            {
                return Ok(version.clone());
            }
        }

        Err(Error::UnsatisfiableConstraint {
            package: pkg.to_string(),
            requesters: cons
                .version_reqs
                .iter()
                .map(|(who, range)| (who.clone(), range.to_string()))
                .collect(),
        })
    }

    /// Variant values: requester constraints must agree and be allowed;
    /// unconstrained variants take the recipe default
    fn pick_variants(
        &self,
        pkg: &str,
        recipe: &Recipe,
        cons: &Constraints,
    ) -> Result<VariantAssignment> {
        let mut assignment = VariantAssignment::empty();
        for (name, def) in &recipe.variants {
            assignment.set(name.clone(), def.default.clone());
        }

        // first requester to pin each variant, for conflict reporting
        let mut pinned_by: BTreeMap<&str, &str> = BTreeMap::new();

        for (who, vc) in &cons.variant_reqs {
            let def = recipe.variants.get(&vc.name).ok_or_else(|| {
                Error::UnsatisfiableConstraint {
                    package: pkg.to_string(),
                    requesters: vec![(who.clone(), format!("+{} (undeclared variant)", vc))],
                }
            })?;

            if !def.allows(&vc.value) {
                return Err(Error::UnsatisfiableConstraint {
                    package: pkg.to_string(),
                    requesters: vec![(who.clone(), format!("+{} (value not allowed)", vc))],
                });
            }

            if let Some(prev_who) = pinned_by.get(vc.name.as_str()) {
                let prev_value = assignment.get(&vc.name).unwrap_or_default();
                if prev_value != vc.value {
                    return Err(Error::UnsatisfiableConstraint {
                        package: pkg.to_string(),
                        requesters: vec![
                            (prev_who.to_string(), format!("+{}={}", vc.name, prev_value)),
                            (who.clone(), format!("+{}", vc)),
                        ],
                    });
                }
            } else {
                pinned_by.insert(&vc.name, who);
                assignment.set(vc.name.clone(), vc.value.clone());
            }
        }

        Ok(assignment)
    }

    /// Build concrete specs bottom-up in dependency order and assemble the
    /// final DAG
    fn materialize(
        &self,
        roots: &[RootRequest],
        closure: &BTreeMap<String, Arc<Recipe>>,
        selections: &BTreeMap<String, Selection>,
    ) -> Result<SpecGraph> {
        let order = self.name_topo_order(closure)?;

        let mut spec_by_name: BTreeMap<String, Arc<ConcreteSpec>> = BTreeMap::new();
        let mut graph = SpecGraph::new();

        for pkg in &order {
            let (recipe, selection) = match (closure.get(pkg), selections.get(pkg)) {
                (Some(r), Some(s)) => (r, s),
                _ => return Err(Error::NotFound(format!("package '{}' lost during solve", pkg))),
            };

            let dep_refs: Vec<DepRef> = recipe
                .dependencies
                .iter()
                .map(|dep| {
                    let dep_spec = spec_by_name.get(&dep.name).ok_or_else(|| {
                        Error::NotFound(format!(
                            "dependency '{}' resolved out of order",
                            dep.name
                        ))
                    })?;
                    Ok(DepRef {
                        name: dep.name.clone(),
                        hash: dep_spec.hash().to_string(),
                        kind: dep.kind,
                    })
                })
                .collect::<Result<_>>()?;

            let spec = Arc::new(ConcreteSpec::new(
                pkg.clone(),
                selection.version.clone(),
                selection.variants.clone(),
                self.options.toolchain.clone(),
                dep_refs,
            ));

            graph.add_node(spec.clone());
            for dep in &spec.dependencies {
                graph.add_edge(spec.hash(), &dep.hash, dep.kind);
            }
            spec_by_name.insert(pkg.clone(), spec);
        }

        for root in roots {
            if let Some(spec) = spec_by_name.get(&root.name) {
                graph.add_root(spec.hash());
            }
        }

        Ok(graph)
    }

    /// Kahn's algorithm over package names, deterministic via ordered sets
    fn name_topo_order(&self, closure: &BTreeMap<String, Arc<Recipe>>) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = closure
            .iter()
            .map(|(name, recipe)| (name.as_str(), recipe.dependencies.len()))
            .collect();

        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, recipe) in closure {
            for dep in &recipe.dependencies {
                dependents
                    .entry(dep.name.as_str())
                    .or_default()
                    .push(name.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(closure.len());
        while let Some(&name) = ready.iter().next() {
            ready.remove(name);
            order.push(name.to_string());

            if let Some(deps) = dependents.get(name) {
                for dependent in deps {
                    if let Some(deg) = in_degree.get_mut(dependent) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.insert(dependent);
                        }
                    }
                }
            }
        }

        if order.len() != closure.len() {
            // check_cycles reports the actual path first; this is a backstop
            let remaining: Vec<String> = closure
                .keys()
                .filter(|k| !order.contains(k))
                .cloned()
                .collect();
            return Err(Error::CyclicDependency(remaining));
        }

        Ok(order)
    }
}
