// src/solver/graph.rs

//! The resolved dependency DAG
//!
//! Nodes are concrete specs keyed by identity hash; edges run from
//! dependent to dependency and carry the dependency kind. The graph is
//! immutable once resolution finishes and is shared read-only by the
//! scheduler and all build tasks.

use crate::error::{Error, Result};
use crate::recipe::DepKind;
use crate::spec::ConcreteSpec;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;

/// A directed edge: `from` depends on `to` (both spec hashes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecEdge {
    pub from: String,
    pub to: String,
    pub kind: DepKind,
}

/// Resolved, cycle-free graph of concrete specs
#[derive(Debug, Default)]
pub struct SpecGraph {
    /// Spec hash → spec
    nodes: BTreeMap<String, Arc<ConcreteSpec>>,
    /// Spec hash → outgoing edges (its dependencies)
    edges: BTreeMap<String, Vec<SpecEdge>>,
    /// Spec hash → hashes of specs that depend on it
    reverse: BTreeMap<String, Vec<String>>,
    /// Hashes of the specs the user asked for
    roots: Vec<String>,
}

impl SpecGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, spec: Arc<ConcreteSpec>) {
        let hash = spec.hash().to_string();
        self.edges.entry(hash.clone()).or_default();
        self.reverse.entry(hash.clone()).or_default();
        self.nodes.insert(hash, spec);
    }

    pub fn add_edge(&mut self, from: &str, to: &str, kind: DepKind) {
        let edge = SpecEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        };
        self.edges.entry(from.to_string()).or_default().push(edge);
        self.reverse
            .entry(to.to_string())
            .or_default()
            .push(from.to_string());
    }

    pub fn add_root(&mut self, hash: &str) {
        if !self.roots.iter().any(|r| r == hash) {
            self.roots.push(hash.to_string());
        }
    }

    /// Merge another graph into this one (nodes are identity-hashed, so
    /// shared specs unify)
    pub fn merge(&mut self, other: SpecGraph) {
        for (_, spec) in other.nodes {
            self.add_node(spec);
        }
        for (from, edges) in other.edges {
            for edge in edges {
                let existing = self.edges.entry(from.clone()).or_default();
                if !existing.contains(&edge) {
                    self.reverse
                        .entry(edge.to.clone())
                        .or_default()
                        .push(edge.from.clone());
                    existing.push(edge);
                }
            }
        }
        for root in other.roots {
            self.add_root(&root);
        }
    }

    pub fn node(&self, hash: &str) -> Option<&Arc<ConcreteSpec>> {
        self.nodes.get(hash)
    }

    /// All specs in hash order
    pub fn specs(&self) -> impl Iterator<Item = &Arc<ConcreteSpec>> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Outgoing edges of a spec (its direct dependencies)
    pub fn dependencies_of(&self, hash: &str) -> &[SpecEdge] {
        self.edges.get(hash).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Hashes of specs that directly depend on `hash`
    pub fn dependents_of(&self, hash: &str) -> &[String] {
        self.reverse.get(hash).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// All specs that transitively depend on `hash`
    pub fn transitive_dependents(&self, hash: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = self
            .dependents_of(hash)
            .iter()
            .map(|s| s.as_str())
            .collect();

        while let Some(h) = queue.pop_front() {
            if seen.insert(h.to_string()) {
                for dep in self.dependents_of(h) {
                    if !seen.contains(dep) {
                        queue.push_back(dep);
                    }
                }
            }
        }
        seen
    }

    /// Topological sort via Kahn's algorithm, dependencies before
    /// dependents. Ready nodes are taken in (name, version, hash) order so
    /// the result is deterministic.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .keys()
            .map(|h| (h.as_str(), self.dependencies_of(h).len()))
            .collect();

        let mut ready: BTreeSet<(String, &str)> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(h, _)| (self.sort_key(h), *h))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some((key, hash)) = ready.iter().next().cloned() {
            ready.remove(&(key, hash));
            result.push(hash.to_string());

            for dependent in self.dependents_of(hash) {
                if let Some(deg) = in_degree.get_mut(dependent.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert((self.sort_key(dependent), dependent.as_str()));
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            let remaining: Vec<String> = self
                .nodes
                .keys()
                .filter(|h| !result.contains(h))
                .map(|h| self.sort_key(h))
                .collect();
            return Err(Error::CyclicDependency(remaining));
        }

        Ok(result)
    }

    fn sort_key(&self, hash: &str) -> String {
        match self.nodes.get(hash) {
            Some(spec) => format!("{}@{}:{}", spec.name, spec.version, hash),
            None => hash.to_string(),
        }
    }

    /// Deterministic textual rendering of the whole DAG, used for
    /// reproducibility checks and `resolve` output
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (hash, spec) in &self.nodes {
            let root_marker = if self.roots.contains(hash) { "*" } else { " " };
            let _ = writeln!(out, "{} {} [{}]", root_marker, spec, &hash[..12]);
            for edge in self.dependencies_of(hash) {
                let target = self
                    .nodes
                    .get(&edge.to)
                    .map(|s| s.name_version())
                    .unwrap_or_else(|| edge.to.clone());
                let _ = writeln!(out, "      -> {} ({})", target, edge.kind.as_str());
            }
        }
        out
    }
}
