// tests/resolution_integration.rs

//! End-to-end resolution tests: recipe files on disk through the registry
//! and solver to a concrete graph.

mod common;

use common::{recipe_toml, registry, resolve, write_recipe};
use crucible::error::Error;
use crucible::recipe::RecipeRegistry;

#[test]
fn test_resolution_from_recipe_files() {
    let dir = tempfile::tempdir().unwrap();
    write_recipe(
        dir.path(),
        "pkgX",
        &recipe_toml("pkgX", &["2.1", "1.5"], &[("pkgY", "1.*")]),
    );
    write_recipe(
        dir.path(),
        "pkgY",
        &recipe_toml("pkgY", &["2.0", "1.2", "1.0"], &[]),
    );

    let reg = RecipeRegistry::load_dir(dir.path()).unwrap();
    let graph = resolve(&reg, &["pkgX@>=2.0"]).unwrap();

    // pkgY has 1.0, 1.2, and 2.0 available; the 1.* constraint from pkgX
    // must select 1.2, the highest satisfying version
    let chosen: Vec<String> = graph.specs().map(|s| s.name_version()).collect();
    assert!(chosen.contains(&"pkgX@2.1".to_string()), "got {:?}", chosen);
    assert!(chosen.contains(&"pkgY@1.2".to_string()), "got {:?}", chosen);
}

#[test]
fn test_resolution_is_byte_identical_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    for (name, versions, deps) in [
        ("top", vec!["3.0"], vec![("midb", "*"), ("mida", "*")]),
        ("mida", vec!["1.1", "1.0"], vec![("base", ">= 1.0")]),
        ("midb", vec!["2.2"], vec![("base", "< 3.0")]),
        ("base", vec!["2.9", "1.5"], vec![]),
    ] {
        write_recipe(dir.path(), name, &recipe_toml(name, &versions, &deps));
    }

    let mut renders = Vec::new();
    for _ in 0..3 {
        // reload from disk every time; file iteration order must not leak
        let reg = RecipeRegistry::load_dir(dir.path()).unwrap();
        let graph = resolve(&reg, &["top"]).unwrap();
        renders.push(graph.render());
    }
    assert_eq!(renders[0], renders[1]);
    assert_eq!(renders[1], renders[2]);

    // spec hashes are stable too
    let reg = RecipeRegistry::load_dir(dir.path()).unwrap();
    let g1 = resolve(&reg, &["top"]).unwrap();
    let g2 = resolve(&reg, &["top"]).unwrap();
    let h1: Vec<&str> = g1.specs().map(|s| s.hash()).collect();
    let h2: Vec<&str> = g2.specs().map(|s| s.hash()).collect();
    assert_eq!(h1, h2);
}

#[test]
fn test_every_resolved_edge_satisfies_its_range() {
    let reg = registry(&[
        ("top", &["3.0"], &[("mid", "1.*")]),
        ("mid", &["1.4", "1.0", "2.0"], &[("base", ">= 1.0, < 2.0")]),
        ("base", &["2.5", "1.9", "0.9"], &[]),
    ]);
    let graph = resolve(&reg, &["top"]).unwrap();

    let mid = graph.specs().find(|s| s.name == "mid").unwrap();
    let base = graph.specs().find(|s| s.name == "base").unwrap();
    assert_eq!(mid.version.as_str(), "1.4");
    assert_eq!(base.version.as_str(), "1.9");
}

#[test]
fn test_unsatisfiable_constraint_reports_all_requesters() {
    let reg = registry(&[
        ("a", &["1.0"], &[("lib", ">= 2.0")]),
        ("b", &["1.0"], &[("lib", "< 2.0")]),
        ("lib", &["2.5", "1.8"], &[]),
    ]);

    let err = resolve(&reg, &["a", "b"]).unwrap_err();
    match err {
        Error::UnsatisfiableConstraint { package, requesters } => {
            assert_eq!(package, "lib");
            let whos: Vec<&str> = requesters.iter().map(|(w, _)| w.as_str()).collect();
            assert!(whos.contains(&"a"), "requesters: {:?}", whos);
            assert!(whos.contains(&"b"), "requesters: {:?}", whos);
        }
        other => panic!("expected UnsatisfiableConstraint, got {:?}", other),
    }
}

#[test]
fn test_dependency_cycle_reports_path() {
    let reg = registry(&[
        ("a", &["1.0"], &[("b", "*")]),
        ("b", &["1.0"], &[("c", "*")]),
        ("c", &["1.0"], &[("a", "*")]),
    ]);

    let err = resolve(&reg, &["a"]).unwrap_err();
    match err {
        Error::CyclicDependency(path) => {
            assert!(path.len() >= 3, "path too short: {:?}", path);
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected CyclicDependency, got {:?}", other),
    }
}

#[test]
fn test_shared_dependency_unified_across_roots() {
    let reg = registry(&[
        ("a", &["1.0"], &[("base", ">= 1.0")]),
        ("b", &["1.0"], &[("base", "*")]),
        ("base", &["1.5"], &[]),
    ]);

    let graph = resolve(&reg, &["a", "b"]).unwrap();
    assert_eq!(graph.len(), 3);
    assert_eq!(graph.roots().len(), 2);
    let base = graph.specs().find(|s| s.name == "base").unwrap();
    // both roots share one base node
    assert_eq!(graph.dependents_of(base.hash()).len(), 2);
}

#[test]
fn test_variant_constraints_flow_into_spec_hash() {
    let dir = tempfile::tempdir().unwrap();
    write_recipe(
        dir.path(),
        "lib",
        r#"
        [package]
        name = "lib"
        url = "https://example.org/lib-%(version)s.tar.gz"

        [[versions]]
        version = "1.0"
        sha256 = "1111111111111111111111111111111111111111111111111111111111111111"

        [variants.ssl]
        values = ["on", "off"]
        default = "off"
    "#,
    );
    let reg = RecipeRegistry::load_dir(dir.path()).unwrap();

    let default = resolve(&reg, &["lib"]).unwrap();
    let pinned = resolve(&reg, &["lib+ssl=on"]).unwrap();

    let h_default = default.specs().next().unwrap().hash();
    let h_pinned = pinned.specs().next().unwrap().hash();
    assert_ne!(h_default, h_pinned);
    assert_eq!(pinned.specs().next().unwrap().variants.get("ssl"), Some("on"));
}
