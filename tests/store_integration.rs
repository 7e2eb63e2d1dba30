// tests/store_integration.rs

//! Artifact store behavior under concurrent and repeated use.

use crucible::spec::{ConcreteSpec, Toolchain};
use crucible::store::ArtifactStore;
use crucible::variant::VariantAssignment;
use crucible::version::Version;
use std::fs;
use std::sync::Arc;
use std::thread;

fn spec(name: &str, version: &str) -> ConcreteSpec {
    ConcreteSpec::new(
        name,
        Version::parse(version).unwrap(),
        VariantAssignment::empty(),
        Toolchain {
            compiler: "gcc".to_string(),
            platform: "linux-x86_64".to_string(),
        },
        vec![],
    )
}

#[test]
fn test_concurrent_identical_commits_converge() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ArtifactStore::open(dir.path()).unwrap());
    let s = Arc::new(spec("zlib", "1.3"));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        let s = Arc::clone(&s);
        handles.push(thread::spawn(move || {
            let staged = store.stage(s.hash()).unwrap();
            let file = staged.image_dir().join("usr/lib/libz.so");
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, b"identical bytes").unwrap();
            store.commit(staged, &s, "log", 1.0)
        }));
    }

    // every committer sees success and one entry exists afterwards
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert!(store.contains(s.hash()));
    assert_eq!(store.records().unwrap().len(), 1);
}

#[test]
fn test_record_json_shape_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let s = spec("pcre", "8.45");

    let staged = store.stage(s.hash()).unwrap();
    let file = staged.image_dir().join("usr/lib/libpcre.a");
    fs::create_dir_all(file.parent().unwrap()).unwrap();
    fs::write(file, b"archive contents").unwrap();
    store.commit(staged, &s, "the log", 2.25).unwrap();

    let raw = fs::read_to_string(dir.path().join(s.hash()).join("record.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(json["spec"]["name"], "pcre");
    assert_eq!(json["spec"]["version"], "8.45");
    assert_eq!(json["duration_secs"], 2.25);
    assert_eq!(json["manifest"][0]["path"], "usr/lib/libpcre.a");
    assert_eq!(json["manifest"][0]["size"], 16);
    assert!(json["built_at"].is_string());
}

#[test]
fn test_store_survives_reopen_and_lists_all_records() {
    let dir = tempfile::tempdir().unwrap();
    let specs = [spec("a", "1.0"), spec("b", "2.0"), spec("c", "3.0")];

    {
        let store = ArtifactStore::open(dir.path()).unwrap();
        for s in &specs {
            let staged = store.stage(s.hash()).unwrap();
            fs::write(staged.image_dir().join("marker"), s.name_version()).unwrap();
            store.commit(staged, s, "", 0.5).unwrap();
        }
    }

    let store = ArtifactStore::open(dir.path()).unwrap();
    let records = store.records().unwrap();
    assert_eq!(records.len(), 3);
    for s in &specs {
        assert!(store.contains(s.hash()));
        assert_eq!(store.load_record(s.hash()).unwrap().spec.hash(), s.hash());
    }
}
