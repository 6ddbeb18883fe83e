use std::fs;
use std::path::Path;

use multiplex_core::{ConfigTree, merge};
use multiplex_loader::{ConfigSource, LoadError, NestedConfigResolver, load_file};
use serde_json::{Value, json};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn tree(value: Value) -> ConfigTree {
    ConfigTree::try_from(value).unwrap()
}

// ---------------------------------------------------------------------------
// Path sources
// ---------------------------------------------------------------------------

#[test]
fn test_path_source_probes_yaml_before_json() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "config.yaml", "lr: 0.1\n");
    write(dir.path(), "config.json", r#"{"lr": 0.9}"#);

    let loaded = ConfigSource::path(dir.path().join("config")).load().unwrap();
    assert_eq!(loaded.tree.get("lr").unwrap(), &json!(0.1));
    assert_eq!(loaded.origin.unwrap(), dir.path().join("config.yaml"));
}

#[test]
fn test_path_source_falls_back_to_json() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "config.json", r#"{"epochs": 14}"#);

    // The given extension does not restrict probing.
    let loaded = ConfigSource::path(dir.path().join("config.yaml")).load().unwrap();
    assert_eq!(loaded.tree.get("epochs").unwrap(), &json!(14));
    assert_eq!(loaded.base_dir(), dir.path());
}

#[test]
fn test_path_source_accepts_yml_as_given() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "server.yml", "port: 8080\n");

    let loaded = ConfigSource::path(dir.path().join("server.yml")).load().unwrap();
    assert_eq!(loaded.tree.get("port").unwrap(), &json!(8080));
}

#[test]
fn test_path_source_not_found() {
    let dir = TempDir::new().unwrap();
    let err = ConfigSource::path(dir.path().join("missing")).load().unwrap_err();
    assert!(matches!(err, LoadError::NotFound(_)));
}

#[test]
fn test_non_mapping_root_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "list.json", "[1, 2, 3]");
    let err = load_file(&dir.path().join("list.json")).unwrap_err();
    assert!(matches!(err, LoadError::InvalidRoot(_)));
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "config.toml", "a = 1\n");
    let err = load_file(&dir.path().join("config.toml")).unwrap_err();
    assert!(matches!(err, LoadError::UnsupportedFormat(_)));
}

#[test]
fn test_key_order_follows_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "ordered.yaml", "zeta: 1\nalpha: 2\nmid:\n  y: 3\n  x: 4\n");
    let loaded = load_file(&dir.path().join("ordered.yaml")).unwrap();
    assert_eq!(loaded.keys(), vec!["zeta", "alpha", "mid.y", "mid.x"]);
}

// ---------------------------------------------------------------------------
// Nested resolution
// ---------------------------------------------------------------------------

#[test]
fn test_sibling_file_is_merged_under_value() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "database.yaml", "host: localhost\nport: 5432\n");

    let resolver = NestedConfigResolver::new(dir.path());
    let residual = tree(json!({"database": {"port": 5433}}));
    let resolved = resolver.resolve(&residual).unwrap();

    let file = load_file(&dir.path().join("database.yaml")).unwrap();
    let expected = merge(&file, &residual.subtree("database").unwrap());
    assert_eq!(resolved.subtree("database").unwrap(), expected);
    assert_eq!(resolved.get("database.host").unwrap(), &json!("localhost"));
    assert_eq!(resolved.get("database.port").unwrap(), &json!(5433));
}

#[test]
fn test_json_sibling_is_found() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "cache.json", r#"{"size": 64, "policy": "lru"}"#);

    let resolver = NestedConfigResolver::new(dir.path());
    let resolved = resolver.resolve(&tree(json!({"cache": {"size": 128}}))).unwrap();
    assert_eq!(resolved.get("cache.size").unwrap(), &json!(128));
    assert_eq!(resolved.get("cache.policy").unwrap(), &json!("lru"));
}

#[test]
fn test_directory_descent_restores_working_dir() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "models/resnet.yaml", "depth: 50\nwidth: 64\n");

    let resolver = NestedConfigResolver::new(dir.path());
    let residual = tree(json!({"models": {"resnet": {"depth": 101}}}));
    let resolved = resolver.resolve(&residual).unwrap();

    assert_eq!(resolved.get("models.resnet.depth").unwrap(), &json!(101));
    assert_eq!(resolved.get("models.resnet.width").unwrap(), &json!(64));
    assert_eq!(resolver.working_dir(), dir.path());
}

#[test]
fn test_working_dir_restored_after_failure_inside_directory() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "models/resnet.yaml", "depth: 50\n");

    let resolver = NestedConfigResolver::new(dir.path());
    let residual = tree(json!({"models": {"vgg": {"depth": 16}}}));
    let err = resolver.resolve(&residual).unwrap_err();

    match err {
        LoadError::AmbiguousResolution { key, dir: searched } => {
            assert_eq!(key, "vgg");
            assert_eq!(searched, dir.path().join("models"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(resolver.working_dir(), dir.path());
}

#[test]
fn test_file_wins_over_directory() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "optim.yaml", "lr: 0.1\n");
    write(dir.path(), "optim/adam.yaml", "beta: 0.9\n");

    let resolver = NestedConfigResolver::new(dir.path());
    let resolved = resolver.resolve(&tree(json!({"optim": {"lr": 0.2}}))).unwrap();
    assert_eq!(resolved.into_value(), json!({"optim": {"lr": 0.2}}));
}

#[test]
fn test_scalar_value_for_directory_is_ambiguous() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("models")).unwrap();

    let resolver = NestedConfigResolver::new(dir.path());
    let err = resolver.resolve(&tree(json!({"models": "resnet"}))).unwrap_err();
    assert!(matches!(err, LoadError::AmbiguousResolution { .. }));
}

#[test]
fn test_malformed_sibling_file_propagates() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "broken.yaml", "key: [unclosed\n");

    let resolver = NestedConfigResolver::new(dir.path());
    let err = resolver.resolve(&tree(json!({"broken": {"a": 1}}))).unwrap_err();
    assert!(matches!(err, LoadError::Yaml(_)));
}
