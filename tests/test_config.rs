use std::path::PathBuf;

use stackplan::{StackerConfig, StackerError};

fn write_temp(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("stackplan-{}.yaml", uuid::Uuid::new_v4()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_demo_config() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("example/stacks.yaml");
    let config = StackerConfig::load_yaml_file(&path).unwrap();

    assert_eq!(config.namespace, "demo");
    assert_eq!(config.execution.max_parallel(), 2);
    let names: Vec<&str> = config.stacks.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["vpc", "bastion", "db", "cache"]);
    assert!(!config.stack("cache").unwrap().enabled);
}

#[test]
fn test_load_rejects_bad_execution_settings() {
    let path = write_temp(
        "namespace: dev\nexecution:\n  poll_interval_ms: 0\nstacks:\n  - name: vpc\n",
    );
    let err = StackerConfig::load_yaml_file(&path).unwrap_err();
    std::fs::remove_file(&path).ok();

    match err {
        StackerError::Configuration { field, .. } => {
            assert_eq!(field.as_deref(), Some("execution.poll_interval_ms"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let err = StackerConfig::load_yaml_file("/nonexistent/stacks.yaml").unwrap_err();
    assert_eq!(err.category(), "io");
}

#[test]
fn test_malformed_yaml_is_serialization_error() {
    let err = StackerConfig::from_yaml_str("namespace: [unclosed").unwrap_err();
    assert_eq!(err.category(), "serialization");
}
