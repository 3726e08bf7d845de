//! Loading manifests from disk

use panelo_config::{AppKind, ConfigError, parser};
use std::io::Write;

#[test]
fn test_parse_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"version: "1.0"
domain: "${{PANELO_FILE_TEST_DOMAIN:-files.example.com}}"
components:
  backup: false
  runtimes: [wordpress]
"#
    )
    .unwrap();

    let config = parser::parse_file(file.path()).unwrap();
    assert_eq!(config.domain.as_deref(), Some("files.example.com"));
    assert!(!config.components.backup);
    assert_eq!(config.components.runtimes, vec![AppKind::Wordpress]);
}

#[test]
fn test_load_explicit_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");
    let err = parser::load(Some(&missing)).unwrap_err();
    assert!(matches!(err, ConfigError::ReadError(_)));
}

#[test]
fn test_duplicate_runtime_rejected() {
    let yaml = "version: \"1.0\"\ncomponents:\n  runtimes: [php, php]\n";
    let err = parser::parse_str(yaml).unwrap_err();
    assert!(err.to_string().contains("listed twice"));
}

#[test]
fn test_malformed_yaml_is_yaml_error() {
    let err = parser::parse_str("version: [unterminated").unwrap_err();
    assert!(matches!(err, ConfigError::YamlError(_)));
}
