//! Integration tests for pzem-common library.

use pzem_common::{Error, LogFormat, LoggingConfig, init_tracing, load_config};
use serde::Deserialize;
use std::io::Write;

#[derive(Debug, Deserialize)]
struct SampleConfig {
    name: String,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    writeln!(
        file,
        r#"{{
            name: "meter-01",
            logging: {{ level: "trace", format: "json" }},
        }}"#
    )
    .unwrap();

    let config: SampleConfig = load_config(file.path()).expect("load config");

    assert_eq!(config.name, "meter-01");
    assert_eq!(config.logging.level, "trace");
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_load_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json5");

    let err = load_config::<SampleConfig>(&path).unwrap_err();

    match err {
        Error::Config(msg) => assert!(msg.contains("missing.json5")),
        other => panic!("Expected config error, got {other:?}"),
    }
}

#[test]
fn test_init_tracing_only_once() {
    let config = LoggingConfig::default();

    assert!(init_tracing(&config).is_ok());
    assert!(matches!(init_tracing(&config), Err(Error::Logging(_))));
}
