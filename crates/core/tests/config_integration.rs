//! 설정 로딩 통합 테스트 -- 실제 파일에서 기본/사용자 문서를 병합합니다.

use std::fs;

use logsift_core::config::LogsiftConfig;
use logsift_core::error::{ConfigError, LogsiftError};
use tempfile::TempDir;

const BASE: &str = r#"
general:
  log_level: info
  workers: 2
input_logs:
  - path: logs
    pattern: '(?P<node>Node\d+)\.log'
chains:
  main:
    - log line: all
outputs:
  logs:
    all:
      filename: "{node}.log"
      pattern: "{timestamp} | {body}"
"#;

#[tokio::test]
async fn load_base_document() {
    let dir = TempDir::new().expect("should create temp dir");
    let base = dir.path().join("logsift.yml");
    fs::write(&base, BASE).expect("should write base config");

    let config = LogsiftConfig::load(&base, None)
        .await
        .expect("valid config should load");
    assert_eq!(config.general.workers, 2);
    assert_eq!(config.chains["main"].len(), 1);
    assert!(config.outputs.logs.contains_key("all"));
}

#[tokio::test]
async fn user_document_overrides_base() {
    let dir = TempDir::new().expect("should create temp dir");
    let base = dir.path().join("base.yml");
    let user = dir.path().join("user.yml");
    fs::write(&base, BASE).expect("should write base config");
    fs::write(
        &user,
        r#"
general:
  log_level: debug
cache:
  dir: /tmp/logsift-test-cache
chains:
  main:
    - match any or drop:
        level: ERROR
    - log line: all
"#,
    )
    .expect("should write user config");

    let config = LogsiftConfig::load(&base, Some(user.as_path()))
        .await
        .expect("merged config should load");
    assert_eq!(config.general.log_level, "debug");
    // 사용자 문서에 없는 키는 기본 문서 값 유지
    assert_eq!(config.general.workers, 2);
    assert_eq!(config.cache.dir, "/tmp/logsift-test-cache");
    assert_eq!(config.chains["main"].len(), 2);
}

#[tokio::test]
async fn malformed_yaml_fails() {
    let dir = TempDir::new().expect("should create temp dir");
    let base = dir.path().join("bad.yml");
    fs::write(&base, "general: [unclosed").expect("should write bad config");

    let result = LogsiftConfig::load(&base, None).await;
    assert!(matches!(
        result,
        Err(LogsiftError::Config(ConfigError::ParseFailed { .. }))
    ));
}

#[tokio::test]
async fn missing_user_document_fails() {
    let dir = TempDir::new().expect("should create temp dir");
    let base = dir.path().join("base.yml");
    fs::write(&base, BASE).expect("should write base config");
    let missing = dir.path().join("missing.yml");

    let result = LogsiftConfig::load(&base, Some(missing.as_path())).await;
    assert!(matches!(
        result,
        Err(LogsiftError::Config(ConfigError::FileNotFound { .. }))
    ));
}

#[tokio::test]
async fn invalid_values_fail_validation() {
    let dir = TempDir::new().expect("should create temp dir");
    let base = dir.path().join("logsift.yml");
    fs::write(
        &base,
        r#"
general:
  log_format: xml
input_logs:
  - pattern: x
"#,
    )
    .expect("should write config");

    let result = LogsiftConfig::load(&base, None).await;
    assert!(matches!(
        result,
        Err(LogsiftError::Config(ConfigError::InvalidValue { .. }))
    ));
}
