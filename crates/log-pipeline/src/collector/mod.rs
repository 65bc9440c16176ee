//! 입력 로그 탐색 -- 설정된 규칙으로 처리할 파일 목록을 만듭니다.
//!
//! # 탐색 규칙
//! - 각 규칙은 루트 디렉토리와 파일명 정규식을 가집니다.
//! - `recursive`가 아니면 루트 바로 아래 파일만 봅니다.
//! - 정규식의 `node` 이름 캡처 그룹이 노드 식별자가 됩니다.
//!   그룹이 없거나 매칭되지 않으면 확장자를 뗀 파일명을 씁니다.
//! - 여러 규칙에 걸리는 파일은 먼저 나온 규칙에 속합니다.
//!
//! 결과는 경로 순으로 정렬되어 실행마다 같은 순서를 가집니다.

pub mod file;

pub use file::{for_each_line, open_log};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use logsift_core::config::InputLogRule;

use crate::error::LogPipelineError;

/// 처리할 입력 파일 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 노드 식별자
    pub node: String,
    /// 이 파일을 찾은 입력 규칙의 인덱스
    pub rule: usize,
}

/// 입력 규칙에 맞는 파일을 모두 찾습니다.
///
/// 읽을 수 없는 디렉토리 항목은 경고 후 건너뜁니다.
/// 정규식이 잘못된 규칙은 설정 에러입니다.
pub fn discover(rules: &[InputLogRule]) -> Result<Vec<InputFile>, LogPipelineError> {
    let mut found: BTreeMap<PathBuf, InputFile> = BTreeMap::new();

    for (index, rule) in rules.iter().enumerate() {
        let pattern = Regex::new(&rule.pattern).map_err(|e| LogPipelineError::Config {
            field: format!("input_logs[{index}].pattern"),
            reason: e.to_string(),
        })?;

        let max_depth = if rule.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&rule.path)
            .max_depth(max_depth)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %rule.path, error = %e, "skipping unreadable input entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str() else {
                debug!(path = %entry.path().display(), "skipping non-utf8 file name");
                continue;
            };
            let Some(node) = node_name(&pattern, file_name) else {
                continue;
            };

            let path = entry.into_path();
            found.entry(path.clone()).or_insert(InputFile {
                path,
                node,
                rule: index,
            });
        }
    }

    debug!(count = found.len(), "input files discovered");
    Ok(found.into_values().collect())
}

/// 파일명이 패턴에 맞으면 노드 이름을 반환합니다.
fn node_name(pattern: &Regex, file_name: &str) -> Option<String> {
    let caps = pattern.captures(file_name)?;
    if let Some(node) = caps.name("node")
        && !node.as_str().is_empty()
    {
        return Some(node.as_str().to_owned());
    }
    Some(file_stem(file_name))
}

/// 압축 확장자까지 떼어낸 파일명 (`Node1.log.gz` -> `Node1`)
fn file_stem(file_name: &str) -> String {
    let mut stem = Path::new(file_name);
    for _ in 0..2 {
        match stem.file_stem() {
            Some(s) if s != stem.as_os_str() => stem = Path::new(s),
            _ => break,
        }
        if stem.extension().is_none() {
            break;
        }
    }
    stem.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn rule(path: &Path, pattern: &str, recursive: bool) -> InputLogRule {
        InputLogRule {
            path: path.display().to_string(),
            recursive,
            pattern: pattern.to_owned(),
            min_timestamp: None,
            max_timestamp: None,
            only_timestamped: true,
            buffer_untimestamped: false,
        }
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "").unwrap();
    }

    #[test]
    fn node_from_named_group() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Node1.log"));
        touch(&dir.path().join("Node2.log"));
        touch(&dir.path().join("notes.txt"));

        let files = discover(&[rule(dir.path(), r"^(?P<node>Node\d+)\.log$", false)]).unwrap();
        let nodes: Vec<_> = files.iter().map(|f| f.node.as_str()).collect();
        assert_eq!(nodes, vec!["Node1", "Node2"]);
        assert!(files.iter().all(|f| f.rule == 0));
    }

    #[test]
    fn node_falls_back_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Node3.log.gz"));

        let files = discover(&[rule(dir.path(), r"\.log", false)]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].node, "Node3");
    }

    #[test]
    fn recursion_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Node1.log"));
        touch(&dir.path().join("nested/Node2.log"));

        let flat = discover(&[rule(dir.path(), r"\.log$", false)]).unwrap();
        assert_eq!(flat.len(), 1);

        let deep = discover(&[rule(dir.path(), r"\.log$", true)]).unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn first_rule_wins() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Node1.log"));

        let files = discover(&[
            rule(dir.path(), r"^Node", false),
            rule(dir.path(), r"\.log$", false),
        ])
        .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rule, 0);
    }

    #[test]
    fn missing_root_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let files = discover(&[rule(&dir.path().join("absent"), r".*", false)]).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(&[rule(dir.path(), r"(", false)]).unwrap_err();
        assert!(matches!(err, LogPipelineError::Config { .. }));
    }

    #[test]
    fn stem_strips_compression_suffix() {
        assert_eq!(file_stem("Node1.log"), "Node1");
        assert_eq!(file_stem("Node1.log.gz"), "Node1");
        assert_eq!(file_stem("Node1"), "Node1");
    }
}
