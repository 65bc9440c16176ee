//! 필터링된 로그 싱크
//!
//! 메시지를 템플릿으로 렌더링하여 파일별로 모읍니다.
//! 덤프 시 파일마다 타임스탬프 순으로 정렬하여 기록합니다.
//! 렌더링된 파일명은 항상 출력 디렉토리 아래의 상대 경로로 제한됩니다.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Component, Path};
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use logsift_core::config::LogOutputConfig;
use logsift_core::types::Message;

use super::template::Template;
use crate::error::LogPipelineError;

/// 컴파일된 로그 싱크 설정
#[derive(Debug)]
pub struct FilteredLogSpec {
    /// 싱크 이름
    pub name: String,
    /// 출력 파일명 템플릿
    pub filename: Template,
    /// 라인 템플릿
    pub pattern: Template,
}

impl FilteredLogSpec {
    /// 설정에서 템플릿을 컴파일합니다.
    pub fn compile(name: &str, config: &LogOutputConfig) -> Result<Self, LogPipelineError> {
        Ok(Self {
            name: name.to_owned(),
            filename: Template::compile(&config.filename)?,
            pattern: Template::compile(&config.pattern)?,
        })
    }
}

/// 필터링된 로그 싱크
#[derive(Debug, Clone)]
pub struct FilteredLog {
    spec: Arc<FilteredLogSpec>,
    /// 파일명 -> (타임스탬프, 렌더링된 라인)
    files: BTreeMap<String, Vec<(Option<NaiveDateTime>, String)>>,
}

impl FilteredLog {
    /// 빈 싱크를 생성합니다.
    pub fn new(spec: Arc<FilteredLogSpec>) -> Self {
        Self {
            spec,
            files: BTreeMap::new(),
        }
    }

    /// 싱크 이름
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// 메시지를 렌더링하여 추가합니다.
    pub fn add(&mut self, msg: &Message) {
        let rendered = self.spec.filename.render_message(msg);
        let Some(filename) = confine(&rendered) else {
            warn!(
                sink = %self.spec.name,
                filename = %rendered,
                "empty output filename, message skipped"
            );
            return;
        };
        let line = self.spec.pattern.render_message(msg);
        self.files
            .entry(filename)
            .or_default()
            .push((msg.timestamp, line));
    }

    /// 다른 싱크의 라인을 합칩니다.
    pub fn merge(&mut self, other: FilteredLog) {
        for (filename, mut lines) in other.files {
            self.files.entry(filename).or_default().append(&mut lines);
        }
    }

    /// 파일별 라인을 정렬된 순서로 반환합니다.
    pub fn sorted_files(&self) -> BTreeMap<&str, Vec<&str>> {
        self.files
            .iter()
            .map(|(filename, lines)| {
                let mut sorted: Vec<_> = lines.iter().collect();
                sorted.sort();
                (
                    filename.as_str(),
                    sorted.into_iter().map(|(_, line)| line.as_str()).collect(),
                )
            })
            .collect()
    }

    /// 출력 디렉토리에 파일들을 기록합니다.
    pub fn dump(&self, dir: &Path) -> Result<(), LogPipelineError> {
        for (filename, lines) in self.sorted_files() {
            let path = dir.join(filename);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut writer = BufWriter::new(fs::File::create(&path)?);
            for line in &lines {
                writeln!(writer, "{line}")?;
            }
            writer.flush()?;
            debug!(
                sink = %self.spec.name,
                path = %path.display(),
                lines = lines.len(),
                "filtered log written"
            );
        }
        Ok(())
    }
}

/// 루트, `.`, `..` 구성요소를 버려 출력 디렉토리 밖을 가리키지 못하게 합니다.
fn confine(filename: &str) -> Option<String> {
    let parts: Vec<_> = Path::new(filename)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsift_core::types::parse_timestamp;

    fn sink() -> FilteredLog {
        let config = LogOutputConfig {
            filename: "{node}.log".to_owned(),
            pattern: "{timestamp} {body}".to_owned(),
        };
        FilteredLog::new(Arc::new(FilteredLogSpec::compile("all", &config).unwrap()))
    }

    fn msg(node: &str, ts: &str, body: &str) -> Message {
        Message::new(body, node).with_timestamp(parse_timestamp(ts).unwrap())
    }

    #[test]
    fn lines_are_grouped_by_filename() {
        let mut s = sink();
        s.add(&msg("Node1", "2018-01-29 10:00:00,000", "a"));
        s.add(&msg("Node2", "2018-01-29 10:00:00,000", "b"));
        let files = s.sorted_files();
        assert_eq!(files.len(), 2);
        assert_eq!(files["Node1.log"], vec!["2018-01-29 10:00:00,000 a"]);
    }

    #[test]
    fn merge_then_sort_by_timestamp() {
        let mut a = sink();
        a.add(&msg("Node1", "2018-01-29 10:00:02,000", "late"));
        let mut b = sink();
        b.add(&msg("Node1", "2018-01-29 10:00:01,000", "early"));
        a.merge(b);
        let files = a.sorted_files();
        assert_eq!(
            files["Node1.log"],
            vec!["2018-01-29 10:00:01,000 early", "2018-01-29 10:00:02,000 late"]
        );
    }

    #[test]
    fn dump_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = sink();
        s.add(&msg("Node1", "2018-01-29 10:00:00,000", "a"));
        s.dump(dir.path()).unwrap();
        let content = fs::read_to_string(dir.path().join("Node1.log")).unwrap();
        assert_eq!(content, "2018-01-29 10:00:00,000 a\n");
    }

    #[test]
    fn filenames_stay_inside_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut s = sink();
        s.add(&msg("../../escape", "2018-01-29 10:00:00,000", "a"));
        s.add(&msg("/tmp/absolute", "2018-01-29 10:00:00,000", "b"));
        s.add(&msg("..", "2018-01-29 10:00:00,000", "c"));

        let files = s.sorted_files();
        assert!(files.contains_key("escape.log"));
        assert!(files.contains_key("tmp/absolute.log"));
        assert!(files.contains_key("...log"));

        s.dump(&out).unwrap();
        assert!(out.join("escape.log").exists());
        assert!(out.join("tmp/absolute.log").exists());
        assert!(!dir.path().join("escape.log").exists());
    }

    #[test]
    fn empty_filename_is_skipped() {
        let config = LogOutputConfig {
            filename: "{node}".to_owned(),
            pattern: "{body}".to_owned(),
        };
        let mut s = FilteredLog::new(Arc::new(FilteredLogSpec::compile("all", &config).unwrap()));
        s.add(&msg("..", "2018-01-29 10:00:00,000", "a"));
        assert!(s.sorted_files().is_empty());
    }
}
