//! 집계 싱크 -- 필터링된 로그, 시계열, 카운터, 요청 추적
//!
//! [`OutputLayout`]은 출력 설정을 한 번 컴파일한 결과이며, 병렬 작업마다
//! [`OutputLayout::new_data`]로 비어 있는 [`OutputData`]를 만듭니다.
//! 작업이 끝나면 [`OutputData::merge`]로 결과를 합칩니다. 모든 싱크의 병합은
//! 결합/교환 법칙을 만족하므로 합치는 순서는 결과에 영향을 주지 않습니다.
//!
//! 규칙은 싱크를 이름이 아닌 위치([`SinkId`])로 참조합니다.

pub mod counter;
pub mod filtered_log;
pub mod requests;
pub mod template;
pub mod timelog;

pub use counter::{CounterSink, CounterSpec};
pub use filtered_log::{FilteredLog, FilteredLogSpec};
pub use requests::{NodeRequestStats, RequestData, RequestId, RequestTracker};
pub use template::Template;
pub use timelog::{TimeLog, truncate_timestamp};

use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::info;

use logsift_core::config::{OutputsConfig, RequestsConfig, TimeLogConfig};
use logsift_core::types::format_timestamp;

use crate::error::LogPipelineError;

/// 싱크 위치 (같은 종류 싱크 목록 안의 인덱스)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(pub(crate) usize);

/// 컴파일된 출력 설정
#[derive(Debug)]
pub struct OutputLayout {
    directory: PathBuf,
    logs: Vec<Arc<FilteredLogSpec>>,
    timelogs: Vec<(String, TimeLogConfig)>,
    counters: Vec<Arc<CounterSpec>>,
    requests: Option<RequestsConfig>,
}

impl OutputLayout {
    /// 출력 설정의 템플릿을 컴파일합니다.
    pub fn compile(config: &OutputsConfig) -> Result<Self, LogPipelineError> {
        let logs = config
            .logs
            .iter()
            .map(|(name, cfg)| FilteredLogSpec::compile(name, cfg).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        let counters = config
            .counters
            .iter()
            .map(|(name, cfg)| CounterSpec::compile(name, cfg).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        let timelogs = config
            .timelogs
            .iter()
            .map(|(name, cfg)| (name.clone(), cfg.clone()))
            .collect();

        Ok(Self {
            directory: PathBuf::from(&config.directory),
            logs,
            timelogs,
            counters,
            requests: config.requests.clone(),
        })
    }

    /// 출력 기준 디렉토리
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// 이름으로 로그 싱크 위치를 찾습니다.
    pub fn log_id(&self, name: &str) -> Result<SinkId, LogPipelineError> {
        self.logs
            .iter()
            .position(|spec| spec.name == name)
            .map(SinkId)
            .ok_or_else(|| unknown("logs", name))
    }

    /// 이름으로 시계열 싱크 위치를 찾습니다.
    pub fn timelog_id(&self, name: &str) -> Result<SinkId, LogPipelineError> {
        self.timelogs
            .iter()
            .position(|(n, _)| n == name)
            .map(SinkId)
            .ok_or_else(|| unknown("timelogs", name))
    }

    /// 이름으로 카운터 싱크 위치를 찾습니다.
    pub fn counter_id(&self, name: &str) -> Result<SinkId, LogPipelineError> {
        self.counters
            .iter()
            .position(|spec| spec.name == name)
            .map(SinkId)
            .ok_or_else(|| unknown("counters", name))
    }

    /// 비어 있는 집계 상태를 생성합니다.
    pub fn new_data(&self) -> OutputData {
        OutputData {
            logs: self
                .logs
                .iter()
                .map(|spec| FilteredLog::new(Arc::clone(spec)))
                .collect(),
            timelogs: self
                .timelogs
                .iter()
                .map(|(name, cfg)| TimeLog::new(name, cfg))
                .collect(),
            counters: self
                .counters
                .iter()
                .map(|spec| CounterSink::new(Arc::clone(spec)))
                .collect(),
            requests: RequestTracker::new(),
        }
    }

    /// 최종 집계 결과를 기록합니다.
    ///
    /// 로그/시계열/요청 CSV는 출력 디렉토리에, 카운터와 요청 요약은 `console`에 씁니다.
    pub fn dump(&self, data: &OutputData, console: &mut dyn Write) -> Result<(), LogPipelineError> {
        fs::create_dir_all(&self.directory)?;

        for log in &data.logs {
            log.dump(&self.directory)?;
        }
        for timelog in &data.timelogs {
            timelog.dump(&self.directory)?;
        }
        for counter in &data.counters {
            counter.dump(console)?;
        }
        if let Some(requests) = &self.requests {
            data.requests.dump(requests, &self.directory, console)?;
        }

        info!(
            directory = %self.directory.display(),
            logs = data.logs.len(),
            timelogs = data.timelogs.len(),
            counters = data.counters.len(),
            "outputs written"
        );
        Ok(())
    }
}

fn unknown(kind: &'static str, name: &str) -> LogPipelineError {
    LogPipelineError::UnknownSink {
        kind,
        name: name.to_owned(),
    }
}

/// 병렬 작업 하나의 집계 상태
#[derive(Debug, Clone)]
pub struct OutputData {
    logs: Vec<FilteredLog>,
    timelogs: Vec<TimeLog>,
    counters: Vec<CounterSink>,
    requests: RequestTracker,
}

impl OutputData {
    /// 다른 집계 상태를 합칩니다. 두 상태는 같은 [`OutputLayout`]에서 만들어져야 합니다.
    pub fn merge(&mut self, other: OutputData) {
        for (target, part) in self.logs.iter_mut().zip(other.logs) {
            target.merge(part);
        }
        for (target, part) in self.timelogs.iter_mut().zip(other.timelogs) {
            target.merge(part);
        }
        for (target, part) in self.counters.iter_mut().zip(other.counters) {
            target.merge(part);
        }
        self.requests.merge(other.requests);
    }

    pub(crate) fn log_mut(&mut self, id: SinkId) -> Option<&mut FilteredLog> {
        self.logs.get_mut(id.0)
    }

    pub(crate) fn timelog_mut(&mut self, id: SinkId) -> Option<&mut TimeLog> {
        self.timelogs.get_mut(id.0)
    }

    pub(crate) fn counter_mut(&mut self, id: SinkId) -> Option<&mut CounterSink> {
        self.counters.get_mut(id.0)
    }

    /// 요청 추적 싱크
    pub fn requests(&self) -> &RequestTracker {
        &self.requests
    }

    pub(crate) fn requests_mut(&mut self) -> &mut RequestTracker {
        &mut self.requests
    }

    /// 이름으로 로그 싱크를 찾습니다.
    pub fn log(&self, name: &str) -> Option<&FilteredLog> {
        self.logs.iter().find(|s| s.name() == name)
    }

    /// 이름으로 시계열 싱크를 찾습니다.
    pub fn timelog(&self, name: &str) -> Option<&TimeLog> {
        self.timelogs.iter().find(|s| s.name() == name)
    }

    /// 이름으로 카운터 싱크를 찾습니다.
    pub fn counter(&self, name: &str) -> Option<&CounterSink> {
        self.counters.iter().find(|s| s.name() == name)
    }
}

/// CSV 셀용 타임스탬프. 형식에 쉼표가 들어 있어 따옴표로 감쌉니다.
pub(crate) fn csv_timestamp(ts: Option<&NaiveDateTime>) -> String {
    ts.map(|ts| format!("\"{}\"", format_timestamp(ts)))
        .unwrap_or_default()
}

/// CSV 셀용 텍스트. 쉼표, 따옴표, 줄바꿈이 있으면 따옴표로 감싸고 내부 따옴표는 두 번 씁니다.
pub(crate) fn csv_field(text: &str) -> Cow<'_, str> {
    if text.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", text.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(text)
    }
}
