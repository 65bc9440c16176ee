//! 시계열 싱크
//!
//! 메시지 타임스탬프를 고정 폭 버킷으로 내림하여 (노드, 그래프) 쌍별로
//! 횟수를 셉니다. 결과는 `timestamp,<node>.<graph>,...` 헤더의 CSV입니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use tracing::debug;

use logsift_core::config::TimeLogConfig;
use logsift_core::types::Message;

use super::{csv_field, csv_timestamp};
use crate::error::LogPipelineError;

/// 타임스탬프를 버킷 경계로 내림합니다.
///
/// 버킷은 자정부터의 초 단위로 계산되며 밀리초는 버려집니다.
pub fn truncate_timestamp(ts: NaiveDateTime, interval_secs: u64) -> NaiveDateTime {
    let secs = u64::from(ts.time().num_seconds_from_midnight());
    let interval = interval_secs.max(1);
    let bucket = (secs - secs % interval) as u32;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(bucket, 0).unwrap_or(NaiveTime::MIN);
    ts.date().and_time(time)
}

/// 시계열 싱크
#[derive(Debug, Clone)]
pub struct TimeLog {
    name: String,
    filename: String,
    interval: u64,
    /// 버킷 시작 -> (노드, 그래프) -> 횟수
    buckets: BTreeMap<NaiveDateTime, BTreeMap<(String, String), u64>>,
}

impl TimeLog {
    /// 빈 싱크를 생성합니다.
    pub fn new(name: &str, config: &TimeLogConfig) -> Self {
        Self {
            name: name.to_owned(),
            filename: config.filename.clone(),
            interval: config.interval,
            buckets: BTreeMap::new(),
        }
    }

    /// 싱크 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 메시지를 해당 버킷의 그래프에 셉니다. 타임스탬프 없는 메시지는 무시합니다.
    pub fn add(&mut self, msg: &Message, graph: &str) {
        let Some(ts) = msg.timestamp else {
            return;
        };
        let bucket = truncate_timestamp(ts, self.interval);
        *self
            .buckets
            .entry(bucket)
            .or_default()
            .entry((msg.node.clone(), graph.to_owned()))
            .or_insert(0) += 1;
    }

    /// 다른 싱크의 횟수를 더합니다.
    pub fn merge(&mut self, other: TimeLog) {
        for (bucket, series) in other.buckets {
            let target = self.buckets.entry(bucket).or_default();
            for (key, count) in series {
                *target.entry(key).or_insert(0) += count;
            }
        }
    }

    /// 버킷의 (노드, 그래프) 횟수
    pub fn count(&self, bucket: NaiveDateTime, node: &str, graph: &str) -> u64 {
        self.buckets
            .get(&bucket)
            .and_then(|series| series.get(&(node.to_owned(), graph.to_owned())))
            .copied()
            .unwrap_or(0)
    }

    /// CSV 문서를 생성합니다. 열은 `<node>.<graph>` 이름 순이고 빈 칸은 0입니다.
    pub fn render_csv(&self) -> String {
        let columns: BTreeSet<&(String, String)> =
            self.buckets.values().flat_map(|series| series.keys()).collect();

        let mut out = String::from("timestamp");
        for (node, graph) in &columns {
            out.push(',');
            out.push_str(&csv_field(&format!("{node}.{graph}")));
        }
        out.push('\n');

        for (bucket, series) in &self.buckets {
            out.push_str(&csv_timestamp(Some(bucket)));
            for key in &columns {
                out.push(',');
                out.push_str(&series.get(*key).copied().unwrap_or(0).to_string());
            }
            out.push('\n');
        }
        out
    }

    /// 출력 디렉토리에 CSV 파일을 기록합니다.
    pub fn dump(&self, dir: &Path) -> Result<(), LogPipelineError> {
        let path = dir.join(&self.filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, self.render_csv())?;
        debug!(
            sink = %self.name,
            path = %path.display(),
            buckets = self.buckets.len(),
            "time series written"
        );
        Ok(())
    }
}
