//! 요청 추적 싱크
//!
//! 노드별로 요청의 수명 주기 (received -> ordered) 시각을 기록합니다.
//! 같은 요청을 여러 번 관찰하면 각 시각의 최솟값을 유지하므로
//! 병합 순서와 무관하게 같은 결과가 나옵니다.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use logsift_core::config::RequestsConfig;
use super::{csv_field, csv_timestamp};
use crate::error::LogPipelineError;

/// 요청 식별자 (클라이언트 ID, 요청 번호)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId {
    pub client: String,
    pub seq: u64,
}

impl RequestId {
    pub fn new(client: impl Into<String>, seq: u64) -> Self {
        Self {
            client: client.into(),
            seq,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.seq)
    }
}

/// 요청 하나의 수명 주기 기록
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestData {
    /// 가장 이른 수신 시각
    pub received: Option<NaiveDateTime>,
    /// 가장 이른 정렬 시각
    pub ordered: Option<NaiveDateTime>,
}

impl RequestData {
    /// 수신부터 정렬까지 걸린 시간. 두 시각이 모두 있어야 정의됩니다.
    pub fn time_to_order(&self) -> Option<Duration> {
        Some(self.ordered? - self.received?)
    }

    fn merge(&mut self, other: RequestData) {
        self.received = earliest(self.received, other.received);
        self.ordered = earliest(self.ordered, other.ordered);
    }
}

fn earliest(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// 노드별 요청 통계
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeRequestStats {
    /// 수신 시각이 있는 요청 수
    pub received: usize,
    /// 정렬 시각이 있는 요청 수
    pub ordered: usize,
    /// 양수 time-to-order (초) 의 최소/평균/최대. 표본이 없으면 `None`
    pub time_to_order: Option<(f64, f64, f64)>,
}

/// 요청 추적 싱크
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestTracker {
    /// 노드 -> 요청 -> 기록
    nodes: BTreeMap<String, BTreeMap<RequestId, RequestData>>,
}

impl RequestTracker {
    /// 빈 싱크를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, node: &str, id: RequestId) -> &mut RequestData {
        self.nodes
            .entry(node.to_owned())
            .or_default()
            .entry(id)
            .or_default()
    }

    /// 요청 수신 시각을 기록합니다.
    pub fn add_received(&mut self, node: &str, id: RequestId, at: NaiveDateTime) {
        let data = self.entry(node, id);
        data.received = earliest(data.received, Some(at));
    }

    /// 요청 정렬 시각을 기록합니다.
    pub fn add_ordered(&mut self, node: &str, id: RequestId, at: NaiveDateTime) {
        let data = self.entry(node, id);
        data.ordered = earliest(data.ordered, Some(at));
    }

    /// 노드의 요청 기록
    pub fn get(&self, node: &str, id: &RequestId) -> Option<&RequestData> {
        self.nodes.get(node).and_then(|requests| requests.get(id))
    }

    /// 기록이 하나도 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 다른 싱크의 기록을 합칩니다.
    pub fn merge(&mut self, other: RequestTracker) {
        for (node, requests) in other.nodes {
            let target = self.nodes.entry(node).or_default();
            for (id, data) in requests {
                target.entry(id).or_default().merge(data);
            }
        }
    }

    /// 노드별 통계를 계산합니다. 0 이하의 time-to-order는 제외됩니다.
    pub fn stats(&self) -> BTreeMap<&str, NodeRequestStats> {
        self.nodes
            .iter()
            .map(|(node, requests)| {
                let received = requests.values().filter(|d| d.received.is_some()).count();
                let ordered = requests.values().filter(|d| d.ordered.is_some()).count();
                let samples: Vec<f64> = requests
                    .values()
                    .filter_map(RequestData::time_to_order)
                    .filter(|d| *d > Duration::zero())
                    .map(duration_secs)
                    .collect();
                let time_to_order = (!samples.is_empty()).then(|| {
                    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    let avg = samples.iter().sum::<f64>() / samples.len() as f64;
                    (min, avg, max)
                });
                (
                    node.as_str(),
                    NodeRequestStats {
                        received,
                        ordered,
                        time_to_order,
                    },
                )
            })
            .collect()
    }

    /// time-to-order가 임계값을 넘는 요청 목록 (노드, 요청, 초)
    pub fn lagging(&self, threshold_secs: u64) -> Vec<(&str, &RequestId, f64)> {
        let threshold = Duration::seconds(i64::try_from(threshold_secs).unwrap_or(i64::MAX));
        let mut out = Vec::new();
        for (node, requests) in &self.nodes {
            for (id, data) in requests {
                if let Some(tto) = data.time_to_order()
                    && tto > threshold
                {
                    out.push((node.as_str(), id, duration_secs(tto)));
                }
            }
        }
        out
    }

    /// 노드별 요약을 콘솔 형식으로 렌더링합니다.
    pub fn render_summary(&self) -> Vec<String> {
        self.stats()
            .into_iter()
            .map(|(node, stats)| {
                let tto = match stats.time_to_order {
                    Some((min, avg, max)) => format!("{min:.3}/{avg:.3}/{max:.3}"),
                    None => "n/a".to_owned(),
                };
                format!(
                    "{node}: received {}, ordered {}, time to order min/avg/max: {tto} s",
                    stats.received, stats.ordered
                )
            })
            .collect()
    }

    /// 요청별 CSV 문서를 생성합니다.
    pub fn render_csv(&self) -> String {
        let mut out = String::from("node,request,received,ordered,time_to_order\n");
        for (node, requests) in &self.nodes {
            for (id, data) in requests {
                let tto = data
                    .time_to_order()
                    .map(|d| format!("{:.3}", duration_secs(d)));
                out.push_str(&format!(
                    "{},{},{},{},{}\n",
                    csv_field(node),
                    csv_field(&id.to_string()),
                    csv_timestamp(data.received.as_ref()),
                    csv_timestamp(data.ordered.as_ref()),
                    tto.unwrap_or_default(),
                ));
            }
        }
        out
    }

    /// 요약을 콘솔에 쓰고, 설정에 따라 CSV와 지연 목록을 기록합니다.
    pub fn dump(
        &self,
        config: &RequestsConfig,
        dir: &Path,
        console: &mut dyn Write,
    ) -> Result<(), LogPipelineError> {
        for line in self.render_summary() {
            writeln!(console, "{line}")?;
        }

        if config.report_lags {
            let lagging = self.lagging(config.lag_threshold_secs);
            writeln!(
                console,
                "requests with time to order above {} s: {}",
                config.lag_threshold_secs,
                lagging.len()
            )?;
            for (node, id, secs) in lagging {
                writeln!(console, "  {node} {id} {secs:.3} s")?;
            }
        }

        if let Some(filename) = &config.filename {
            let path = dir.join(filename);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, self.render_csv())?;
            debug!(path = %path.display(), "request table written");
        }
        Ok(())
    }
}

fn duration_secs(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsift_core::types::parse_timestamp;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn time_to_order_requires_both_instants() {
        let mut data = RequestData::default();
        assert!(data.time_to_order().is_none());
        data.received = Some(ts("2018-01-29 10:00:00,000"));
        assert!(data.time_to_order().is_none());
        data.ordered = Some(ts("2018-01-29 10:00:01,500"));
        assert_eq!(data.time_to_order(), Some(Duration::milliseconds(1500)));
    }

    #[test]
    fn earliest_observation_wins() {
        let mut t = RequestTracker::new();
        let id = RequestId::new("C1", 7);
        t.add_received("Node1", id.clone(), ts("2018-01-29 10:00:05,000"));
        t.add_received("Node1", id.clone(), ts("2018-01-29 10:00:01,000"));
        t.add_received("Node1", id.clone(), ts("2018-01-29 10:00:09,000"));
        assert_eq!(
            t.get("Node1", &id).unwrap().received,
            Some(ts("2018-01-29 10:00:01,000"))
        );
    }

    #[test]
    fn stats_exclude_non_positive_durations() {
        let mut t = RequestTracker::new();
        let good = RequestId::new("C1", 1);
        let backwards = RequestId::new("C1", 2);
        let pending = RequestId::new("C1", 3);
        t.add_received("Node1", good.clone(), ts("2018-01-29 10:00:00,000"));
        t.add_ordered("Node1", good, ts("2018-01-29 10:00:02,000"));
        t.add_received("Node1", backwards.clone(), ts("2018-01-29 10:00:05,000"));
        t.add_ordered("Node1", backwards, ts("2018-01-29 10:00:04,000"));
        t.add_received("Node1", pending, ts("2018-01-29 10:00:06,000"));

        let stats = t.stats();
        let node = stats["Node1"];
        assert_eq!(node.received, 3);
        assert_eq!(node.ordered, 2);
        assert_eq!(node.time_to_order, Some((2.0, 2.0, 2.0)));
    }

    #[test]
    fn summary_without_samples_says_na() {
        let mut t = RequestTracker::new();
        t.add_received("Node2", RequestId::new("C9", 1), ts("2018-01-29 10:00:00,000"));
        assert_eq!(
            t.render_summary(),
            vec!["Node2: received 1, ordered 0, time to order min/avg/max: n/a s".to_owned()]
        );
    }

    #[test]
    fn lagging_requests_above_threshold() {
        let mut t = RequestTracker::new();
        let slow = RequestId::new("C1", 1);
        let fast = RequestId::new("C1", 2);
        t.add_received("Node1", slow.clone(), ts("2018-01-29 10:00:00,000"));
        t.add_ordered("Node1", slow.clone(), ts("2018-01-29 10:01:30,000"));
        t.add_received("Node1", fast.clone(), ts("2018-01-29 10:00:00,000"));
        t.add_ordered("Node1", fast, ts("2018-01-29 10:00:10,000"));
        let lagging = t.lagging(60);
        assert_eq!(lagging.len(), 1);
        assert_eq!(lagging[0].1, &slow);
        assert_eq!(lagging[0].2, 90.0);
    }

    #[test]
    fn csv_lists_every_request() {
        let mut t = RequestTracker::new();
        let id = RequestId::new("C1", 7);
        t.add_received("Node1", id.clone(), ts("2018-01-29 10:00:00,000"));
        t.add_ordered("Node1", id, ts("2018-01-29 10:00:01,250"));
        t.add_received("Node1", RequestId::new("C2", 1), ts("2018-01-29 10:00:00,000"));
        assert_eq!(
            t.render_csv(),
            "node,request,received,ordered,time_to_order\n\
             Node1,C1:7,\"2018-01-29 10:00:00,000\",\"2018-01-29 10:00:01,250\",1.250\n\
             Node1,C2:1,\"2018-01-29 10:00:00,000\",,\n"
        );
    }

    #[test]
    fn csv_quotes_names_with_separators() {
        let mut t = RequestTracker::new();
        t.add_received("Node,1", RequestId::new("C\"1", 7), ts("2018-01-29 10:00:00,000"));
        assert_eq!(
            t.render_csv(),
            "node,request,received,ordered,time_to_order\n\
             \"Node,1\",\"C\"\"1:7\",\"2018-01-29 10:00:00,000\",,\n"
        );
    }

    #[test]
    fn dump_writes_console_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = RequestTracker::new();
        t.add_received("Node1", RequestId::new("C1", 1), ts("2018-01-29 10:00:00,000"));
        let config = RequestsConfig {
            filename: Some("requests.csv".to_owned()),
            report_lags: true,
            lag_threshold_secs: 60,
        };
        let mut console = Vec::new();
        t.dump(&config, dir.path(), &mut console).unwrap();
        let console = String::from_utf8(console).unwrap();
        assert!(console.contains("Node1: received 1, ordered 0"));
        assert!(console.contains("above 60 s: 0"));
        assert!(dir.path().join("requests.csv").exists());
    }
}
