//! 노드별 카운터 싱크
//!
//! 규칙이 지정한 카운터를 노드별로 셉니다. 덤프 시 노드마다 형식 템플릿을
//! 한 줄로 렌더링하며, 자리표시자는 카운터 이름 (`{node}`는 노드명)입니다.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use logsift_core::config::CounterConfig;

use super::template::Template;
use crate::error::LogPipelineError;

/// 컴파일된 카운터 싱크 설정
#[derive(Debug)]
pub struct CounterSpec {
    /// 싱크 이름
    pub name: String,
    /// 노드별 출력 템플릿
    pub format: Template,
}

impl CounterSpec {
    /// 설정에서 템플릿을 컴파일합니다.
    pub fn compile(name: &str, config: &CounterConfig) -> Result<Self, LogPipelineError> {
        Ok(Self {
            name: name.to_owned(),
            format: Template::compile(&config.format)?,
        })
    }
}

/// 노드별 카운터 싱크
#[derive(Debug, Clone)]
pub struct CounterSink {
    spec: Arc<CounterSpec>,
    /// 노드 -> 카운터 이름 -> 값
    counts: BTreeMap<String, BTreeMap<String, u64>>,
}

impl CounterSink {
    /// 빈 싱크를 생성합니다.
    pub fn new(spec: Arc<CounterSpec>) -> Self {
        Self {
            spec,
            counts: BTreeMap::new(),
        }
    }

    /// 싱크 이름
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// 노드의 카운터를 1 증가시킵니다.
    pub fn add(&mut self, node: &str, counter: &str) {
        *self
            .counts
            .entry(node.to_owned())
            .or_default()
            .entry(counter.to_owned())
            .or_insert(0) += 1;
    }

    /// 노드의 카운터 값
    pub fn get(&self, node: &str, counter: &str) -> u64 {
        self.counts
            .get(node)
            .and_then(|c| c.get(counter))
            .copied()
            .unwrap_or(0)
    }

    /// 다른 싱크의 값을 더합니다.
    pub fn merge(&mut self, other: CounterSink) {
        for (node, counters) in other.counts {
            let target = self.counts.entry(node).or_default();
            for (name, value) in counters {
                *target.entry(name).or_insert(0) += value;
            }
        }
    }

    /// 노드 이름 순으로 한 줄씩 렌더링합니다. 없는 카운터는 0입니다.
    pub fn render(&self) -> Vec<String> {
        self.counts
            .iter()
            .map(|(node, counters)| {
                self.spec.format.render_with(|name, out| {
                    if name == "node" {
                        out.push_str(node);
                    } else {
                        out.push_str(&counters.get(name).copied().unwrap_or(0).to_string());
                    }
                })
            })
            .collect()
    }

    /// 렌더링한 줄을 `writer`에 기록합니다.
    pub fn dump(&self, writer: &mut dyn Write) -> Result<(), LogPipelineError> {
        for line in self.render() {
            writeln!(writer, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> CounterSink {
        let config = CounterConfig {
            format: "{node}: received {received}, ordered {ordered}".to_owned(),
        };
        CounterSink::new(Arc::new(CounterSpec::compile("summary", &config).unwrap()))
    }

    #[test]
    fn render_per_node_with_zero_defaults() {
        let mut s = sink();
        s.add("Node2", "received");
        s.add("Node1", "received");
        s.add("Node1", "received");
        s.add("Node1", "ordered");
        assert_eq!(
            s.render(),
            vec![
                "Node1: received 2, ordered 1".to_owned(),
                "Node2: received 1, ordered 0".to_owned(),
            ]
        );
    }

    #[test]
    fn merge_sums_counts() {
        let mut a = sink();
        a.add("Node1", "received");
        let mut b = sink();
        b.add("Node1", "received");
        b.add("Node3", "ordered");
        a.merge(b);
        assert_eq!(a.get("Node1", "received"), 2);
        assert_eq!(a.get("Node3", "ordered"), 1);
        assert_eq!(a.get("Node3", "received"), 0);
    }

    #[test]
    fn dump_writes_lines() {
        let mut s = sink();
        s.add("Node1", "ordered");
        let mut buf = Vec::new();
        s.dump(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Node1: received 0, ordered 1\n"
        );
    }
}
