//! 규칙 데이터 타입 및 규칙 스펙 컴파일
//!
//! 체인의 각 항목은 문자열 (`track_requests` 또는 체인 이름) 이거나
//! 키가 하나인 매핑 `{규칙 이름: 파라미터}`입니다.
//!
//! ```yaml
//! chains:
//!   main:
//!     - timeshift: {Node3: -1.5}
//!     - match any or drop: {level: {min: INFO}}
//!     - tag:
//!         pattern: 'view change to view (\d+)'
//!         attributes: {viewchange: null, view: group 1, kind: vc}
//!     - track_requests
//!     - log line: [all, per_node]
//!     - log time: {stats: messages}
//!     - log count: {summary: total}
//!     - view_changes          # 다른 체인 호출
//! ```

use std::collections::HashMap;

use chrono::Duration;
use regex::Regex;
use serde_yaml::Value;

use logsift_core::types::Message;

use super::matcher::{Matcher, MatcherCompiler, scalar_to_string};
use crate::error::LogPipelineError;
use crate::sink::{OutputLayout, SinkId};

/// 체인 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub(crate) usize);

/// 체인 처리 결과 액션
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// 현재 체인만 종료
    Return,
    /// 메시지 처리를 전체 호출 스택에 걸쳐 중단
    Drop,
}

/// 매처 결합 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    All,
    Any,
}

/// 결합 결과를 그대로 (`And`) 또는 부정하여 (`Or`) 사용
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    And,
    Or,
}

/// `match [all|any] [and|or] [return|drop]` 규칙
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub mode: MatchMode,
    pub op: MatchOp,
    pub action: Action,
    pub matchers: Vec<Matcher>,
}

impl MatchRule {
    /// 규칙 이름에서 결합 방식/연산/액션을 해석합니다.
    ///
    /// 생략된 항목의 기본값은 `any`, `or`, `return`입니다.
    pub fn parse_header(name: &str) -> Result<(MatchMode, MatchOp, Action), String> {
        let mut words = name.split_whitespace();
        if words.next() != Some("match") {
            return Err(format!("'{name}' is not a match rule"));
        }

        let (mut mode, mut op, mut action) = (None, None, None);
        for word in words {
            let slot_taken = match word {
                "all" => mode.replace(MatchMode::All).is_some(),
                "any" => mode.replace(MatchMode::Any).is_some(),
                "and" => op.replace(MatchOp::And).is_some(),
                "or" => op.replace(MatchOp::Or).is_some(),
                "return" => action.replace(Action::Return).is_some(),
                "drop" => action.replace(Action::Drop).is_some(),
                other => return Err(format!("unknown match keyword '{other}'")),
            };
            if slot_taken {
                return Err(format!("conflicting keyword '{word}' in '{name}'"));
            }
        }

        Ok((
            mode.unwrap_or(MatchMode::Any),
            op.unwrap_or(MatchOp::Or),
            action.unwrap_or(Action::Return),
        ))
    }

    /// 규칙이 발동하는지 판정합니다.
    pub fn fires(&self, msg: &Message) -> bool {
        let combined = match self.mode {
            MatchMode::All => self.matchers.iter().all(|m| m.test(msg)),
            MatchMode::Any => self.matchers.iter().any(|m| m.test(msg)),
        };
        match self.op {
            MatchOp::And => combined,
            MatchOp::Or => !combined,
        }
    }
}

/// 태그 속성 값
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    /// 값 없는 존재 표시
    Marker,
    /// 정규식 캡처 그룹의 텍스트
    Group(usize),
    /// 고정 문자열
    Literal(String),
}

/// 본문 패턴이 맞으면 속성을 부착하는 규칙
#[derive(Debug, Clone)]
pub struct TagRule {
    pub pattern: Regex,
    pub attributes: Vec<(String, TagValue)>,
}

impl TagRule {
    /// 패턴이 본문에서 검색되면 속성을 부착합니다.
    pub fn apply(&self, msg: &mut Message) {
        let Some(caps) = self.pattern.captures(&msg.body) else {
            return;
        };
        for (name, value) in &self.attributes {
            match value {
                TagValue::Marker => msg.attrs.mark(name.as_str()),
                TagValue::Group(n) => {
                    // 참여하지 않은 그룹은 아무것도 부착하지 않습니다
                    if let Some(group) = caps.get(*n) {
                        msg.attrs.insert(name.as_str(), group.as_str());
                    }
                }
                TagValue::Literal(text) => msg.attrs.insert(name.as_str(), text.as_str()),
            }
        }
    }
}

/// 컴파일된 규칙
#[derive(Debug, Clone)]
pub enum Rule {
    Match(MatchRule),
    /// 노드별 타임스탬프 이동
    TimeShift(HashMap<String, Duration>),
    Tag(TagRule),
    /// (시계열 싱크, 그래프)
    LogTime(Vec<(SinkId, String)>),
    LogLine(Vec<SinkId>),
    /// (카운터 싱크, 카운터 이름)
    LogCount(Vec<(SinkId, String)>),
    TrackRequests,
    Chain(ChainId),
}

/// 규칙 컴파일에 필요한 테이블
pub struct RuleCompiler<'a> {
    pub(crate) matchers: MatcherCompiler<'a>,
    pub(crate) layout: &'a OutputLayout,
    pub(crate) chains: &'a HashMap<String, ChainId>,
}

impl RuleCompiler<'_> {
    /// 체인 `chain`의 `index`번째 규칙 스펙을 컴파일합니다.
    pub fn compile(
        &mut self,
        spec: &Value,
        chain: &str,
        index: usize,
    ) -> Result<Rule, LogPipelineError> {
        let error = |reason: String| LogPipelineError::RuleCompile {
            chain: chain.to_owned(),
            index,
            reason,
        };

        let (name, params) = match spec {
            Value::String(name) => (name.as_str(), &Value::Null),
            Value::Mapping(map) if map.len() == 1 => {
                let Some((key, params)) = map.iter().next() else {
                    return Err(error("empty rule mapping".to_owned()));
                };
                let name = key
                    .as_str()
                    .ok_or_else(|| error("rule name must be a string".to_owned()))?;
                (name, params)
            }
            Value::Mapping(map) => {
                return Err(error(format!(
                    "rule mapping must have exactly one key, found {}",
                    map.len()
                )));
            }
            other => return Err(error(format!("unsupported rule spec: {other:?}"))),
        };

        match name {
            "match" => self.compile_match(name, params, chain, index),
            _ if name.starts_with("match ") => self.compile_match(name, params, chain, index),
            "timeshift" => compile_timeshift(params).map_err(error),
            "tag" => compile_tag(params).map_err(error),
            "log time" => {
                let mut targets = Vec::new();
                for (sink, graph) in pairs(params).map_err(error)? {
                    targets.push((self.layout.timelog_id(&sink)?, graph));
                }
                Ok(Rule::LogTime(targets))
            }
            "log count" => {
                let mut targets = Vec::new();
                for (sink, counter) in pairs(params).map_err(error)? {
                    targets.push((self.layout.counter_id(&sink)?, counter));
                }
                Ok(Rule::LogCount(targets))
            }
            "log line" => {
                let mut targets = Vec::new();
                for sink in names(params).map_err(error)? {
                    targets.push(self.layout.log_id(&sink)?);
                }
                Ok(Rule::LogLine(targets))
            }
            "track_requests" => Ok(Rule::TrackRequests),
            other => match self.chains.get(other) {
                Some(id) if params.is_null() => Ok(Rule::Chain(*id)),
                Some(_) => Err(error(format!("chain call '{other}' takes no parameters"))),
                None => Err(error(format!("unknown rule or chain '{other}'"))),
            },
        }
    }

    fn compile_match(
        &mut self,
        name: &str,
        params: &Value,
        chain: &str,
        index: usize,
    ) -> Result<Rule, LogPipelineError> {
        let error = |reason: String| LogPipelineError::RuleCompile {
            chain: chain.to_owned(),
            index,
            reason,
        };
        let (mode, op, action) = MatchRule::parse_header(name).map_err(error)?;
        let context = format!("chain '{chain}' rule #{index}");
        let matchers = self.matchers.compile_specs(params, &context)?;
        if matchers.is_empty() {
            return Err(error("match rule needs at least one matcher".to_owned()));
        }
        Ok(Rule::Match(MatchRule {
            mode,
            op,
            action,
            matchers,
        }))
    }
}

fn compile_timeshift(params: &Value) -> Result<Rule, String> {
    let Value::Mapping(map) = params else {
        return Err("timeshift expects {node: seconds}".to_owned());
    };
    let mut shifts = HashMap::with_capacity(map.len());
    for (node, secs) in map {
        let node = scalar_to_string(node).ok_or("timeshift node must be a scalar")?;
        let secs = secs
            .as_f64()
            .filter(|s| s.is_finite())
            .ok_or_else(|| format!("timeshift for '{node}' must be a number of seconds"))?;
        let millis = (secs * 1000.0).round();
        let shift = (millis.abs() < i64::MAX as f64)
            .then(|| Duration::try_milliseconds(millis as i64))
            .flatten()
            .ok_or_else(|| format!("timeshift for '{node}' is out of range: {secs} seconds"))?;
        shifts.insert(node, shift);
    }
    Ok(Rule::TimeShift(shifts))
}

fn compile_tag(params: &Value) -> Result<Rule, String> {
    let Value::Mapping(map) = params else {
        return Err("tag expects {pattern, attributes}".to_owned());
    };
    let pattern = map
        .get("pattern")
        .and_then(Value::as_str)
        .ok_or("tag needs a string 'pattern'")?;
    let pattern = Regex::new(pattern).map_err(|e| format!("invalid tag pattern: {e}"))?;
    let groups = pattern.captures_len() - 1;

    let mut attributes = Vec::new();
    match map.get("attributes") {
        None | Some(Value::Null) => {}
        Some(Value::Mapping(attrs)) => {
            for (name, value) in attrs {
                let name = scalar_to_string(name).ok_or("tag attribute names must be scalars")?;
                let value = match value {
                    Value::Null => TagValue::Marker,
                    other => {
                        let text = scalar_to_string(other)
                            .ok_or_else(|| format!("tag attribute '{name}' must be a scalar"))?;
                        match group_index(&text) {
                            Some(n) if n <= groups => TagValue::Group(n),
                            Some(n) => {
                                return Err(format!(
                                    "tag attribute '{name}' refers to group {n}, pattern has {groups}"
                                ));
                            }
                            None => TagValue::Literal(text),
                        }
                    }
                };
                attributes.push((name, value));
            }
        }
        Some(_) => return Err("tag 'attributes' must be a mapping".to_owned()),
    }

    Ok(Rule::Tag(TagRule {
        pattern,
        attributes,
    }))
}

/// `group N` 또는 `capture-group N` 형식이면 N을 반환합니다.
fn group_index(text: &str) -> Option<usize> {
    let rest = text
        .strip_prefix("group ")
        .or_else(|| text.strip_prefix("capture-group "))?;
    rest.trim().parse().ok()
}

/// `{sink: target, ...}` 파라미터를 (싱크, 대상) 목록으로 변환합니다.
fn pairs(params: &Value) -> Result<Vec<(String, String)>, String> {
    match params {
        Value::Mapping(map) if !map.is_empty() => map
            .iter()
            .map(|(k, v)| match (scalar_to_string(k), scalar_to_string(v)) {
                (Some(k), Some(v)) => Ok((k, v)),
                _ => Err("expected {sink: name} pairs of scalars".to_owned()),
            })
            .collect(),
        Value::Sequence(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(pairs(item)?);
            }
            Ok(out)
        }
        _ => Err("expected a {sink: name} mapping".to_owned()),
    }
}

/// 문자열 하나 또는 문자열 목록을 싱크 이름 목록으로 변환합니다.
fn names(params: &Value) -> Result<Vec<String>, String> {
    match params {
        Value::String(name) => Ok(vec![name.clone()]),
        Value::Sequence(items) if !items.is_empty() => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| "sink names must be strings".to_owned())
            })
            .collect(),
        _ => Err("expected a sink name or a list of sink names".to_owned()),
    }
}
