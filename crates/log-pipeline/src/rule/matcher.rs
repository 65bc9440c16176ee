//! 매처 엔진 -- 매처 스펙 컴파일 및 메시지 판정
//!
//! 매처 스펙은 YAML 값으로 표현되며 규칙 로딩 시 한 번 [`Matcher`]로
//! 컴파일됩니다. 정규식도 이때 컴파일하므로 판정 중에는 실패하지 않습니다.
//!
//! # 스펙 형식
//! ```yaml
//! matchers:
//!   errors:                      # 명명된 매처: 항목 중 하나라도 맞으면 참
//!     - level: ERROR
//!     - message: 'Traceback'
//!   view_change:
//!     all:
//!       - func: startViewChange
//!       - replica: master
//! chains:
//!   main:
//!     - match any and return:
//!         level: {min: WARNING}
//!         timestamp: {min: "2018-01-29 10:00:00,000"}
//!         reqId: "C1:7"          # 알 수 없는 키는 명명된 매처 또는 속성 검사
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use regex::Regex;
use serde_yaml::Value;
use tracing::debug;

use logsift_core::types::{Level, Message, parse_timestamp};

use crate::error::LogPipelineError;

/// 레플리카 역할 조건
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaRole {
    /// 레플리카 범위가 아닌 노드 메시지
    Node,
    /// 노드 메시지 또는 마스터 레플리카 (0번)
    Master,
    /// 백업 레플리카 (1번 이상)
    Backup,
    /// 특정 레플리카 번호
    Exact(u32),
    /// 번호가 아닌 리터럴. 어떤 메시지와도 같지 않습니다.
    Literal,
}

impl ReplicaRole {
    /// 레플리카 번호가 역할에 해당하는지 판정합니다.
    pub fn test(self, replica: Option<u32>) -> bool {
        match (self, replica) {
            (Self::Node, None) => true,
            (Self::Master, None | Some(0)) => true,
            (Self::Backup, Some(n)) => n > 0,
            (Self::Exact(want), Some(n)) => want == n,
            _ => false,
        }
    }
}

/// 컴파일된 매처
#[derive(Debug, Clone)]
pub enum Matcher {
    /// 타임스탬프 범위 (양 끝 포함)
    Timestamp {
        min: Option<NaiveDateTime>,
        max: Option<NaiveDateTime>,
    },
    /// 심각도 범위 (양 끝 포함)
    Level { min: Level, max: Level },
    /// 함수명 일치
    Func(String),
    /// 본문 정규식 검색
    Message(Regex),
    /// 레플리카 역할
    Replica(ReplicaRole),
    /// 속성 존재 (`value`가 `None`) 또는 값 포함
    Attribute { name: String, value: Option<String> },
    /// 하위 매처 중 하나라도 참
    Any(Vec<Matcher>),
    /// 하위 매처가 모두 참
    All(Vec<Matcher>),
}

impl Matcher {
    /// 메시지를 판정합니다.
    ///
    /// 타임스탬프가 없는 메시지는 타임스탬프 범위에 맞지 않습니다.
    /// 심각도 토큰을 해석할 수 없는 메시지는 심각도 범위를 통과합니다.
    pub fn test(&self, msg: &Message) -> bool {
        match self {
            Self::Timestamp { min, max } => msg.timestamp.is_some_and(|ts| {
                min.is_none_or(|min| ts >= min) && max.is_none_or(|max| ts <= max)
            }),
            Self::Level { min, max } => msg
                .severity()
                .is_none_or(|level| *min <= level && level <= *max),
            Self::Func(name) => msg.func.as_deref() == Some(name.as_str()),
            Self::Message(regex) => regex.is_match(&msg.body),
            Self::Replica(role) => role.test(msg.replica),
            Self::Attribute { name, value: None } => msg.attrs.contains(name),
            Self::Attribute {
                name,
                value: Some(value),
            } => msg.attrs.has_value(name, value),
            Self::Any(children) => children.iter().any(|m| m.test(msg)),
            Self::All(children) => children.iter().all(|m| m.test(msg)),
        }
    }

    /// 단일 매처 스펙을 컴파일합니다.
    ///
    /// 스펙이 여러 매처로 펼쳐지면 모두 만족해야 하는 [`Matcher::All`]이 됩니다.
    pub fn compile(
        spec: &Value,
        named: &BTreeMap<String, Value>,
    ) -> Result<Self, LogPipelineError> {
        let mut matchers = MatcherCompiler::new(named).compile_specs(spec, "matcher")?;
        if matchers.len() == 1 {
            Ok(matchers.remove(0))
        } else {
            Ok(Self::All(matchers))
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp { .. } => f.write_str("timestamp"),
            Self::Level { min, max } => write!(f, "level[{min}..{max}]"),
            Self::Func(name) => write!(f, "func={name}"),
            Self::Message(regex) => write!(f, "message~/{}/", regex.as_str()),
            Self::Replica(role) => write!(f, "replica={role:?}"),
            Self::Attribute { name, value: None } => write!(f, "has {name}"),
            Self::Attribute {
                name,
                value: Some(value),
            } => write!(f, "{name}={value}"),
            Self::Any(children) => write!(f, "any({})", children.len()),
            Self::All(children) => write!(f, "all({})", children.len()),
        }
    }
}

/// 매처 스펙 컴파일러
///
/// 명명된 매처 테이블을 참조하며, 명명된 매처 사이의 순환 참조를 거부합니다.
pub struct MatcherCompiler<'a> {
    named: &'a BTreeMap<String, Value>,
    /// 현재 펼치는 중인 명명된 매처 (순환 감지용)
    resolving: Vec<String>,
}

impl<'a> MatcherCompiler<'a> {
    /// 명명된 매처 테이블로 컴파일러를 생성합니다.
    pub fn new(named: &'a BTreeMap<String, Value>) -> Self {
        Self {
            named,
            resolving: Vec::new(),
        }
    }

    /// 스펙을 매처 목록으로 컴파일합니다.
    ///
    /// - 문자열: 명명된 매처 참조 (없으면 속성 존재 검사)
    /// - 매핑: 키마다 하나의 매처
    /// - 목록: 각 원소를 컴파일하여 펼침
    pub fn compile_specs(
        &mut self,
        spec: &Value,
        context: &str,
    ) -> Result<Vec<Matcher>, LogPipelineError> {
        match spec {
            Value::String(name) => Ok(vec![self.compile_named(name, None, context)?]),
            Value::Mapping(map) => {
                let mut out = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let key = key
                        .as_str()
                        .ok_or_else(|| compile_error(context, "matcher keys must be strings"))?;
                    out.push(self.compile_entry(key, value, context)?);
                }
                Ok(out)
            }
            Value::Sequence(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(self.compile_specs(item, context)?);
                }
                Ok(out)
            }
            Value::Null => Err(compile_error(context, "empty matcher spec")),
            other => Err(compile_error(
                context,
                format!("unsupported matcher spec: {other:?}"),
            )),
        }
    }

    fn compile_entry(
        &mut self,
        key: &str,
        value: &Value,
        context: &str,
    ) -> Result<Matcher, LogPipelineError> {
        match key {
            "timestamp" => compile_timestamp(value, context),
            "level" => compile_level(value, context),
            "func" => Ok(Matcher::Func(scalar(value, context, "func")?)),
            "message" => {
                let pattern = scalar(value, context, "message")?;
                let regex = Regex::new(&pattern).map_err(|e| {
                    compile_error(context, format!("invalid message regex '{pattern}': {e}"))
                })?;
                Ok(Matcher::Message(regex))
            }
            "replica" => compile_replica(value, context),
            "attribute" => {
                let spec = scalar(value, context, "attribute")?;
                let (name, value) = match spec.split_once(':') {
                    Some((name, value)) => (name.to_owned(), Some(value.to_owned())),
                    None => (spec.clone(), None),
                };
                Ok(Matcher::Attribute { name, value })
            }
            "any" => Ok(Matcher::Any(self.compile_specs(value, context)?)),
            "all" => Ok(Matcher::All(self.compile_specs(value, context)?)),
            other => self.compile_named(other, Some(value), context),
        }
    }

    /// 명명된 매처를 펼치거나, 없으면 같은 이름의 속성 검사로 해석합니다.
    fn compile_named(
        &mut self,
        name: &str,
        value: Option<&Value>,
        context: &str,
    ) -> Result<Matcher, LogPipelineError> {
        let named = self.named;
        if let Some(spec) = named.get(name) {
            if self.resolving.iter().any(|n| n == name) {
                let mut path = self.resolving.clone();
                path.push(name.to_owned());
                return Err(compile_error(
                    context,
                    format!("matcher cycle: {}", path.join(" -> ")),
                ));
            }
            self.resolving.push(name.to_owned());
            let children = self.compile_specs(spec, &format!("matchers.{name}"));
            self.resolving.pop();
            return Ok(Matcher::Any(children?));
        }

        let value = match value {
            None | Some(Value::Null) => None,
            Some(v) => Some(scalar(v, context, name)?),
        };
        Ok(Matcher::Attribute {
            name: name.to_owned(),
            value,
        })
    }
}

fn compile_timestamp(value: &Value, context: &str) -> Result<Matcher, LogPipelineError> {
    let Value::Mapping(map) = value else {
        return Err(compile_error(
            context,
            "timestamp matcher expects {min, max}",
        ));
    };
    let bound = |key: &str| -> Result<Option<NaiveDateTime>, LogPipelineError> {
        match map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => {
                let raw = scalar(v, context, "timestamp")?;
                parse_timestamp(&raw)
                    .map(Some)
                    .map_err(|e| compile_error(context, e.to_string()))
            }
        }
    };
    Ok(Matcher::Timestamp {
        min: bound("min")?,
        max: bound("max")?,
    })
}

fn compile_level(value: &Value, context: &str) -> Result<Matcher, LogPipelineError> {
    let level = |raw: &str| -> Result<Level, LogPipelineError> {
        raw.parse()
            .map_err(|e: logsift_core::error::ParseError| compile_error(context, e.to_string()))
    };
    match value {
        Value::Mapping(map) => {
            let bound = |key: &str, default: Level| -> Result<Level, LogPipelineError> {
                match map.get(key) {
                    None | Some(Value::Null) => Ok(default),
                    Some(v) => level(&scalar(v, context, "level")?),
                }
            };
            let min = bound("min", Level::Trace)?;
            let max = bound("max", Level::Error)?;
            if min > max {
                return Err(compile_error(context, "level min is above max"));
            }
            Ok(Matcher::Level { min, max })
        }
        other => {
            let exact = level(&scalar(other, context, "level")?)?;
            Ok(Matcher::Level {
                min: exact,
                max: exact,
            })
        }
    }
}

fn compile_replica(value: &Value, context: &str) -> Result<Matcher, LogPipelineError> {
    let raw = scalar(value, context, "replica")?;
    let role = match raw.as_str() {
        "node" => ReplicaRole::Node,
        "master" => ReplicaRole::Master,
        "backup" => ReplicaRole::Backup,
        other => match other.parse() {
            Ok(n) => ReplicaRole::Exact(n),
            Err(_) => {
                debug!(context, replica = other, "replica literal is not a number, never matches");
                ReplicaRole::Literal
            }
        },
    };
    Ok(Matcher::Replica(role))
}

/// 스칼라 YAML 값을 문자열로 변환합니다.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar(value: &Value, context: &str, what: &str) -> Result<String, LogPipelineError> {
    scalar_to_string(value)
        .ok_or_else(|| compile_error(context, format!("'{what}' expects a scalar value")))
}

fn compile_error(context: &str, reason: impl Into<String>) -> LogPipelineError {
    LogPipelineError::MatcherCompile {
        context: context.to_owned(),
        reason: reason.into(),
    }
}
