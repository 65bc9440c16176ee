//! 도메인 타입: 로그 메시지 모델
//!
//! 한 줄의 로그 레코드를 나타내는 [`Message`]와,
//! 규칙 처리 중 메시지에 부착되는 다중값 속성 맵 [`Attributes`]를 정의합니다.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// 로그 타임스탬프 형식 (`2018-01-29 10:15:03,123`)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// `YYYY-MM-DD HH:MM:SS,mmm` 형식의 타임스탬프를 파싱합니다.
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(input.trim(), TIMESTAMP_FORMAT).map_err(|_| {
        ParseError::Timestamp {
            input: input.to_owned(),
        }
    })
}

/// 타임스탬프를 로그 형식 문자열로 변환합니다.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// `Option<NaiveDateTime>`을 로그 타임스탬프 형식 문자열로 (역)직렬화합니다.
///
/// `#[serde(default, with = "logsift_core::types::opt_timestamp")]` 형태로 사용합니다.
pub mod opt_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&super::format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| super::parse_timestamp(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// 심각도 레벨
///
/// `Ord` 구현으로 비교가 가능합니다 (`Trace < Debug < Info < Warning < Error`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
}

impl Level {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며, 알 수 없는 토큰이면 `None`을 반환합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "TRACE" => Some(Self::Trace),
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" | "WARN" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl FromStr for Level {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_loose(s).ok_or_else(|| ParseError::Level(s.to_owned()))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// 다중값 속성 맵
///
/// 속성 이름마다 값의 집합을 가집니다. 같은 값은 한 번만 저장되고,
/// 값 없이 존재만 표시된 속성은 빈 집합으로 표현됩니다.
/// 두 맵의 병합은 이름별 합집합입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl Attributes {
    /// 빈 속성 맵을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 값 없이 속성의 존재만 표시합니다.
    pub fn mark(&mut self, name: impl Into<String>) {
        self.entries.entry(name.into()).or_default();
    }

    /// 속성 값을 추가합니다. 이미 있는 값이면 무시됩니다.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(name.into()).or_default().insert(value.into());
    }

    /// 속성이 존재하는지 확인합니다.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// 속성이 주어진 값을 가지는지 확인합니다.
    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|values| values.contains(value))
    }

    /// 속성의 값 집합을 반환합니다.
    pub fn values(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(name)
    }

    /// 다른 속성 맵을 합집합으로 병합합니다.
    pub fn merge(&mut self, other: Attributes) {
        for (name, values) in other.entries {
            self.entries.entry(name).or_default().extend(values);
        }
    }

    /// 이름 순으로 (이름, 값 집합)을 순회합니다.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.entries.iter()
    }

    /// 속성 이름 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 로그 메시지
///
/// 입력 파일의 물리적 한 줄에서 생성되며, 규칙 처리 중 속성 부착과
/// 타임스탬프 이동으로 변경됩니다. 체인 처리가 끝나면 버려집니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// 메시지 본문 (레플리카 접두사 제거 후)
    pub body: String,
    /// 타임스탬프 (연속 라인이면 없을 수 있음)
    pub timestamp: Option<NaiveDateTime>,
    /// 메시지를 생성한 노드 식별자
    pub node: String,
    /// 레플리카 번호. `None`이면 레플리카 범위가 아닌 메시지
    pub replica: Option<u32>,
    /// 심각도 토큰 (원문 그대로)
    pub level: Option<String>,
    /// 소스 위치 (모듈/파일)
    pub source: Option<String>,
    /// 함수명
    pub func: Option<String>,
    /// 처리 중 부착된 속성
    pub attrs: Attributes,
}

impl Message {
    /// 본문과 노드만으로 메시지를 생성합니다.
    pub fn new(body: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            timestamp: None,
            node: node.into(),
            replica: None,
            level: None,
            source: None,
            func: None,
            attrs: Attributes::new(),
        }
    }

    /// 타임스탬프를 설정합니다.
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// 심각도 토큰을 설정합니다.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// 함수명을 설정합니다.
    pub fn with_func(mut self, func: impl Into<String>) -> Self {
        self.func = Some(func.into());
        self
    }

    /// 레플리카 번호를 설정합니다.
    pub fn with_replica(mut self, replica: u32) -> Self {
        self.replica = Some(replica);
        self
    }

    /// 심각도 토큰을 해석합니다. 알 수 없는 토큰이면 `None`.
    pub fn severity(&self) -> Option<Level> {
        self.level.as_deref().and_then(Level::from_str_loose)
    }

    /// 속성을 부착합니다. `value`가 `None`이면 존재만 표시합니다.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Option<String>) {
        match value {
            Some(value) => self.attrs.insert(name, value),
            None => self.attrs.mark(name),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.level.as_deref().unwrap_or("-"),
            self.node,
            self.func.as_deref().unwrap_or("-"),
            self.body,
        )
    }
}
