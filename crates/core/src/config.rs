//! 설정 관리: YAML 설정 문서 파싱 및 런타임 설정
//!
//! [`LogsiftConfig`]는 입력 로그 규칙, 명명된 매처, 규칙 체인, 출력 싱크를
//! 담는 최상위 구조체입니다. 한 번 생성된 뒤 참조(`Arc`)로 체인 컴파일러,
//! 싱크, 드라이버에 전달됩니다. 전역 상태는 없습니다.
//!
//! # 설정 로딩 순서
//! 1. 기본 문서 (`logsift.yml`)
//! 2. 사용자 문서 (선택) -- 기본 문서에 깊은 병합
//! 3. 환경변수 (`LOGSIFT_GENERAL_WORKERS=4` 형식)
//! 4. 유효성 검증
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logsift_core::error::LogsiftError> {
//! use logsift_core::config::LogsiftConfig;
//!
//! let config = LogsiftConfig::load("logsift.yml", None).await?;
//! let config = LogsiftConfig::parse("input_logs: [{path: ., pattern: '(?P<node>Node\\d+)\\.log'}]")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::warn;

use crate::error::{ConfigError, LogsiftError};
use crate::types::opt_timestamp;

/// 최상위 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsiftConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 증분 처리 캐시 설정
    #[serde(default)]
    pub cache: CacheConfig,
    /// 입력 로그 탐색 규칙
    #[serde(default)]
    pub input_logs: Vec<InputLogRule>,
    /// 명명된 재사용 매처 정의 (이름 -> 매처 스펙)
    #[serde(default)]
    pub matchers: BTreeMap<String, Value>,
    /// 규칙 체인 (이름 -> 규칙 스펙 목록)
    #[serde(default)]
    pub chains: BTreeMap<String, Vec<Value>>,
    /// 출력 싱크 설정
    #[serde(default)]
    pub outputs: OutputsConfig,
}

impl LogsiftConfig {
    /// 기본 문서와 (선택적) 사용자 문서를 로드하여 설정을 생성합니다.
    ///
    /// 사용자 문서는 기본 문서에 깊은 병합되며, 이후 환경변수 오버라이드와
    /// 유효성 검증이 적용됩니다.
    pub async fn load(
        base: impl AsRef<Path>,
        user: Option<&Path>,
    ) -> Result<Self, LogsiftError> {
        let mut document = read_document(base.as_ref()).await?;
        if let Some(user) = user {
            let overlay = read_document(user).await?;
            merge_documents(&mut document, overlay);
        }

        let mut config = Self::from_document(document)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// YAML 문자열에서 설정을 파싱합니다 (검증 없음).
    pub fn parse(yaml_str: &str) -> Result<Self, LogsiftError> {
        let document: Value = serde_yaml::from_str(yaml_str).map_err(|e| {
            LogsiftError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })?;
        Self::from_document(document)
    }

    fn from_document(document: Value) -> Result<Self, LogsiftError> {
        // 빈 문서는 모든 섹션이 기본값인 설정입니다
        let document = match document {
            Value::Null => Value::Mapping(Default::default()),
            other => other,
        };
        serde_yaml::from_value(document).map_err(|e| {
            LogsiftError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGSIFT_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "LOGSIFT_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGSIFT_GENERAL_LOG_FORMAT");
        override_usize(&mut self.general.workers, "LOGSIFT_GENERAL_WORKERS");

        override_bool(&mut self.cache.enabled, "LOGSIFT_CACHE_ENABLED");
        override_string(&mut self.cache.dir, "LOGSIFT_CACHE_DIR");

        override_string(&mut self.outputs.directory, "LOGSIFT_OUTPUTS_DIRECTORY");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogsiftError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.general.workers == 0 {
            return Err(invalid("general.workers", "must be at least 1".to_owned()));
        }

        if self.general.entry_chain.is_empty() {
            return Err(invalid(
                "general.entry_chain",
                "must not be empty".to_owned(),
            ));
        }

        if self.cache.enabled && self.cache.dir.is_empty() {
            return Err(invalid(
                "cache.dir",
                "must not be empty when cache is enabled".to_owned(),
            ));
        }

        if self.input_logs.is_empty() {
            return Err(invalid(
                "input_logs",
                "at least one input rule must be configured".to_owned(),
            ));
        }

        for (idx, rule) in self.input_logs.iter().enumerate() {
            if rule.pattern.is_empty() {
                return Err(invalid(
                    &format!("input_logs[{idx}].pattern"),
                    "must not be empty".to_owned(),
                ));
            }
            if let (Some(min), Some(max)) = (rule.min_timestamp, rule.max_timestamp)
                && min > max
            {
                return Err(invalid(
                    &format!("input_logs[{idx}]"),
                    "min_timestamp must not be after max_timestamp".to_owned(),
                ));
            }
        }

        for (name, timelog) in &self.outputs.timelogs {
            if timelog.interval == 0 {
                return Err(invalid(
                    &format!("outputs.timelogs.{name}.interval"),
                    "must be greater than 0".to_owned(),
                ));
            }
        }

        Ok(())
    }
}

/// YAML 문서를 깊은 병합합니다.
///
/// 양쪽이 매핑이면 키별로 재귀 병합하고, 그 외에는 `overlay` 값이
/// `base` 값을 대체합니다.
pub fn merge_documents(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_documents(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

async fn read_document(path: &Path) -> Result<Value, LogsiftError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LogsiftError::Config(ConfigError::FileNotFound {
                path: path.display().to_string(),
            })
        } else {
            LogsiftError::Io(e)
        }
    })?;

    serde_yaml::from_str(&content).map_err(|e| {
        LogsiftError::Config(ConfigError::ParseFailed {
            reason: format!("{}: {e}", path.display()),
        })
    })
}

fn invalid(field: &str, reason: String) -> LogsiftError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 병렬 워커 수
    pub workers: usize,
    /// 각 메시지가 처음 들어가는 체인 이름
    pub entry_chain: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            entry_chain: "main".to_owned(),
        }
    }
}

/// 증분 처리 캐시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 캐시 파일 디렉토리
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: ".logsift-cache".to_owned(),
        }
    }
}

/// 입력 로그 탐색 규칙
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputLogRule {
    /// 탐색 루트 디렉토리
    #[serde(default = "default_input_path")]
    pub path: String,
    /// 하위 디렉토리까지 탐색할지 여부
    #[serde(default)]
    pub recursive: bool,
    /// 파일명 정규식 (`node` 이름 캡처 그룹으로 노드 식별자 추출)
    pub pattern: String,
    /// 이 시각 이전의 메시지는 처리하지 않음
    #[serde(default, with = "opt_timestamp")]
    pub min_timestamp: Option<NaiveDateTime>,
    /// 이 시각 이후의 메시지는 처리하지 않음
    #[serde(default, with = "opt_timestamp")]
    pub max_timestamp: Option<NaiveDateTime>,
    /// 타임스탬프가 있는 라인만 처리
    #[serde(default = "default_true")]
    pub only_timestamped: bool,
    /// 첫 타임스탬프 이전의 라인을 보관했다가 첫 타임스탬프로 표시
    #[serde(default)]
    pub buffer_untimestamped: bool,
}

impl InputLogRule {
    /// `[min, max]` 시간 범위가 이 규칙의 범위와 겹치는지 확인합니다.
    ///
    /// 규칙에 경계가 없으면 항상 겹칩니다.
    pub fn intersects(&self, min: Option<NaiveDateTime>, max: Option<NaiveDateTime>) -> bool {
        if let (Some(rule_max), Some(file_min)) = (self.max_timestamp, min)
            && file_min > rule_max
        {
            return false;
        }
        if let (Some(rule_min), Some(file_max)) = (self.min_timestamp, max)
            && file_max < rule_min
        {
            return false;
        }
        true
    }

    /// 타임스탬프가 규칙의 시간 범위 안에 있는지 확인합니다.
    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        self.min_timestamp.is_none_or(|min| *ts >= min)
            && self.max_timestamp.is_none_or(|max| *ts <= max)
    }

    /// 시간 범위 경계가 설정되어 있는지 여부
    pub fn has_bounds(&self) -> bool {
        self.min_timestamp.is_some() || self.max_timestamp.is_some()
    }
}

fn default_input_path() -> String {
    ".".to_owned()
}

fn default_true() -> bool {
    true
}

/// 출력 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputsConfig {
    /// 출력 파일 기준 디렉토리
    pub directory: String,
    /// 필터링된 로그 싱크 (이름 -> 설정)
    pub logs: BTreeMap<String, LogOutputConfig>,
    /// 시계열 싱크 (이름 -> 설정)
    pub timelogs: BTreeMap<String, TimeLogConfig>,
    /// 노드별 카운터 싱크 (이름 -> 설정)
    pub counters: BTreeMap<String, CounterConfig>,
    /// 요청 추적 리포트 설정 (없으면 추적만 하고 리포트하지 않음)
    pub requests: Option<RequestsConfig>,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            directory: ".".to_owned(),
            logs: BTreeMap::new(),
            timelogs: BTreeMap::new(),
            counters: BTreeMap::new(),
            requests: None,
        }
    }
}

/// 필터링된 로그 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogOutputConfig {
    /// 출력 파일명 템플릿 (예: `"{node}.log"`)
    pub filename: String,
    /// 라인 템플릿
    pub pattern: String,
}

/// 시계열 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeLogConfig {
    /// 출력 CSV 파일명
    pub filename: String,
    /// 버킷 폭 (초)
    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    10
}

/// 카운터 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterConfig {
    /// 노드별 출력 템플릿. 자리표시자는 카운터 이름 (`{node}`는 노드명)
    pub format: String,
}

/// 요청 추적 리포트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsConfig {
    /// 요청별 CSV 파일명 (선택)
    #[serde(default)]
    pub filename: Option<String>,
    /// 지연 요청 목록 출력 여부
    #[serde(default)]
    pub report_lags: bool,
    /// 지연으로 간주할 time-to-order 임계값 (초)
    #[serde(default = "default_lag_threshold")]
    pub lag_threshold_secs: u64,
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            filename: None,
            report_lags: false,
            lag_threshold_secs: default_lag_threshold(),
        }
    }
}

fn default_lag_threshold() -> u64 {
    60
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}
