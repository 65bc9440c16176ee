//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 규칙 컴파일, 입력 탐색, 캐시, 싱크 출력 등
//! 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<LogPipelineError> for LogsiftError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use logsift_core::error::{LogsiftError, PipelineError};

/// 로그 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 매처 스펙 컴파일 실패
    #[error("matcher error: {context}: {reason}")]
    MatcherCompile {
        /// 매처가 선언된 위치 (체인/규칙/매처 이름)
        context: String,
        /// 실패 사유
        reason: String,
    },

    /// 규칙 스펙 컴파일 실패
    #[error("rule error: chain '{chain}' rule #{index}: {reason}")]
    RuleCompile {
        /// 규칙이 속한 체인
        chain: String,
        /// 체인 내 규칙 위치 (0부터)
        index: usize,
        /// 실패 사유
        reason: String,
    },

    /// 체인 호출 순환
    #[error("chain cycle detected: {0}")]
    ChainCycle(String),

    /// 존재하지 않는 체인
    #[error("unknown chain: {0}")]
    UnknownChain(String),

    /// 존재하지 않는 출력 싱크
    #[error("unknown {kind} output '{name}'")]
    UnknownSink {
        /// 싱크 종류 (logs, timelogs, counters)
        kind: &'static str,
        /// 싱크 이름
        name: String,
    },

    /// 템플릿 문법 오류
    #[error("template error in '{template}': {reason}")]
    Template {
        /// 원본 템플릿
        template: String,
        /// 오류 사유
        reason: String,
    },

    /// 캐시 읽기/쓰기 실패
    #[error("cache error: {path}: {reason}")]
    Cache {
        /// 캐시 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 입력 파일 탐색/읽기 실패
    #[error("input error: {path}: {reason}")]
    Input {
        /// 입력 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// YAML 값 변환 에러
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON 직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LogPipelineError> for LogsiftError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Io(e) => LogsiftError::Io(e),
            LogPipelineError::MatcherCompile { .. }
            | LogPipelineError::RuleCompile { .. }
            | LogPipelineError::ChainCycle(_)
            | LogPipelineError::UnknownChain(_)
            | LogPipelineError::UnknownSink { .. }
            | LogPipelineError::Template { .. }
            | LogPipelineError::Regex(_) => {
                LogsiftError::Pipeline(PipelineError::Compile(err.to_string()))
            }
            other => LogsiftError::Pipeline(PipelineError::Run(other.to_string())),
        }
    }
}
