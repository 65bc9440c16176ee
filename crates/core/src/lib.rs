//! logsift 공통 크레이트
//!
//! 처리 엔진과 CLI가 공유하는 메시지 모델, 설정 문서, 에러 타입,
//! 메트릭 이름을 정의합니다.
//!
//! - [`types`]: 로그 메시지와 다중값 속성 맵
//! - [`config`]: YAML 설정 문서와 깊은 병합, 환경변수 오버라이드
//! - [`error`]: 도메인별 에러
//! - [`metrics`]: 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, LogsiftError, ParseError, PipelineError};

// 설정
pub use config::LogsiftConfig;

// 도메인 타입
pub use types::{Attributes, Level, Message};
