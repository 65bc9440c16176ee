//! logsift 로그 분석 엔진
//!
//! 여러 노드의 로그 파일을 한 번 읽어 규칙 체인으로 이벤트를 추출하고,
//! 필터링된 로그, 시계열, 카운터, 요청 지연 통계로 집계합니다.
//!
//! # 모듈 구성
//!
//! - [`collector`]: 입력 파일 탐색과 압축 해제 읽기
//! - [`parser`]: 라인 파서와 파일 단위 메시지 디코더
//! - [`rule`]: 매처 엔진과 규칙 체인 엔진
//! - [`correlator`]: 요청 식별자 추출과 요청 생명주기 추적
//! - [`sink`]: 집계 싱크와 병합
//! - [`cache`]: 파일별 타임스탬프 범위 캐시
//! - [`pipeline`]: 파일별 병렬 처리와 결과 병합
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! discover -> cache check -> decode -> entry chain -> sinks -> merge -> dump
//!                                          |
//!                              matchers / correlator
//! ```

pub mod cache;
pub mod collector;
pub mod correlator;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod rule;
pub mod sink;

// --- 주요 타입 re-export ---

// 실행기
pub use pipeline::LogJob;

// 에러
pub use error::LogPipelineError;

// 입력
pub use cache::{CacheStore, InputLogCache};
pub use collector::{InputFile, discover};
pub use parser::{LineParser, MessageDecoder};

// 규칙 엔진
pub use correlator::RequestCorrelator;
pub use rule::{Action, ChainSet, Matcher};

// 싱크
pub use sink::{OutputData, OutputLayout, RequestId, RequestTracker};
