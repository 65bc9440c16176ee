//! 로그 파싱 모듈 -- 라인 파서와 파일 단위 디코더
//!
//! [`LineParser`]는 물리적 한 줄을 [`Message`](logsift_core::types::Message)로 변환하고,
//! [`MessageDecoder`]는 한 파일의 라인 흐름에 타임스탬프 상속, 보관,
//! 역행 감지를 적용합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logsift_log_pipeline::parser::{LineParser, MessageDecoder};
//!
//! let parser = LineParser::new()?;
//! let mut decoder = MessageDecoder::new(&parser, "Node1", &rule);
//! let mut ready = Vec::new();
//! decoder.push_line("2018-01-29 10:15:03,123 | INFO | a.py | f | hello", &mut ready);
//! ```

pub mod decoder;
pub mod line;

pub use decoder::{DecodeStats, MessageDecoder};
pub use line::LineParser;
