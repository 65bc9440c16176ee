//! 노드 로그 라인 파서
//!
//! # 라인 형식
//! ```text
//! TIMESTAMP | LEVEL | SOURCE | FUNC | BODY
//! 2018-01-29 10:15:03,123 | INFO | node.py | processRequest | REPLICA:(Node1:0) received ...
//! ```
//!
//! 필드가 다섯 개 미만이거나 첫 필드가 타임스탬프가 아니면
//! 타임스탬프 없는 연속 라인으로 취급합니다.

use regex::Regex;

use logsift_core::types::{Message, parse_timestamp};

use crate::error::LogPipelineError;

/// 본문 앞의 레플리카 접두사: `REPLICA:(Node1:0) `
const REPLICA_PREFIX: &str = r"^REPLICA:\((\w+):(\d+)\)\s*";

/// 라인 파서
///
/// 한 줄을 [`Message`]로 변환합니다. 파싱에 실패하는 경우는 없으며,
/// 형식이 맞지 않는 라인은 본문만 가진 메시지가 됩니다.
pub struct LineParser {
    replica_prefix: Regex,
}

impl LineParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Result<Self, LogPipelineError> {
        Ok(Self {
            replica_prefix: Regex::new(REPLICA_PREFIX)?,
        })
    }

    /// 한 줄을 파싱합니다.
    pub fn parse(&self, line: &str, node: &str) -> Message {
        let line = line.trim_end_matches(['\r', '\n']);

        let fields: Vec<&str> = line.splitn(5, '|').collect();
        if fields.len() != 5 {
            return Message::new(line, node);
        }

        let Ok(timestamp) = parse_timestamp(fields[0]) else {
            return Message::new(line, node);
        };

        let mut message = Message::new(fields[4].trim(), node).with_timestamp(timestamp);
        message.level = non_empty(fields[1]);
        message.source = non_empty(fields[2]);
        message.func = non_empty(fields[3]);

        if let Some(caps) = self.replica_prefix.captures(&message.body) {
            let prefix_len = caps.get(0).map_or(0, |m| m.end());
            message.replica = caps.get(2).and_then(|m| m.as_str().parse().ok());
            message.body = message.body[prefix_len..].to_owned();
        }

        message
    }
}

fn non_empty(field: &str) -> Option<String> {
    let field = field.trim();
    (!field.is_empty()).then(|| field.to_owned())
}
