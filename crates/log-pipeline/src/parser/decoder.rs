//! 파일 단위 메시지 디코더
//!
//! 한 입력 파일의 라인을 순서대로 받아 처리 가능한 [`Message`]를 내보냅니다.
//! 타임스탬프 없는 라인은 입력 규칙에 따라 다음 중 하나로 처리됩니다.
//!
//! - `only_timestamped`: 버림
//! - 직전 타임스탬프가 있으면: 그 타임스탬프를 상속
//! - `buffer_untimestamped`: 첫 타임스탬프가 나올 때까지 보관 후 그 시각으로 표시
//! - 그 외: 타임스탬프 없이 그대로 내보냄

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use logsift_core::config::InputLogRule;
use logsift_core::types::{Message, format_timestamp};

use super::line::LineParser;

/// 디코딩 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// 입력된 물리 라인 수
    pub lines: u64,
    /// 내보낸 메시지 수
    pub emitted: u64,
    /// 타임스탬프가 없어 버려진 라인 수
    pub discarded: u64,
    /// 직전보다 이른 타임스탬프를 가진 라인 수
    pub backward: u64,
}

/// 파일 단위 메시지 디코더
pub struct MessageDecoder<'a> {
    parser: &'a LineParser,
    node: String,
    only_timestamped: bool,
    buffer_untimestamped: bool,
    last_timestamp: Option<NaiveDateTime>,
    pending: Vec<Message>,
    min_seen: Option<NaiveDateTime>,
    max_seen: Option<NaiveDateTime>,
    stats: DecodeStats,
}

impl<'a> MessageDecoder<'a> {
    /// 입력 규칙에 맞는 디코더를 생성합니다.
    pub fn new(parser: &'a LineParser, node: impl Into<String>, rule: &InputLogRule) -> Self {
        Self {
            parser,
            node: node.into(),
            only_timestamped: rule.only_timestamped,
            buffer_untimestamped: rule.buffer_untimestamped,
            last_timestamp: None,
            pending: Vec::new(),
            min_seen: None,
            max_seen: None,
            stats: DecodeStats::default(),
        }
    }

    /// 한 줄을 디코딩하여 준비된 메시지를 `out`에 추가합니다.
    pub fn push_line(&mut self, line: &str, out: &mut Vec<Message>) {
        self.stats.lines += 1;
        if line.trim().is_empty() {
            return;
        }

        let mut message = self.parser.parse(line, &self.node);
        match message.timestamp {
            Some(ts) => {
                self.observe(ts);
                if !self.pending.is_empty() {
                    debug!(
                        node = %self.node,
                        count = self.pending.len(),
                        timestamp = %format_timestamp(&ts),
                        "stamping buffered lines with first timestamp"
                    );
                    for mut buffered in self.pending.drain(..) {
                        buffered.timestamp = Some(ts);
                        out.push(buffered);
                        self.stats.emitted += 1;
                    }
                }
                out.push(message);
                self.stats.emitted += 1;
            }
            None if self.only_timestamped => {
                self.stats.discarded += 1;
            }
            None => match self.last_timestamp {
                Some(ts) => {
                    message.timestamp = Some(ts);
                    out.push(message);
                    self.stats.emitted += 1;
                }
                None if self.buffer_untimestamped => self.pending.push(message),
                None => {
                    out.push(message);
                    self.stats.emitted += 1;
                }
            },
        }
    }

    /// 파일 끝에서 호출합니다. 타임스탬프를 받지 못한 보관 라인은 버려집니다.
    pub fn finish(&mut self) -> DecodeStats {
        if !self.pending.is_empty() {
            warn!(
                node = %self.node,
                count = self.pending.len(),
                "buffered lines never received a timestamp, dropping"
            );
            self.stats.discarded += self.pending.len() as u64;
            self.pending.clear();
        }
        if self.stats.backward > 0 {
            warn!(
                node = %self.node,
                count = self.stats.backward,
                "timestamps went backwards in input file"
            );
        }
        self.stats
    }

    /// 지금까지 관찰한 타임스탬프 범위 `(min, max)`
    pub fn observed_range(&self) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        (self.min_seen, self.max_seen)
    }

    fn observe(&mut self, ts: NaiveDateTime) {
        if let Some(last) = self.last_timestamp
            && ts < last
        {
            if self.stats.backward == 0 {
                warn!(
                    node = %self.node,
                    previous = %format_timestamp(&last),
                    current = %format_timestamp(&ts),
                    "timestamp went backwards"
                );
            }
            self.stats.backward += 1;
        }
        self.last_timestamp = Some(ts);
        self.min_seen = Some(self.min_seen.map_or(ts, |min| min.min(ts)));
        self.max_seen = Some(self.max_seen.map_or(ts, |max| max.max(ts)));
    }
}
