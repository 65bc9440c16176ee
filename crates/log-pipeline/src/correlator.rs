//! 요청 상관 분석기
//!
//! 메시지 본문에서 프로토콜 식별자 (요청 ID, 뷰 번호, 시퀀스 번호, 3단계 합의
//! 마커)를 추출하여 속성으로 부착하고, 두 가지 본문 패턴에 대해서는 노드별
//! 요청 수명 주기를 갱신합니다.
//!
//! | 본문 | 속성 | 수명 주기 |
//! |---|---|---|
//! | `received client request ... 'identifier': 'C1', 'reqId': 7` | `reqId`, `action=received` | received |
//! | `... already processed ...` | `action=already_processed` | - |
//! | `ordered batch request ... requests ordered [('C1', 7), ...]` | `reqId`, `action=ordered` | ordered |
//! | `PREPARE(0, 5)` / `COMMIT(0, 5)` / `PREPREPARE(0, 5)` | `phase`, `viewNo`, `ppSeqNo` | - |
//! | `propagating request ('C1', 7)` / `forwarding request ...` | `reqId`, `action` | - |
//!
//! 형식이 잘못된 리터럴 목록은 조용히 무시됩니다.

use regex::Regex;

use logsift_core::types::Message;

use crate::error::LogPipelineError;
use crate::sink::requests::{RequestId, RequestTracker};

/// 요청 ID 속성 이름
pub const ATTR_REQUEST_ID: &str = "reqId";
/// 동작 속성 이름
pub const ATTR_ACTION: &str = "action";
/// 3단계 합의 단계 속성 이름
pub const ATTR_PHASE: &str = "phase";
/// 뷰 번호 속성 이름
pub const ATTR_VIEW_NO: &str = "viewNo";
/// 3단계 합의 시퀀스 번호 속성 이름
pub const ATTR_PP_SEQ_NO: &str = "ppSeqNo";

/// 요청 상관 분석기
///
/// 모든 추출 정규식은 생성 시 한 번 컴파일됩니다.
pub struct RequestCorrelator {
    client_request: Regex,
    request_list: Regex,
    ordered_list: Regex,
    request_pair: Regex,
    three_phase: Regex,
    view_no: Regex,
    pp_seq_no: Regex,
}

impl RequestCorrelator {
    /// 새 분석기를 생성합니다.
    pub fn new() -> Result<Self, LogPipelineError> {
        Ok(Self {
            client_request: Regex::new(
                r#"['"]identifier['"]:\s*['"]([^'"]+)['"],\s*['"]reqId['"]:\s*(\d+)"#,
            )?,
            request_list: Regex::new(r"\[\s*\([^\[\]]*\]")?,
            ordered_list: Regex::new(r"requests ordered (\[[^\[\]]*\])")?,
            request_pair: Regex::new(r#"\(\s*['"]([^'"]+)['"]\s*,\s*(\d+)\s*\)"#)?,
            three_phase: Regex::new(r"\b(PREPREPARE|PREPARE|COMMIT)\((\d+), ?(\d+)\)")?,
            view_no: Regex::new(r"\bviewNo['\x22]?[:=]?\s*(\d+)")?,
            pp_seq_no: Regex::new(r"\bppSeqNo['\x22]?[:=]?\s*(\d+)")?,
        })
    }

    /// 메시지에서 식별자를 추출하여 부착하고 수명 주기를 갱신합니다.
    pub fn process(&self, msg: &mut Message, tracker: &mut RequestTracker) {
        let body = msg.body.as_str();
        let mut attrs: Vec<(&'static str, String)> = Vec::new();
        let mut received: Vec<RequestId> = Vec::new();
        let mut ordered: Vec<RequestId> = Vec::new();

        // 클라이언트 요청 딕셔너리 형식
        for caps in self.client_request.captures_iter(body) {
            if let Ok(seq) = caps[2].parse() {
                received.push(RequestId::new(&caps[1], seq));
            }
        }
        for id in &received {
            attrs.push((ATTR_REQUEST_ID, id.to_string()));
        }

        // 리터럴 목록 [('C1', 7), ...]
        for m in self.request_list.find_iter(body) {
            if let Some(ids) = parse_request_list(m.as_str()) {
                attrs.extend(ids.iter().map(|id| (ATTR_REQUEST_ID, id.to_string())));
            }
        }

        // 3단계 합의 마커
        for caps in self.three_phase.captures_iter(body) {
            attrs.push((ATTR_PHASE, caps[1].to_lowercase()));
            attrs.push((ATTR_VIEW_NO, caps[2].to_owned()));
            attrs.push((ATTR_PP_SEQ_NO, caps[3].to_owned()));
        }
        for caps in self.view_no.captures_iter(body) {
            attrs.push((ATTR_VIEW_NO, caps[1].to_owned()));
        }
        for caps in self.pp_seq_no.captures_iter(body) {
            attrs.push((ATTR_PP_SEQ_NO, caps[1].to_owned()));
        }

        if body.contains("received client request") {
            attrs.push((ATTR_ACTION, "received".to_owned()));
        } else {
            // 수신 기록은 "received client request" 라인에서만 갱신합니다
            received.clear();
        }

        if body.contains("already processed") {
            attrs.push((ATTR_ACTION, "already_processed".to_owned()));
        }

        if body.contains("ordered batch request") {
            attrs.push((ATTR_ACTION, "ordered".to_owned()));
            if let Some(caps) = self.ordered_list.captures(body)
                && let Some(ids) = parse_request_list(&caps[1])
            {
                ordered = ids;
            }
        }

        for (needle, action) in [
            ("propagating request", "propagate"),
            ("forwarding request", "forward"),
        ] {
            if body.contains(needle) {
                attrs.push((ATTR_ACTION, action.to_owned()));
                for caps in self.request_pair.captures_iter(body) {
                    if let Ok(seq) = caps[2].parse::<u64>() {
                        attrs.push((ATTR_REQUEST_ID, RequestId::new(&caps[1], seq).to_string()));
                    }
                }
            }
        }

        for (name, value) in attrs {
            msg.attrs.insert(name, value);
        }

        let Some(at) = msg.timestamp else {
            return;
        };
        for id in received {
            tracker.add_received(&msg.node, id, at);
        }
        for id in ordered {
            tracker.add_ordered(&msg.node, id, at);
        }
    }
}

/// `[('C1', 7), ("C2", 8)]` 형식의 리터럴 목록을 파싱합니다.
///
/// 형식이 맞지 않으면 `None`을 반환합니다.
pub fn parse_request_list(text: &str) -> Option<Vec<RequestId>> {
    let mut cursor = Cursor::new(text);
    let mut ids = Vec::new();

    cursor.expect('[')?;
    if cursor.eat(']') {
        return cursor.at_end().then_some(ids);
    }
    loop {
        cursor.expect('(')?;
        let client = cursor.quoted()?;
        cursor.expect(',')?;
        let seq = cursor.integer()?;
        cursor.eat(',');
        cursor.expect(')')?;
        ids.push(RequestId::new(client, seq));

        if cursor.eat(']') {
            break;
        }
        cursor.expect(',')?;
        if cursor.eat(']') {
            break;
        }
    }
    cursor.at_end().then_some(ids)
}

/// 리터럴 파서 커서. 토큰 사이의 공백은 건너뜁니다.
struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        match self.rest.strip_prefix(c) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn expect(&mut self, c: char) -> Option<()> {
        self.eat(c).then_some(())
    }

    fn quoted(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let rest: &'a str = self.rest;
        let quote = rest.chars().next().filter(|q| *q == '\'' || *q == '"')?;
        let inner = &rest[1..];
        let end = inner.find(quote)?;
        let value = &inner[..end];
        self.rest = &inner[end + 1..];
        Some(value)
    }

    fn integer(&mut self) -> Option<u64> {
        self.skip_ws();
        let end = self
            .rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.rest.len());
        let value = self.rest[..end].parse().ok()?;
        self.rest = &self.rest[end..];
        Some(value)
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.rest.is_empty()
    }
}
