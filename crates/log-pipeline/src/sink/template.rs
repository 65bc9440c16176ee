//! 출력 템플릿 -- `{name}` 자리표시자 치환
//!
//! `{{`와 `}}`는 중괄호 문자 자체를 뜻합니다.
//! 템플릿은 설정 로딩 시 한 번 컴파일됩니다.

use logsift_core::types::{Message, format_timestamp};

use crate::error::LogPipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// 컴파일된 출력 템플릿
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// 템플릿 문자열을 컴파일합니다.
    pub fn compile(source: &str) -> Result<Self, LogPipelineError> {
        let error = |reason: &str| LogPipelineError::Template {
            template: source.to_owned(),
            reason: reason.to_owned(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => return Err(error("nested '{' in placeholder")),
                            Some(c) => name.push(c),
                            None => return Err(error("unclosed placeholder")),
                        }
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(error("empty placeholder"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name.to_owned()));
                }
                '}' => return Err(error("unmatched '}'")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_owned(),
            segments,
        })
    }

    /// 원본 템플릿 문자열
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 템플릿이 참조하는 자리표시자 이름
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// 자리표시자마다 `resolve`를 호출하여 템플릿을 렌더링합니다.
    pub fn render_with<F>(&self, mut resolve: F) -> String
    where
        F: FnMut(&str, &mut String),
    {
        let mut out = String::with_capacity(self.source.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => resolve(name, &mut out),
            }
        }
        out
    }

    /// 메시지 필드로 템플릿을 렌더링합니다.
    ///
    /// 내장 필드 (`timestamp`, `level`, `source`, `func`, `node`, `replica`, `body`)
    /// 외의 이름은 속성 값으로 치환되며, 값이 여러 개면 쉼표로 연결합니다.
    /// 없는 값은 빈 문자열이 됩니다.
    pub fn render_message(&self, msg: &Message) -> String {
        self.render_with(|name, out| match name {
            "timestamp" => {
                if let Some(ts) = &msg.timestamp {
                    out.push_str(&format_timestamp(ts));
                }
            }
            "level" => out.push_str(msg.level.as_deref().unwrap_or_default()),
            "source" => out.push_str(msg.source.as_deref().unwrap_or_default()),
            "func" => out.push_str(msg.func.as_deref().unwrap_or_default()),
            "node" => out.push_str(&msg.node),
            "replica" => {
                if let Some(replica) = msg.replica {
                    out.push_str(&replica.to_string());
                }
            }
            "body" => out.push_str(&msg.body),
            attr => {
                if let Some(values) = msg.attrs.values(attr) {
                    let joined: Vec<&str> = values.iter().map(String::as_str).collect();
                    out.push_str(&joined.join(","));
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsift_core::types::parse_timestamp;

    #[test]
    fn compile_and_render_fields() {
        let t = Template::compile("{node}-{replica}.log").unwrap();
        let msg = Message::new("x", "Node1").with_replica(1);
        assert_eq!(t.render_message(&msg), "Node1-1.log");
        assert_eq!(t.fields().collect::<Vec<_>>(), vec!["node", "replica"]);
    }

    #[test]
    fn missing_values_render_empty() {
        let t = Template::compile("[{level}|{func}|{replica}|{timestamp}]").unwrap();
        let msg = Message::new("x", "Node1");
        assert_eq!(t.render_message(&msg), "[|||]");
    }

    #[test]
    fn attributes_render_joined() {
        let t = Template::compile("{reqId} {flag}").unwrap();
        let mut msg = Message::new("x", "Node1");
        msg.set_attribute("reqId", Some("C1:2".to_owned()));
        msg.set_attribute("reqId", Some("C1:1".to_owned()));
        msg.set_attribute("flag", None);
        assert_eq!(t.render_message(&msg), "C1:1,C1:2 ");
    }

    #[test]
    fn escaped_braces() {
        let t = Template::compile("{{{node}}}").unwrap();
        assert_eq!(t.render_message(&Message::new("x", "N")), "{N}");
    }

    #[test]
    fn timestamp_renders_in_log_format() {
        let t = Template::compile("{timestamp}").unwrap();
        let ts = parse_timestamp("2018-01-29 10:15:03,007").unwrap();
        let msg = Message::new("x", "N").with_timestamp(ts);
        assert_eq!(t.render_message(&msg), "2018-01-29 10:15:03,007");
    }

    #[test]
    fn render_with_custom_resolver() {
        let t = Template::compile("{node}: {ok}/{fail}").unwrap();
        let rendered = t.render_with(|name, out| match name {
            "node" => out.push_str("Node1"),
            "ok" => out.push('3'),
            _ => out.push('0'),
        });
        assert_eq!(rendered, "Node1: 3/0");
    }

    #[test]
    fn malformed_templates_fail() {
        for source in ["{node", "node}", "{}", "{a{b}}"] {
            assert!(Template::compile(source).is_err(), "should fail: {source}");
        }
    }
}
