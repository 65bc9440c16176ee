//! 규칙 & 체인 엔진 -- YAML 규칙 체인 컴파일 및 메시지 처리
//!
//! 설정의 `chains` 섹션을 [`ChainSet`]으로 컴파일합니다. 매처, 정규식, 싱크와
//! 체인 참조는 모두 컴파일 시 해석되므로 처리 중에는 이름으로 찾지 않습니다.
//!
//! # 처리 규칙
//! - 규칙은 선언 순서대로 실행됩니다.
//! - `return`을 내는 규칙은 현재 체인만 끝냅니다.
//! - `drop`은 중첩 체인을 포함한 전체 호출 스택에서 메시지 처리를 중단합니다.
//! - 체인 호출 순환은 컴파일 시 거부됩니다.
//!
//! # 아키텍처
//! - [`ChainSet`]: 컴파일된 체인 모음과 실행기
//! - [`matcher`]: 매처 스펙 컴파일 및 판정
//! - [`types`]: 규칙 데이터 구조와 규칙 스펙 컴파일

pub mod matcher;
pub mod types;

pub use matcher::{Matcher, MatcherCompiler, ReplicaRole};
pub use types::{Action, ChainId, MatchMode, MatchOp, MatchRule, Rule, TagRule, TagValue};

use std::collections::HashMap;

use tracing::debug;

use logsift_core::config::LogsiftConfig;
use logsift_core::types::Message;

use crate::correlator::RequestCorrelator;
use crate::error::LogPipelineError;
use crate::sink::{OutputData, OutputLayout};
use types::RuleCompiler;

/// 컴파일된 체인
#[derive(Debug, Clone)]
pub struct Chain {
    pub name: String,
    pub rules: Vec<Rule>,
}

/// 컴파일된 체인 모음
///
/// 한 번 컴파일되면 불변이며, 병렬 작업 사이에서 `Arc`로 공유됩니다.
pub struct ChainSet {
    chains: Vec<Chain>,
    index: HashMap<String, ChainId>,
    correlator: RequestCorrelator,
}

impl ChainSet {
    /// 설정의 체인과 명명된 매처를 컴파일합니다.
    ///
    /// 싱크 참조는 `layout`에서 해석합니다.
    pub fn compile(
        config: &LogsiftConfig,
        layout: &OutputLayout,
    ) -> Result<Self, LogPipelineError> {
        let index: HashMap<String, ChainId> = config
            .chains
            .keys()
            .enumerate()
            .map(|(i, name)| (name.clone(), ChainId(i)))
            .collect();

        let mut compiler = RuleCompiler {
            matchers: MatcherCompiler::new(&config.matchers),
            layout,
            chains: &index,
        };

        let mut chains = Vec::with_capacity(config.chains.len());
        for (name, specs) in &config.chains {
            let rules = specs
                .iter()
                .enumerate()
                .map(|(i, spec)| compiler.compile(spec, name, i))
                .collect::<Result<Vec<_>, _>>()?;
            chains.push(Chain {
                name: name.clone(),
                rules,
            });
        }

        check_cycles(&chains)?;

        debug!(
            chains = chains.len(),
            rules = chains.iter().map(|c| c.rules.len()).sum::<usize>(),
            "rule chains compiled"
        );

        Ok(Self {
            chains,
            index,
            correlator: RequestCorrelator::new()?,
        })
    }

    /// 이름으로 체인 위치를 찾습니다.
    pub fn chain_id(&self, name: &str) -> Result<ChainId, LogPipelineError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| LogPipelineError::UnknownChain(name.to_owned()))
    }

    /// 체인 수
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// 이름으로 체인을 찾아 메시지를 처리합니다.
    pub fn process(
        &self,
        chain: &str,
        msg: &mut Message,
        output: &mut OutputData,
    ) -> Result<Option<Action>, LogPipelineError> {
        let id = self.chain_id(chain)?;
        Ok(self.run(id, msg, output))
    }

    /// 체인으로 메시지를 처리합니다.
    ///
    /// `Some(Action::Drop)`이면 메시지는 더 이상 처리되지 않아야 합니다.
    pub fn run(&self, id: ChainId, msg: &mut Message, output: &mut OutputData) -> Option<Action> {
        let chain = &self.chains[id.0];
        for rule in &chain.rules {
            if let Some(action) = self.apply(rule, msg, output) {
                return Some(action);
            }
        }
        None
    }

    fn apply(&self, rule: &Rule, msg: &mut Message, output: &mut OutputData) -> Option<Action> {
        match rule {
            Rule::Match(rule) => rule.fires(msg).then_some(rule.action),
            Rule::TimeShift(shifts) => {
                if let Some(shift) = shifts.get(&msg.node)
                    && let Some(ts) = msg.timestamp
                {
                    match ts.checked_add_signed(*shift) {
                        Some(shifted) => msg.timestamp = Some(shifted),
                        None => {
                            debug!(node = %msg.node, "timeshift overflows timestamp, left unchanged");
                        }
                    }
                }
                None
            }
            Rule::Tag(tag) => {
                tag.apply(msg);
                None
            }
            Rule::LogTime(targets) => {
                for (sink, graph) in targets {
                    if let Some(timelog) = output.timelog_mut(*sink) {
                        timelog.add(msg, graph);
                    }
                }
                None
            }
            Rule::LogLine(targets) => {
                for sink in targets {
                    if let Some(log) = output.log_mut(*sink) {
                        log.add(msg);
                    }
                }
                None
            }
            Rule::LogCount(targets) => {
                for (sink, counter) in targets {
                    if let Some(counters) = output.counter_mut(*sink) {
                        counters.add(&msg.node, counter);
                    }
                }
                None
            }
            Rule::TrackRequests => {
                self.correlator.process(msg, output.requests_mut());
                None
            }
            Rule::Chain(id) => match self.run(*id, msg, output) {
                Some(Action::Drop) => Some(Action::Drop),
                _ => None,
            },
        }
    }
}

/// 체인 호출 그래프에서 순환을 찾습니다.
fn check_cycles(chains: &[Chain]) -> Result<(), LogPipelineError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Active,
        Done,
    }

    fn visit(
        chains: &[Chain],
        node: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Result<(), LogPipelineError> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::Active => {
                let start = path.iter().position(|&n| n == node).unwrap_or(0);
                let mut names: Vec<&str> = path[start..]
                    .iter()
                    .map(|&n| chains[n].name.as_str())
                    .collect();
                names.push(chains[node].name.as_str());
                return Err(LogPipelineError::ChainCycle(names.join(" -> ")));
            }
            Mark::Unvisited => {}
        }

        marks[node] = Mark::Active;
        path.push(node);
        for rule in &chains[node].rules {
            if let Rule::Chain(callee) = rule {
                visit(chains, callee.0, marks, path)?;
            }
        }
        path.pop();
        marks[node] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; chains.len()];
    let mut path = Vec::new();
    for node in 0..chains.len() {
        visit(chains, node, &mut marks, &mut path)?;
    }
    Ok(())
}
