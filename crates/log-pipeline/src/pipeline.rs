//! 병렬 실행기 -- 입력 파일별 처리와 결과 병합을 관리합니다.
//!
//! [`LogJob`]은 설정을 한 번 컴파일한 뒤 `Arc`로 공유되며, 입력 파일마다
//! 독립된 [`OutputData`]를 만들어 처리합니다. 모든 파일 처리가 끝나면
//! 부분 결과를 병합합니다. 병합은 순서와 무관하므로 완료 순서대로 합칩니다.
//!
//! # 내부 아키텍처
//! ```text
//! discover -> [Semaphore(workers)] -> spawn_blocking(process_file) -> merge -> dump
//!                                          |
//!                        cache check -> decode -> entry chain -> sinks -> cache store
//! ```

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use logsift_core::config::{InputLogRule, LogsiftConfig};
use logsift_core::metrics as m;

use crate::cache::{CacheStore, InputLogCache};
use crate::collector::{self, InputFile, for_each_line, open_log};
use crate::error::LogPipelineError;
use crate::parser::{LineParser, MessageDecoder};
use crate::rule::{Action, ChainId, ChainSet};
use crate::sink::{OutputData, OutputLayout};

/// 컴파일된 배치 작업
///
/// # 사용 예시
/// ```ignore
/// use std::sync::Arc;
/// use logsift_log_pipeline::LogJob;
///
/// let job = Arc::new(LogJob::compile(Arc::new(config))?);
/// let data = Arc::clone(&job).execute().await?;
/// job.dump(&data, &mut std::io::stdout())?;
/// ```
pub struct LogJob {
    config: Arc<LogsiftConfig>,
    layout: OutputLayout,
    chains: ChainSet,
    entry: ChainId,
    parser: LineParser,
    cache: Option<CacheStore>,
}

/// 파일 하나의 처리 결과 분류 (메트릭 레이블)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Processed,
    Skipped,
    Failed,
}

impl FileOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl LogJob {
    /// 설정의 출력, 체인, 캐시를 컴파일합니다.
    ///
    /// 설정 에러는 여기서 모두 드러나며, 파일은 하나도 읽지 않습니다.
    pub fn compile(config: Arc<LogsiftConfig>) -> Result<Self, LogPipelineError> {
        let layout = OutputLayout::compile(&config.outputs)?;
        let chains = ChainSet::compile(&config, &layout)?;
        let entry = chains.chain_id(&config.general.entry_chain)?;
        let cache = config
            .cache
            .enabled
            .then(|| CacheStore::new(&config.cache.dir));

        info!(
            chains = chains.len(),
            entry = %config.general.entry_chain,
            cache = cache.is_some(),
            "log job compiled"
        );

        Ok(Self {
            layout,
            chains,
            entry,
            parser: LineParser::new()?,
            cache,
            config,
        })
    }

    /// 출력 구성
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// 컴파일된 체인
    pub fn chains(&self) -> &ChainSet {
        &self.chains
    }

    /// 입력 규칙에 맞는 파일을 찾습니다.
    pub fn discover(&self) -> Result<Vec<InputFile>, LogPipelineError> {
        collector::discover(&self.config.input_logs)
    }

    /// 입력 파일을 찾아 모두 처리하고 병합된 결과를 반환합니다.
    pub async fn execute(self: Arc<Self>) -> Result<OutputData, LogPipelineError> {
        let job = Arc::clone(&self);
        let files = tokio::task::spawn_blocking(move || job.discover())
            .await
            .map_err(|e| LogPipelineError::Input {
                path: "<discovery>".to_owned(),
                reason: format!("spawn_blocking failed: {e}"),
            })??;

        info!(files = files.len(), "input files discovered");
        Ok(self.run(files).await)
    }

    /// 파일들을 병렬로 처리하고 결과를 병합합니다.
    ///
    /// 동시에 처리하는 파일 수는 `general.workers`로 제한됩니다.
    /// 패닉한 작업의 파일은 결과에 기여하지 않습니다.
    pub async fn run(self: Arc<Self>, files: Vec<InputFile>) -> OutputData {
        let started = Instant::now();
        let file_count = files.len();
        let semaphore = Arc::new(Semaphore::new(self.config.general.workers.max(1)));
        let mut tasks = JoinSet::new();

        for file in files {
            let job = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let path = file.path.clone();
                let result = tokio::task::spawn_blocking(move || job.process_file(&file)).await;
                (path, result)
            });
        }

        let mut total = self.layout.new_data();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(data))) => total.merge(data),
                Ok((path, Err(e))) => {
                    warn!(path = %path.display(), error = %e, "file task failed");
                    counter!(m::FILES_TOTAL, m::LABEL_RESULT => FileOutcome::Failed.label())
                        .increment(1);
                }
                Err(e) => warn!(error = %e, "file task join failed"),
            }
        }

        info!(
            files = file_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "all input files processed"
        );
        total
    }

    /// 파일 하나를 처리하여 부분 결과를 반환합니다.
    ///
    /// 블로킹 I/O를 수행하므로 `spawn_blocking` 안에서 호출해야 합니다.
    /// 읽기 에러가 나면 경고를 남기고 그때까지의 결과를 반환하며, 캐시는 갱신하지 않습니다.
    pub fn process_file(&self, input: &InputFile) -> OutputData {
        let started = Instant::now();
        let mut data = self.layout.new_data();

        let Some(rule) = self.config.input_logs.get(input.rule) else {
            warn!(path = %input.path.display(), rule = input.rule, "input rule out of range");
            return data;
        };

        let outcome = if self.cached_out_of_range(input, rule) {
            debug!(path = %input.path.display(), "file outside time window, skipping");
            FileOutcome::Skipped
        } else {
            self.read_file(input, rule, &mut data)
        };

        counter!(m::FILES_TOTAL, m::LABEL_RESULT => outcome.label()).increment(1);
        histogram!(m::FILE_PROCESSING_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        data
    }

    /// 최종 결과를 출력 디렉토리와 `console`에 기록합니다.
    pub fn dump(&self, data: &OutputData, console: &mut dyn Write) -> Result<(), LogPipelineError> {
        self.layout.dump(data, console)
    }

    /// 캐시된 시간 범위가 규칙 범위와 겹치지 않는지 확인합니다.
    fn cached_out_of_range(&self, input: &InputFile, rule: &InputLogRule) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        if !rule.has_bounds() {
            return false;
        }
        match cache.load(&input.path) {
            Ok(Some(record)) => !rule.intersects(record.min_timestamp, record.max_timestamp),
            Ok(None) => false,
            Err(e) => {
                warn!(path = %input.path.display(), error = %e, "ignoring unreadable cache entry");
                false
            }
        }
    }

    fn read_file(&self, input: &InputFile, rule: &InputLogRule, data: &mut OutputData) -> FileOutcome {
        let reader = match open_log(&input.path) {
            Ok(reader) => reader,
            Err(e) => {
                warn!(path = %input.path.display(), error = %e, "failed to open input file");
                return FileOutcome::Failed;
            }
        };

        let mut decoder = MessageDecoder::new(&self.parser, &input.node, rule);
        let mut batch = Vec::new();
        let mut processed = 0u64;
        let mut dropped = 0u64;

        let result = for_each_line(reader, |line| {
            decoder.push_line(line, &mut batch);
            for mut msg in batch.drain(..) {
                if let Some(ts) = &msg.timestamp
                    && !rule.contains(ts)
                {
                    continue;
                }
                processed += 1;
                if self.chains.run(self.entry, &mut msg, data) == Some(Action::Drop) {
                    dropped += 1;
                }
            }
        });

        let stats = decoder.finish();
        counter!(m::LINES_READ_TOTAL).increment(stats.lines);
        counter!(m::MESSAGES_PROCESSED_TOTAL).increment(processed);
        counter!(m::MESSAGES_DROPPED_TOTAL).increment(dropped);

        let outcome = match result {
            Ok(_) => {
                debug!(
                    path = %input.path.display(),
                    node = %input.node,
                    lines = stats.lines,
                    messages = processed,
                    dropped,
                    discarded = stats.discarded,
                    "input file processed"
                );
                FileOutcome::Processed
            }
            Err(e) => {
                warn!(
                    path = %input.path.display(),
                    error = %e,
                    lines = stats.lines,
                    "input file read failed, keeping partial result"
                );
                FileOutcome::Failed
            }
        };

        // 읽기 도중 실패해도 지금까지 관측한 범위를 기록합니다
        if let Some(cache) = &self.cache {
            let (min_timestamp, max_timestamp) = decoder.observed_range();
            let record = InputLogCache {
                min_timestamp,
                max_timestamp,
            };
            if let Err(e) = cache.store(&input.path, &record) {
                warn!(path = %input.path.display(), error = %e, "failed to store cache entry");
            }
        }
        outcome
    }
}
