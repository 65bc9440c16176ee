//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 처리 엔진은 이 상수를 사용하여 `metrics::counter!()` 매크로를 호출합니다.
//! 레코더 설치는 바이너리의 선택이며, 설치되지 않으면 호출은 무시됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logsift_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)

use metrics::{describe_counter, describe_histogram};

/// 결과 레이블 키 (processed, skipped, failed)
pub const LABEL_RESULT: &str = "result";

/// 입력 파일 수 (counter, label: result)
pub const FILES_TOTAL: &str = "logsift_files_total";

/// 읽은 물리 라인 수 (counter)
pub const LINES_READ_TOTAL: &str = "logsift_lines_read_total";

/// 체인 처리를 거친 메시지 수 (counter)
pub const MESSAGES_PROCESSED_TOTAL: &str = "logsift_messages_processed_total";

/// `drop` 액션으로 폐기된 메시지 수 (counter)
pub const MESSAGES_DROPPED_TOTAL: &str = "logsift_messages_dropped_total";

/// 파일 하나를 처리하는 데 걸린 시간 (histogram, 초)
pub const FILE_PROCESSING_DURATION_SECONDS: &str = "logsift_file_processing_duration_seconds";

/// 모든 메트릭의 설명을 등록합니다.
pub fn describe_all() {
    describe_counter!(FILES_TOTAL, "Input files handled, labelled by result");
    describe_counter!(LINES_READ_TOTAL, "Physical lines read from input files");
    describe_counter!(
        MESSAGES_PROCESSED_TOTAL,
        "Messages that entered the entry chain"
    );
    describe_counter!(
        MESSAGES_DROPPED_TOTAL,
        "Messages vetoed by a drop action"
    );
    describe_histogram!(
        FILE_PROCESSING_DURATION_SECONDS,
        "Wall time spent processing one input file"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        FILES_TOTAL,
        LINES_READ_TOTAL,
        MESSAGES_PROCESSED_TOTAL,
        MESSAGES_DROPPED_TOTAL,
        FILE_PROCESSING_DURATION_SECONDS,
    ];

    #[test]
    fn all_metrics_start_with_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("logsift_"),
                "Metric '{}' does not start with 'logsift_' prefix",
                name
            );
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더가 없어도 패닉하지 않아야 합니다
        describe_all();
    }
}
