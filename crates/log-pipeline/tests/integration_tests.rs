//! 통합 테스트 -- 파일 탐색부터 집계 결과 기록까지의 전체 흐름 검증

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;

use logsift_core::config::LogsiftConfig;
use logsift_core::types::parse_timestamp;
use logsift_log_pipeline::{CacheStore, LineParser, LogJob, OutputData, RequestId};

const NODE1: &str = "\
2018-01-29 10:00:00,000 | INFO | node.py | start | REPLICA:(Node1:0) starting
2018-01-29 10:00:01,000 | DEBUG | node.py | noise | chatter
2018-01-29 10:00:02,000 | INFO | node.py | handle | Node1 received client request: {'identifier': 'C1', 'reqId': 7, 'operation': {}}
2018-01-29 10:00:05,500 | INFO | replica.py | order | REPLICA:(Node1:0) Node1:0 ordered batch request, view no 0, ppSeqNo 1, ledger 1, state root x, txn root y, requests ordered [('C1', 7)], discarded []
2018-01-29 10:00:12,000 | ERROR | node.py | check | something failed
";

const NODE2: &str = "\
2018-01-29 10:00:03,000 | ERROR | node.py | check | disk full
    continuation of the error above
2018-01-29 10:00:04,000 | ERROR | node.py | check | disk still full
";

const ROUND_TRIP: &str = "{timestamp} | {level} | {source} | {func} | REPLICA:({node}:{replica}) {body}";

fn config(dir: &Path, extra_input: &str) -> LogsiftConfig {
    let yaml = format!(
        r#"
general:
  workers: 2
cache:
  dir: "{cache}"
input_logs:
  - path: "{logs}"
    pattern: '^(?P<node>Node\d+)\.log(\.gz)?$'
{extra_input}
chains:
  main:
    - match all and drop:
        level: DEBUG
    - track_requests
    - log line: all
    - log count: {{summary: lines}}
    - errors
  errors:
    - match any or return:
        level: ERROR
    - log time: {{errors: error}}
    - log count: {{summary: errors}}
outputs:
  directory: "{out}"
  logs:
    all: {{filename: "{{node}}.filtered.log", pattern: "{ROUND_TRIP}"}}
  timelogs:
    errors: {{filename: errors.csv, interval: 10}}
  counters:
    summary: {{format: "{{node}}: {{lines}} lines, {{errors}} errors"}}
  requests:
    filename: requests.csv
"#,
        cache = dir.join("cache").display(),
        logs = dir.join("logs").display(),
        out = dir.join("out").display(),
    );
    let config = LogsiftConfig::parse(&yaml).unwrap();
    config.validate().unwrap();
    config
}

fn write_inputs(dir: &Path) {
    let logs = dir.join("logs");
    fs::create_dir_all(&logs).unwrap();
    fs::write(logs.join("Node1.log"), NODE1).unwrap();

    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(NODE2.as_bytes()).unwrap();
    fs::write(logs.join("Node2.log.gz"), enc.finish().unwrap()).unwrap();
}

fn job(dir: &Path, extra_input: &str) -> Arc<LogJob> {
    Arc::new(LogJob::compile(Arc::new(config(dir, extra_input))).unwrap())
}

/// 병합 결과를 순서 비교가 가능한 형태로 렌더링합니다.
fn render(data: &OutputData) -> Vec<String> {
    let mut out = Vec::new();
    for (file, lines) in data.log("all").unwrap().sorted_files() {
        out.push(file.to_owned());
        out.extend(lines.into_iter().map(str::to_owned));
    }
    out.push(data.timelog("errors").unwrap().render_csv());
    out.extend(data.counter("summary").unwrap().render());
    out.push(data.requests().render_csv());
    out
}

#[tokio::test]
async fn end_to_end_run_and_dump() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let job = job(dir.path(), "    only_timestamped: false");

    let data = Arc::clone(&job).execute().await.unwrap();

    // 카운터: DEBUG는 drop. 심각도가 없는 연속 라인은 레벨 매처를 통과하므로
    // DEBUG drop 규칙에도 걸립니다
    let summary = data.counter("summary").unwrap();
    assert_eq!(summary.get("Node1", "lines"), 4);
    assert_eq!(summary.get("Node1", "errors"), 1);
    assert_eq!(summary.get("Node2", "lines"), 2);
    assert_eq!(summary.get("Node2", "errors"), 2);

    // 시계열: 10초 버킷
    let errors = data.timelog("errors").unwrap();
    let bucket = |s: &str| parse_timestamp(s).unwrap();
    assert_eq!(errors.count(bucket("2018-01-29 10:00:00,000"), "Node2", "error"), 2);
    assert_eq!(errors.count(bucket("2018-01-29 10:00:10,000"), "Node1", "error"), 1);

    // 요청 생명주기
    let request = data
        .requests()
        .get("Node1", &RequestId::new("C1", 7))
        .unwrap();
    assert_eq!(
        request.time_to_order(),
        Some(chrono::Duration::milliseconds(3500))
    );

    let mut console = Vec::new();
    job.dump(&data, &mut console).unwrap();
    let console = String::from_utf8(console).unwrap();
    assert!(console.contains("Node1: 4 lines, 1 errors"));
    assert!(console.contains("Node2: 2 lines, 2 errors"));
    assert!(console.contains(
        "Node1: received 1, ordered 1, time to order min/avg/max: 3.500/3.500/3.500 s"
    ));

    let out = dir.path().join("out");
    let csv = fs::read_to_string(out.join("errors.csv")).unwrap();
    assert_eq!(
        csv,
        "timestamp,Node1.error,Node2.error\n\
         \"2018-01-29 10:00:00,000\",0,2\n\
         \"2018-01-29 10:00:10,000\",1,0\n"
    );
    assert!(
        fs::read_to_string(out.join("requests.csv"))
            .unwrap()
            .contains("Node1,C1:7,")
    );
    let node1 = fs::read_to_string(out.join("Node1.filtered.log")).unwrap();
    assert_eq!(node1.lines().count(), 4);
}

#[tokio::test]
async fn result_is_independent_of_file_order() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());
    let job = job(dir.path(), "    only_timestamped: false");

    let files = job.discover().unwrap();
    let mut reversed = files.clone();
    reversed.reverse();

    let forward = Arc::clone(&job).run(files).await;
    let backward = Arc::clone(&job).run(reversed).await;
    assert_eq!(render(&forward), render(&backward));
}

#[tokio::test]
async fn rerun_skips_files_outside_window() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());

    // 첫 실행은 캐시를 채웁니다
    let first = job(dir.path(), "");
    Arc::clone(&first).execute().await.unwrap();

    // 모든 파일이 창보다 늦으므로 두 번째 실행은 아무것도 읽지 않습니다
    let second = job(
        dir.path(),
        "    max_timestamp: \"2018-01-29 09:00:00,000\"",
    );
    fs::write(
        dir.path().join("logs/Node1.log"),
        "2018-01-29 08:30:00,000 | ERROR | node.py | check | early\n",
    )
    .unwrap();
    let data = Arc::clone(&second).execute().await.unwrap();
    assert_eq!(data.counter("summary").unwrap().get("Node1", "errors"), 0);
    assert_eq!(data.counter("summary").unwrap().get("Node2", "errors"), 0);
}

#[tokio::test]
async fn truncated_gzip_keeps_lines_read_before_failure() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    fs::create_dir_all(&logs).unwrap();
    fs::write(logs.join("Node1.log"), NODE1).unwrap();

    // 첫 멤버는 온전하고 두 번째 멤버는 헤더 직후에서 잘립니다
    let mut bytes = Vec::new();
    let mut complete = GzEncoder::new(Vec::new(), Compression::default());
    complete
        .write_all(
            b"2018-01-29 10:00:20,000 | ERROR | node.py | check | first\n\
              2018-01-29 10:00:21,000 | ERROR | node.py | check | second\n",
        )
        .unwrap();
    bytes.extend(complete.finish().unwrap());
    let mut cut = GzEncoder::new(Vec::new(), Compression::default());
    cut.write_all(
        b"2018-01-29 10:00:22,000 | ERROR | node.py | check | lost\n\
          2018-01-29 10:00:23,000 | ERROR | node.py | check | lost too\n",
    )
    .unwrap();
    let cut = cut.finish().unwrap();
    bytes.extend_from_slice(&cut[..14]);
    fs::write(logs.join("Node3.log.gz"), bytes).unwrap();

    let job = job(dir.path(), "");
    let data = Arc::clone(&job).execute().await.unwrap();

    // 잘린 파일은 실패 전까지 읽은 라인만 남기고, 다른 파일은 그대로 병합됩니다
    let summary = data.counter("summary").unwrap();
    assert_eq!(summary.get("Node3", "lines"), 2);
    assert_eq!(summary.get("Node3", "errors"), 2);
    assert_eq!(summary.get("Node1", "lines"), 4);
    assert_eq!(summary.get("Node1", "errors"), 1);

    // 캐시에는 실패 전까지 관측한 범위가 기록됩니다
    let cache = CacheStore::new(dir.path().join("cache"));
    let record = cache.load(&logs.join("Node3.log.gz")).unwrap().unwrap();
    assert_eq!(
        record.min_timestamp,
        Some(parse_timestamp("2018-01-29 10:00:20,000").unwrap())
    );
    assert_eq!(
        record.max_timestamp,
        Some(parse_timestamp("2018-01-29 10:00:21,000").unwrap())
    );
}

#[tokio::test]
async fn filtered_log_lines_reparse_to_same_fields() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    fs::create_dir_all(&logs).unwrap();
    let original = "\
2018-01-29 10:00:00,000 | INFO | node.py | start | REPLICA:(Node7:0) starting up
2018-01-29 10:00:01,250 | WARNING | replica.py | view_change | REPLICA:(Node7:3) view change to 2
";
    fs::write(logs.join("Node7.log"), original).unwrap();

    let job = job(dir.path(), "");
    let data = Arc::clone(&job).execute().await.unwrap();
    let files = data.log("all").unwrap().sorted_files();
    let rendered = &files["Node7.filtered.log"];

    let parser = LineParser::new().unwrap();
    for (line, source) in rendered.iter().zip(original.lines()) {
        let reparsed = parser.parse(line, "Node7");
        let expected = parser.parse(source, "Node7");
        assert_eq!(reparsed.timestamp, expected.timestamp);
        assert_eq!(reparsed.replica, expected.replica);
        assert_eq!(reparsed.level, expected.level);
        assert_eq!(reparsed.source, expected.source);
        assert_eq!(reparsed.func, expected.func);
        assert_eq!(reparsed.body, expected.body);
        assert_eq!(reparsed.node, expected.node);
    }
    assert_eq!(rendered.len(), 2);
}

#[test]
fn cycle_in_chains_fails_compilation() {
    let yaml = r#"
input_logs:
  - pattern: '.*'
chains:
  main:
    - helper
  helper:
    - main
"#;
    let config = LogsiftConfig::parse(yaml).unwrap();
    assert!(LogJob::compile(Arc::new(config)).is_err());
}
