//! 증분 처리 캐시
//!
//! 입력 파일마다 마지막 실행에서 관찰한 최소/최대 타임스탬프를 JSON 파일로
//! 저장합니다. 다음 실행에서 입력 규칙의 시간 범위와 겹치지 않는 파일은
//! 읽지 않고 건너뜁니다.
//!
//! 캐시 파일 이름은 입력 경로를 파일시스템 안전 문자로 인코딩한 것입니다.
//! 파일 하나의 캐시는 그 파일을 처리하는 작업만 읽고 쓰므로 잠금이 필요 없습니다.
//! 작업은 `spawn_blocking` 안에서 실행되므로 동기 I/O를 사용합니다.

use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use logsift_core::types::opt_timestamp;

use crate::error::LogPipelineError;

/// 입력 파일 하나의 캐시 레코드
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLogCache {
    /// 관찰한 가장 이른 타임스탬프
    #[serde(default, with = "opt_timestamp")]
    pub min_timestamp: Option<NaiveDateTime>,
    /// 관찰한 가장 늦은 타임스탬프
    #[serde(default, with = "opt_timestamp")]
    pub max_timestamp: Option<NaiveDateTime>,
}

/// 캐시 파일 저장소
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// 캐시 디렉토리로 저장소를 생성합니다. 디렉토리는 첫 저장 시 만들어집니다.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// 입력 파일의 캐시 파일 경로
    pub fn path_for(&self, input: &Path) -> PathBuf {
        let name = encode_filename(&input.to_string_lossy());
        self.dir.join(format!("{name}.json"))
    }

    /// 캐시 레코드를 읽습니다. 캐시 파일이 없으면 `None`.
    pub fn load(&self, input: &Path) -> Result<Option<InputLogCache>, LogPipelineError> {
        let path = self.path_for(input);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_error(&path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| cache_error(&path, e))
    }

    /// 캐시 레코드를 저장합니다.
    pub fn store(&self, input: &Path, record: &InputLogCache) -> Result<(), LogPipelineError> {
        let path = self.path_for(input);
        fs::create_dir_all(&self.dir).map_err(|e| cache_error(&self.dir, e))?;
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json).map_err(|e| cache_error(&path, e))
    }
}

fn cache_error(path: &Path, err: impl std::fmt::Display) -> LogPipelineError {
    LogPipelineError::Cache {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// 경로를 파일 이름으로 쓸 수 있게 인코딩합니다.
///
/// ASCII 영숫자, `-`, `.`는 그대로 두고 나머지 바이트는 `_XX` (16진수)로 바꿉니다.
/// 서로 다른 경로는 서로 다른 이름이 됩니다.
pub fn encode_filename(path: &str) -> String {
    let mut out = String::with_capacity(path.len() * 2);
    for byte in path.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "_{byte:02X}");
        }
    }
    out
}
