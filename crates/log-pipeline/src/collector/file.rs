//! 입력 파일 열기와 라인 읽기
//!
//! `.gz` 파일은 gzip 해제 후 읽습니다. 여러 멤버로 이어 붙인 gzip도 지원합니다.
//! `.xz` 파일은 xz 해제 후 읽습니다. 여러 스트림으로 이어 붙인 xz도 지원합니다.
//! UTF-8이 아닌 바이트는 대체 문자로 바꿔 읽습니다.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use xz2::read::XzDecoder;

use crate::error::LogPipelineError;

/// 로그 파일을 라인 단위로 읽을 수 있게 엽니다.
pub fn open_log(path: &Path) -> Result<Box<dyn BufRead + Send>, LogPipelineError> {
    let input_error = |reason: String| LogPipelineError::Input {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| input_error(e.to_string()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => Ok(Box::new(BufReader::new(MultiGzDecoder::new(file)))),
        Some("xz") => Ok(Box::new(BufReader::new(XzDecoder::new_multi_decoder(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

/// 리더의 각 라인에 대해 `f`를 호출하고 읽은 라인 수를 반환합니다.
///
/// 라인 끝의 `\n`과 `\r\n`은 제거됩니다.
pub fn for_each_line<R, F>(mut reader: R, mut f: F) -> io::Result<u64>
where
    R: BufRead,
    F: FnMut(&str),
{
    let mut buf = Vec::with_capacity(256);
    let mut count = 0u64;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(count);
        }
        let mut line = buf.as_slice();
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest;
        }
        if let Some(rest) = line.strip_suffix(b"\r") {
            line = rest;
        }
        f(&String::from_utf8_lossy(line));
        count += 1;
    }
}
