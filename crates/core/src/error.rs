//! 에러 타입: 도메인별 에러 정의

/// logsift 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogsiftError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 로그 라인 / 타임스탬프 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 처리 엔진 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 타임스탬프 형식 불일치
    #[error("invalid timestamp '{input}': expected YYYY-MM-DD HH:MM:SS,mmm")]
    Timestamp { input: String },

    /// 알 수 없는 심각도 토큰
    #[error("unknown level '{0}'")]
    Level(String),
}

/// 처리 엔진 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 규칙/매처 컴파일 실패
    #[error("compile failed: {0}")]
    Compile(String),

    /// 실행 중 에러
    #[error("run failed: {0}")]
    Run(String),
}
