//! 에러 타입 정의
//!
//! 스트림 종료(EOF)는 에러가 아니다. `pdu::unframe`은 정상 종료를 `Ok(None)`으로
//! 돌려주고, 여기 정의된 변형들은 모두 실패만 나타낸다.

use std::path::PathBuf;

use thiserror::Error;

/// VStream 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    /// QUIC 스트림 수락/열기/읽기/쓰기 실패
    #[error("전송 에러: {0}")]
    Transport(String),

    #[error("연결 에러: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("연결 시도 실패: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("TLS 설정 에러: {0}")]
    Tls(String),

    #[error("PDU 인코딩 에러: {0}")]
    Encoding(String),

    #[error("PDU 디코딩 에러: {0}")]
    Decoding(String),

    #[error("페이로드 크기 초과: {size} bytes (최대 {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("길이 필드 불일치: declared {declared}, actual {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("프레임 크기 초과: {size} bytes (최대 {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 로컬 파일/싱크를 열거나 만들 수 없음
    #[error("리소스 에러: {path:?}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("예기치 않은 스트림 종료: {0}")]
    UnexpectedEof(&'static str),

    #[error("메시지 타입 불일치: expected {expected}, got {got}")]
    MessageTypeMismatch { expected: String, got: String },

    #[error("싱크 에러: {0}")]
    Sink(String),

    #[error("설정 에러: {0}")]
    Config(String),
}

impl Error {
    /// 로컬 리소스 에러 생성
    pub fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Resource {
            path: path.into(),
            source,
        }
    }

    /// 스트림 I/O 실패를 전송 에러로 변환
    pub fn transport(e: impl std::fmt::Display) -> Self {
        Error::Transport(e.to_string())
    }

    /// 피어 또는 전송 계층에서 발생한 에러인지 여부
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Connection(_) | Error::Connect(_) | Error::UnexpectedEof(_)
        )
    }
}

impl From<quinn::WriteError> for Error {
    fn from(e: quinn::WriteError) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<quinn::ReadError> for Error {
    fn from(e: quinn::ReadError) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<quinn::ClosedStream> for Error {
    fn from(e: quinn::ClosedStream) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Error::Tls(e.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
