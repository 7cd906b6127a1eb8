//! # VStream (Video Stream Protocol)
//!
//! QUIC 위에서 동작하는 시퀀스 번호 기반 길이 프레이밍 미디어 스트리밍 프로토콜
//!
//! ## 핵심 특징
//! - **PDU 프레이밍**: `[4바이트 빅엔디언 길이][JSON PDU]` 단위로 전송
//! - **핸드쉐이크**: 인사 → 메뉴 → 1바이트 선택 → 스트리밍
//! - **시퀀스 번호**: 스트리밍 단계마다 1부터 단조 증가 (관측용)
//! - **동시성**: 연결당 태스크 하나, 스트림당 태스크 하나
//! - **신뢰성 위임**: 재전송/순서 보장은 QUIC 스트림이 담당

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod pdu;
pub mod registry;
pub mod server;
pub mod session;
pub mod sink;
pub mod stats;
pub mod tls;

pub use catalog::{Catalog, Request, Selection};
pub use client::Client;
pub use config::{ClientConfig, ClientMode, ServerConfig, TlsSource};
pub use error::{Error, Result};
pub use pdu::{Pdu, PduType};
pub use registry::{ClientId, ClientRegistry};
pub use server::{Server, ShutdownHandle};
pub use sink::{FileSink, PayloadSink, PlayerSink, WriterSink};
pub use stats::{SequenceTracker, TransferStats};

/// 프로토콜 버전
pub const PROTOCOL_VERSION: u8 = 1;

/// PDU 페이로드 최대 크기 (바이트)
pub const MAX_PDU_SIZE: usize = 1024;

/// 직렬화된 PDU 프레임 최대 크기 (바이트)
///
/// base64 + JSON 오버헤드를 감안해도 `MAX_PDU_SIZE`보다 한참 크다.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// 핸드쉐이크 버퍼 최대 크기 (인사, 메뉴)
pub const HANDSHAKE_BUFFER_SIZE: usize = 1024;

/// QUIC ALPN 식별자
pub const ALPN_PROTOCOL: &[u8] = b"vstream/1";

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 4242;
