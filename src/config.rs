//! 서버/클라이언트 설정

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use crate::{Error, Result, DEFAULT_PORT, MAX_PDU_SIZE};

/// 서버 TLS 인증서 출처
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsSource {
    /// 실행 시 자체 서명 인증서 생성
    Generate,

    /// PEM 인증서 체인 + 개인키 파일
    Files { cert: PathBuf, key: PathBuf },
}

/// 서버 설정
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 바인드 주소
    pub address: String,

    /// 바인드 포트
    pub port: u16,

    /// TLS 인증서 출처
    pub tls: TlsSource,

    /// 카탈로그 파일 디렉터리
    pub catalog_dir: PathBuf,

    /// 업로드 저장 디렉터리
    pub upload_dir: PathBuf,

    /// 파일 읽기 청크 크기 (바이트, 최대 `MAX_PDU_SIZE`)
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: DEFAULT_PORT,
            tls: TlsSource::Generate,
            catalog_dir: PathBuf::from("."),
            upload_dir: PathBuf::from("uploads"),
            chunk_size: MAX_PDU_SIZE,
        }
    }
}

impl ServerConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        validate_chunk_size(self.chunk_size)?;
        if let TlsSource::Files { cert, key } = &self.tls {
            if cert.as_os_str().is_empty() || key.as_os_str().is_empty() {
                return Err(Error::Config(
                    "인증서와 키 파일 경로가 모두 필요함".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// 바인드 주소 해석
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        resolve(&self.address, self.port)
    }
}

/// 클라이언트 동작 모드
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMode {
    /// 서버 카탈로그를 받아 싱크로 전달
    Download,

    /// 로컬 파일을 서버로 업로드
    Upload { file: PathBuf },
}

/// 클라이언트 설정
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// 서버 주소
    pub server_addr: String,

    /// 서버 포트
    pub port: u16,

    /// TLS 서버 이름 (SNI)
    pub server_name: String,

    /// 신뢰할 인증서 PEM (없으면 검증 생략)
    pub ca_cert: Option<PathBuf>,

    /// 미리 정한 선택 바이트 (없으면 운영자 입력)
    pub choice: Option<u8>,

    /// 동작 모드
    pub mode: ClientMode,

    /// 수신 데이터 저장 경로 (지정 시 플레이어 대신 파일로)
    pub output: Option<PathBuf>,

    /// 플레이어 명령
    pub player: Vec<String>,

    /// 업로드 청크 크기 (바이트, 최대 `MAX_PDU_SIZE`)
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "localhost".to_string(),
            port: DEFAULT_PORT,
            server_name: "localhost".to_string(),
            ca_cert: None,
            choice: None,
            mode: ClientMode::Download,
            output: None,
            player: crate::sink::DEFAULT_PLAYER
                .iter()
                .map(|s| s.to_string())
                .collect(),
            chunk_size: MAX_PDU_SIZE,
        }
    }
}

impl ClientConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        validate_chunk_size(self.chunk_size)?;
        if self.player.is_empty() && self.output.is_none() {
            return Err(Error::Config("플레이어 명령 또는 출력 파일 필요".to_string()));
        }
        Ok(())
    }

    /// 서버 주소 해석
    pub fn remote_addr(&self) -> Result<SocketAddr> {
        resolve(&self.server_addr, self.port)
    }
}

fn validate_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 || chunk_size > MAX_PDU_SIZE {
        return Err(Error::Config(format!(
            "청크 크기는 1..={} 범위여야 함: {}",
            MAX_PDU_SIZE, chunk_size
        )));
    }
    Ok(())
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Config(format!("{}:{} 주소 해석 실패: {}", host, port, e)))?
        .next()
        .ok_or_else(|| Error::Config(format!("{}:{} 주소 없음", host, port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ServerConfig::default().validate().is_ok());
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn test_chunk_size_bounds() {
        let mut config = ServerConfig::new();
        config.chunk_size = 0;
        assert!(config.validate().is_err());

        config.chunk_size = MAX_PDU_SIZE + 1;
        assert!(config.validate().is_err());

        config.chunk_size = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_tls_files() {
        let mut config = ServerConfig::new();
        config.tls = TlsSource::Files {
            cert: PathBuf::from("cert.pem"),
            key: PathBuf::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_numeric() {
        let mut config = ClientConfig::new();
        config.server_addr = "127.0.0.1".to_string();
        config.port = 9000;

        assert_eq!(
            config.remote_addr().unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
    }
}
