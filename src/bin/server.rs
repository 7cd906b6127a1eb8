//! VStream 서버 - QUIC 미디어 스트리밍 서버
//!
//! 카탈로그의 미디어 파일을 길이 프레이밍된 PDU로 스트리밍한다.
//! - 클라이언트마다 단조 증가 ID 발급
//! - 연결/스트림마다 독립 태스크
//!
//! 사용법:
//!   cargo run --release --bin vstream-server -- [OPTIONS]
//!
//! 예시:
//!   # 자체 서명 인증서로 실행
//!   cargo run --release --bin vstream-server -- --gen-tls --catalog ./media
//!
//!   # 인증서 파일 지정
//!   cargo run --release --bin vstream-server -- --cert certs/server.crt --key certs/server.key

use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vstream::{Error, Server, ServerConfig, TlsSource};

const USAGE: &str = r#"VStream Server - QUIC 미디어 스트리밍 서버

사용법:
  cargo run --release --bin vstream-server -- [OPTIONS]

옵션:
  -a, --address <HOST>    바인드 주소 (기본: localhost)
  -p, --port <PORT>       바인드 포트 (기본: 4242)
  -g, --gen-tls           자체 서명 인증서 생성 (기본)
  --cert <PATH>           PEM 인증서 체인
  --key <PATH>            PEM 개인키
  -c, --catalog <DIR>     미디어 파일 디렉터리 (기본: .)
  -u, --uploads <DIR>     업로드 저장 디렉터리 (기본: uploads)
  --chunk-size <SIZE>     PDU 페이로드 크기 바이트 (기본/최대: 1024)
  -h, --help              이 도움말 출력

환경 변수:
  RUST_LOG                로그 필터 (기본: info)
"#;

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, Error> {
    *i += 1;
    args.get(*i)
        .map(|s| s.as_str())
        .ok_or_else(|| Error::Config(format!("{} 값 필요", flag)))
}

fn parse_args() -> Result<ServerConfig, Error> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();
    let mut cert: Option<PathBuf> = None;
    let mut key: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--address" | "-a" => {
                config.address = next_value(&args, &mut i, flag)?.to_string();
            }
            "--port" | "-p" => {
                config.port = next_value(&args, &mut i, flag)?
                    .parse()
                    .map_err(|e| Error::Config(format!("유효한 포트 필요: {}", e)))?;
            }
            "--gen-tls" | "-g" => {
                config.tls = TlsSource::Generate;
            }
            "--cert" => {
                cert = Some(PathBuf::from(next_value(&args, &mut i, flag)?));
            }
            "--key" => {
                key = Some(PathBuf::from(next_value(&args, &mut i, flag)?));
            }
            "--catalog" | "-c" => {
                config.catalog_dir = PathBuf::from(next_value(&args, &mut i, flag)?);
            }
            "--uploads" | "-u" => {
                config.upload_dir = PathBuf::from(next_value(&args, &mut i, flag)?);
            }
            "--chunk-size" => {
                config.chunk_size = next_value(&args, &mut i, flag)?
                    .parse()
                    .map_err(|e| Error::Config(format!("유효한 숫자 필요: {}", e)))?;
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => {
                return Err(Error::Config(format!("알 수 없는 옵션: {}", other)));
            }
        }
        i += 1;
    }

    match (cert, key) {
        (Some(cert), Some(key)) => config.tls = TlsSource::Files { cert, key },
        (None, None) => {}
        _ => return Err(Error::Config("--cert와 --key는 함께 지정해야 함".to_string())),
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = parse_args()?;

    info!("VStream Server starting...");
    info!("Bind address: {}:{}", config.address, config.port);
    info!("Catalog directory: {:?}", config.catalog_dir);
    info!("Upload directory: {:?}", config.upload_dir);
    info!("Chunk size: {} bytes", config.chunk_size);

    let server = Server::new(config)?;

    // Ctrl-C → 수락 루프 종료
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            shutdown.shutdown();
        }
    });

    if let Err(e) = server.run().await {
        error!("Server failed: {}", e);
        return Err(e.into());
    }

    info!("Server stopped");
    Ok(())
}
