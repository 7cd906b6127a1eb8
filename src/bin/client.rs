//! VStream 클라이언트 - QUIC 미디어 스트리밍 클라이언트
//!
//! 서버 메뉴에서 항목을 골라 수신한 미디어를 플레이어(ffplay) 또는 파일로 넘긴다.
//! 업로드 모드에서는 로컬 파일을 VIDEO PDU로 서버에 보낸다.
//!
//! 사용법:
//!   cargo run --release --bin vstream-client -- [OPTIONS]
//!
//! 예시:
//!   # 메뉴를 보고 선택, ffplay로 재생
//!   cargo run --release --bin vstream-client -- --server localhost --port 4242
//!
//!   # 2번 항목을 파일로 저장
//!   cargo run --release --bin vstream-client -- --choice 2 --output boat.mp4

use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vstream::{Client, ClientConfig, ClientMode, Error};

const USAGE: &str = r#"VStream Client - QUIC 미디어 스트리밍 클라이언트

사용법:
  cargo run --release --bin vstream-client -- [OPTIONS]

옵션:
  -s, --server <HOST>     서버 주소 (기본: localhost)
  -p, --port <PORT>       서버 포트 (기본: 4242)
  --server-name <NAME>    TLS 서버 이름 (기본: localhost)
  --cert <PATH>           신뢰할 서버 인증서 PEM (없으면 검증 생략)
  -c, --choice <N>        메뉴 선택 (없으면 입력 대기)
  -o, --output <PATH>     플레이어 대신 파일로 저장
  --player <CMD>          플레이어 명령 (기본: "ffplay -f mp4 -i pipe:")
  --upload <PATH>         파일 업로드 모드
  --chunk-size <SIZE>     업로드 PDU 페이로드 크기 (기본/최대: 1024)
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

fn parse_args() -> Result<ClientConfig, Error> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--server" | "-s" => {
                config.server_addr = next_value(&args, &mut i, flag)?.to_string();
            }
            "--port" | "-p" => {
                config.port = next_value(&args, &mut i, flag)?
                    .parse()
                    .map_err(|e| Error::Config(format!("유효한 포트 필요: {}", e)))?;
            }
            "--server-name" => {
                config.server_name = next_value(&args, &mut i, flag)?.to_string();
            }
            "--cert" => {
                config.ca_cert = Some(PathBuf::from(next_value(&args, &mut i, flag)?));
            }
            "--choice" | "-c" => {
                let value = next_value(&args, &mut i, flag)?;
                config.choice = value.bytes().next();
            }
            "--output" | "-o" => {
                config.output = Some(PathBuf::from(next_value(&args, &mut i, flag)?));
            }
            "--player" => {
                config.player = next_value(&args, &mut i, flag)?
                    .split_whitespace()
                    .map(|s| s.to_string())
                    .collect();
            }
            "--upload" => {
                config.mode = ClientMode::Upload {
                    file: PathBuf::from(next_value(&args, &mut i, flag)?),
                };
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

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = parse_args()?;

    info!("VStream Client starting...");
    info!("Server address: {}:{}", config.server_addr, config.port);

    let client = Client::new(config)?;
    match client.run().await {
        Ok(stats) => {
            info!("Transfer complete!");
            info!("  {}", stats.summary());
            Ok(())
        }
        Err(e) => {
            error!("Client failed: {}", e);
            Err(e.into())
        }
    }
}
