//! 클라이언트 드라이버
//!
//! 연결 하나, 스트림 하나를 열고 핸드쉐이크 후
//! - 다운로드: 수신한 PDU 페이로드를 도착 순서대로 싱크에 전달
//! - 업로드: 로컬 파일을 VIDEO PDU로 나눠 전송
//!
//! 유실 데이터 재요청은 하지 않는다. 신뢰성은 전부 QUIC 스트림에 맡긴다.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use quinn::{Connection, Endpoint};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, trace, warn};

use crate::catalog::{Request, Selection};
use crate::config::{ClientConfig, ClientMode};
use crate::pdu::{unframe, write_frame, Pdu, PduType};
use crate::session::read_chunk;
use crate::sink::{FileSink, PayloadSink, PlayerSink};
use crate::stats::TransferStats;
use crate::{tls, Error, Result, HANDSHAKE_BUFFER_SIZE, MAX_PDU_SIZE, PROTOCOL_VERSION};

/// 클라이언트 측 스트림 세션
pub struct ClientSession<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> ClientSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// 인사 버퍼 전송
    pub async fn greet(&mut self, greeting: &[u8]) -> Result<()> {
        let greeting = &greeting[..greeting.len().min(HANDSHAKE_BUFFER_SIZE)];
        if greeting.is_empty() {
            return Err(Error::Config("인사 메시지가 비어 있음".to_string()));
        }
        self.writer
            .write_all(greeting)
            .await
            .map_err(Error::transport)?;
        self.writer.flush().await.map_err(Error::transport)
    }

    /// 서버 메뉴 수신
    pub async fn read_menu(&mut self) -> Result<String> {
        let mut menu = vec![0u8; HANDSHAKE_BUFFER_SIZE];
        let n = self
            .reader
            .read(&mut menu)
            .await
            .map_err(Error::transport)?;
        if n == 0 {
            return Err(Error::UnexpectedEof("서버 메뉴"));
        }
        Ok(String::from_utf8_lossy(&menu[..n]).into_owned())
    }

    /// 요청 전송
    pub async fn send_request(&mut self, request: Request) -> Result<()> {
        self.send_choice(request.as_byte()).await
    }

    /// 선택 바이트를 그대로 전송 (해석은 서버 몫)
    pub async fn send_choice(&mut self, choice: u8) -> Result<()> {
        self.writer
            .write_all(&[choice])
            .await
            .map_err(Error::transport)?;
        self.writer.flush().await.map_err(Error::transport)
    }

    /// 인사 → 메뉴 → 선택을 한 번에 수행. `choose`는 메뉴를 보고 요청을 고른다.
    pub async fn handshake<F>(&mut self, greeting: &[u8], choose: F) -> Result<Request>
    where
        F: FnOnce(&str) -> Request,
    {
        self.greet(greeting).await?;
        let menu = self.read_menu().await?;
        debug!("[cli] menu: {}", menu);
        let request = choose(&menu);
        self.send_request(request).await?;
        Ok(request)
    }

    /// 스트림 끝까지 PDU를 받아 싱크에 전달
    ///
    /// 정상 종료 시와 실패 시 모두 싱크를 닫는다. 실패 시에는 원래 에러를 돌려준다.
    pub async fn receive_into<S: PayloadSink>(mut self, sink: &mut S) -> Result<TransferStats> {
        let mut stats = TransferStats::new();
        let result = self.receive_loop(sink, &mut stats).await;

        if let Err(e) = self.writer.shutdown().await {
            debug!("[cli] stream close: {}", e);
        }
        match result {
            Ok(()) => {
                sink.close().await?;
                stats.finish();
                info!("[cli] stream complete: {}", stats.summary());
                Ok(stats)
            }
            Err(e) => {
                if let Err(close_err) = sink.close().await {
                    warn!("[cli] sink close after failure: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn receive_loop<S: PayloadSink>(
        &mut self,
        sink: &mut S,
        stats: &mut TransferStats,
    ) -> Result<()> {
        while let Some(pdu) = unframe(&mut self.reader).await? {
            if pdu.mtype != PduType::Data {
                return Err(Error::MessageTypeMismatch {
                    expected: PduType::Data.to_string(),
                    got: pdu.mtype.to_string(),
                });
            }
            debug!(
                "[cli] received {} bytes (Packet Number: {})",
                pdu.data.len(),
                pdu.packet_no
            );
            trace!("[cli] pdu: {}", pdu.to_pretty_json());
            stats.record_received(pdu.packet_no, pdu.data.len());
            sink.write_payload(&pdu.data).await?;
        }
        Ok(())
    }

    /// 소스를 VIDEO PDU로 나눠 전송
    ///
    /// 전송 후 쓰기 방향을 닫고, 서버가 스트림을 닫을 때까지 기다린다.
    pub async fn upload_from<Src>(mut self, source: &mut Src, chunk_size: usize) -> Result<TransferStats>
    where
        Src: AsyncRead + Unpin + ?Sized,
    {
        let mut stats = TransferStats::new();
        let mut buffer = vec![0u8; chunk_size.clamp(1, MAX_PDU_SIZE)];
        let mut packet_no = 1u32;

        loop {
            let n = read_chunk(source, &mut buffer).await?;
            if n == 0 {
                break;
            }
            let pdu = Pdu::video(packet_no, Bytes::copy_from_slice(&buffer[..n]));
            let written = write_frame(&mut self.writer, &pdu).await?;
            stats.record_sent(packet_no, n, written);
            packet_no += 1;
        }
        self.writer.shutdown().await.map_err(Error::transport)?;

        // 서버가 업로드를 저장하고 스트림을 닫으면 EOF
        let mut trailer = Vec::new();
        self.reader
            .read_to_end(&mut trailer)
            .await
            .map_err(Error::transport)?;

        stats.finish();
        info!("[cli] upload complete: {}", stats.summary());
        Ok(stats)
    }
}

/// 운영자 입력에서 선택 바이트 하나를 읽는다 (첫 번째 공백 아닌 문자)
///
/// 입력이 비어 있으면 기본 항목을 고른다. 바이트 해석은 서버가 한다.
pub async fn prompt_choice<R>(input: R) -> Result<u8>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    let line = lines.next_line().await?.unwrap_or_default();
    Ok(line
        .trim()
        .bytes()
        .next()
        .unwrap_or_else(|| Selection::default().as_byte()))
}

/// QUIC 클라이언트
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 서버에 연결
    pub async fn connect(&self) -> Result<(Endpoint, Connection)> {
        let remote = self.config.remote_addr()?;
        self.connect_to(remote).await
    }

    /// 지정한 주소로 연결
    pub async fn connect_to(&self, remote: SocketAddr) -> Result<(Endpoint, Connection)> {
        let bind = if remote.is_ipv6() {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        };
        let endpoint = Endpoint::client(bind)
            .map_err(|e| Error::Transport(format!("클라이언트 엔드포인트 생성 실패: {}", e)))?;

        let client_config = tls::client_config(self.config.ca_cert.as_deref())?;
        let connection = endpoint
            .connect_with(client_config, remote, &self.config.server_name)?
            .await?;
        info!("[cli] connected to {}", connection.remote_address());
        Ok((endpoint, connection))
    }

    /// 설정된 모드로 한 번 실행
    pub async fn run(&self) -> Result<TransferStats> {
        let (endpoint, connection) = self.connect().await?;
        let result = self.run_on(&connection).await;

        connection.close(0u32.into(), b"done");
        endpoint.wait_idle().await;
        result
    }

    /// 열린 연결에서 스트림 하나로 세션 실행
    pub async fn run_on(&self, connection: &Connection) -> Result<TransferStats> {
        let (send, recv) = connection.open_bi().await?;
        let mut session = ClientSession::new(recv, send);
        let greeting = format!("VSTREAM/{} hello", PROTOCOL_VERSION);

        match &self.config.mode {
            ClientMode::Download => {
                session.greet(greeting.as_bytes()).await?;
                let menu = session.read_menu().await?;
                let mut choice = match self.config.choice {
                    Some(byte) => byte,
                    None => {
                        println!("{}", menu);
                        prompt_choice(tokio::io::stdin()).await?
                    }
                };
                if choice == crate::catalog::UPLOAD_REQUEST {
                    choice = Selection::default().as_byte();
                }
                session.send_choice(choice).await?;
                info!("[cli] sent choice {:?}", choice as char);

                match &self.config.output {
                    Some(path) => {
                        let mut sink = FileSink::create(path).await?;
                        session.receive_into(&mut sink).await
                    }
                    None => {
                        let mut sink = PlayerSink::spawn(self.config.player.as_slice())?;
                        session.receive_into(&mut sink).await
                    }
                }
            }
            ClientMode::Upload { file } => {
                let mut source = tokio::fs::File::open(file)
                    .await
                    .map_err(|e| Error::resource(file, e))?;
                session
                    .handshake(greeting.as_bytes(), |_| Request::Upload)
                    .await?;
                info!("[cli] uploading {:?}", file);
                session
                    .upload_from(&mut source, self.config.chunk_size)
                    .await
            }
        }
    }
}
