//! 스트림 세션 (서버측)
//!
//! 스트림 하나에서 일어나는 교환 전체를 상태 기계로 표현한다.
//!
//! ```text
//! AwaitHandshake --accept_greeting--> MenuSent --read_request--> Streaming --run--> (closed)
//! ```
//!
//! 각 상태는 스트림 양쪽 절반을 소유하고, 전이는 `self`를 소비하므로
//! 잘못된 순서의 호출은 컴파일되지 않는다. `Streaming::run`은 성공/실패와
//! 관계없이 스트림과 파일을 정확히 한 번 닫는다.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Request};
use crate::pdu::{unframe, write_frame, Pdu, PduType};
use crate::registry::ClientId;
use crate::sink::{FileSink, PayloadSink};
use crate::stats::TransferStats;
use crate::{Error, Result, HANDSHAKE_BUFFER_SIZE, MAX_PDU_SIZE};

/// 세션 식별 정보 (읽기 전용)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContext {
    /// 연결의 클라이언트 ID
    pub client_id: ClientId,

    /// 연결 내 스트림 순번
    pub stream_no: u32,

    /// 파일 읽기 청크 크기
    pub chunk_size: usize,
}

impl SessionContext {
    pub fn new(client_id: ClientId, stream_no: u32) -> Self {
        Self {
            client_id,
            stream_no,
            chunk_size: MAX_PDU_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_PDU_SIZE);
        self
    }
}

/// 스트리밍 단계가 사용하는 서버 자원
#[derive(Debug, Clone, Copy)]
pub struct SessionResources<'a> {
    pub catalog: &'a Catalog,
    pub upload_dir: &'a Path,
}

/// 인사 대기 상태
pub struct AwaitHandshake<R, W> {
    reader: R,
    writer: W,
    ctx: SessionContext,
}

/// 메뉴 전송 완료, 선택 바이트 대기 상태
pub struct MenuSent<R, W> {
    reader: R,
    writer: W,
    ctx: SessionContext,
}

/// 선택 완료, 스트리밍 단계
pub struct Streaming<R, W> {
    reader: R,
    writer: W,
    ctx: SessionContext,
    request: Request,
}

impl<R, W> AwaitHandshake<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// 새로 수락한 스트림으로 세션 시작
    pub fn new(reader: R, writer: W, ctx: SessionContext) -> Self {
        Self {
            reader,
            writer,
            ctx,
        }
    }

    /// 인사 버퍼를 읽고 메뉴를 보낸다. 인사 내용은 무엇이든 받아들인다.
    pub async fn accept_greeting(mut self, catalog: &Catalog) -> Result<MenuSent<R, W>> {
        let mut greeting = vec![0u8; HANDSHAKE_BUFFER_SIZE];
        let n = self
            .reader
            .read(&mut greeting)
            .await
            .map_err(Error::transport)?;
        if n == 0 {
            return Err(Error::UnexpectedEof("핸드쉐이크 인사"));
        }
        info!(
            "[server] received initialization message from client {}: {}",
            self.ctx.client_id,
            String::from_utf8_lossy(&greeting[..n])
        );

        let menu = catalog.menu_for(self.ctx.client_id);
        self.writer
            .write_all(menu.as_bytes())
            .await
            .map_err(Error::transport)?;
        self.writer.flush().await.map_err(Error::transport)?;
        debug!("[server] sent menu to client {} ({} bytes)", self.ctx.client_id, menu.len());

        Ok(MenuSent {
            reader: self.reader,
            writer: self.writer,
            ctx: self.ctx,
        })
    }
}

impl<R, W> MenuSent<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// 선택 바이트 하나를 읽어 요청으로 디코딩
    pub async fn read_request(mut self) -> Result<Streaming<R, W>> {
        let mut choice = [0u8; 1];
        self.reader.read_exact(&mut choice).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::UnexpectedEof("메뉴 선택 바이트")
            } else {
                Error::transport(e)
            }
        })?;

        let request = Request::from_byte(choice[0]);
        info!(
            "[server] received choice from client {}: {:?} -> {:?}",
            self.ctx.client_id, choice[0] as char, request
        );

        Ok(Streaming {
            reader: self.reader,
            writer: self.writer,
            ctx: self.ctx,
            request,
        })
    }
}

impl<R, W> Streaming<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn request(&self) -> Request {
        self.request
    }

    /// 스트리밍 단계를 끝까지 실행하고 스트림을 닫는다
    pub async fn run(mut self, resources: SessionResources<'_>) -> Result<TransferStats> {
        let result = match self.request {
            Request::Watch(selection) => {
                let path = resources.catalog.path_for(selection);
                self.send_file(&path).await
            }
            Request::Upload => self.receive_upload(resources.upload_dir).await,
        };

        if let Err(e) = self.writer.shutdown().await {
            debug!("[server] stream close for client {}: {}", self.ctx.client_id, e);
        }
        result
    }

    async fn send_file(&mut self, path: &Path) -> Result<TransferStats> {
        let client_id = self.ctx.client_id;
        let mut file = File::open(path).await.map_err(|e| {
            warn!("[server] error opening video file for client {}: {}", client_id, e);
            Error::resource(path, e)
        })?;

        let mut stats = TransferStats::new();
        let mut buffer = vec![0u8; self.ctx.chunk_size];
        let mut packet_no = 1u32;

        loop {
            let n = read_chunk(&mut file, &mut buffer)
                .await
                .map_err(|e| Error::resource(path, e))?;
            if n == 0 {
                break;
            }

            let pdu = Pdu::data(packet_no, Bytes::copy_from_slice(&buffer[..n]));
            debug!(
                "[server] Sending {} bytes of video data to client {} (Packet Number: {})",
                n, client_id, packet_no
            );

            let written = write_frame(&mut self.writer, &pdu).await?;
            stats.record_sent(packet_no, n, written);
            packet_no += 1;
        }

        stats.finish();
        info!(
            "[server] video {:?} sent successfully to client {}: {}",
            path,
            client_id,
            stats.summary()
        );
        Ok(stats)
    }

    async fn receive_upload(&mut self, upload_dir: &Path) -> Result<TransferStats> {
        let client_id = self.ctx.client_id;
        tokio::fs::create_dir_all(upload_dir)
            .await
            .map_err(|e| Error::resource(upload_dir, e))?;

        let path = upload_path(upload_dir, &self.ctx);
        let mut sink = FileSink::create(&path).await?;
        info!("[server] receiving upload from client {} into {:?}", client_id, path);

        let mut stats = TransferStats::new();
        let received = self.receive_video(&mut sink, &mut stats).await;
        if let Err(e) = received {
            // 중간에 끊긴 업로드는 완료된 파일처럼 남기지 않는다
            if let Err(close_err) = sink.close().await {
                debug!("[server] upload sink close for client {}: {}", client_id, close_err);
            }
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!("[server] failed to remove partial upload {:?}: {}", path, remove_err);
            }
            warn!("[server] upload from client {} aborted: {}", client_id, e);
            return Err(e);
        }
        sink.close().await?;

        stats.finish();
        info!(
            "[server] upload from client {} complete: {}",
            client_id,
            stats.summary()
        );
        Ok(stats)
    }

    async fn receive_video(
        &mut self,
        sink: &mut FileSink,
        stats: &mut TransferStats,
    ) -> Result<()> {
        while let Some(pdu) = unframe(&mut self.reader).await? {
            if pdu.mtype != PduType::Video {
                return Err(Error::MessageTypeMismatch {
                    expected: PduType::Video.to_string(),
                    got: pdu.mtype.to_string(),
                });
            }
            stats.record_received(pdu.packet_no, pdu.data.len());
            sink.write_payload(&pdu.data).await?;
        }
        Ok(())
    }
}

/// 업로드 저장 경로
pub fn upload_path(upload_dir: &Path, ctx: &SessionContext) -> PathBuf {
    upload_dir.join(format!("client-{}-{}.bin", ctx.client_id, ctx.stream_no))
}

/// 버퍼가 가득 차거나 EOF에 도달할 때까지 읽는다. 0이면 소스 소진.
pub async fn read_chunk<R>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// 스트림 하나에 대한 서버 세션 전체 실행
pub async fn serve_stream<R, W>(
    reader: R,
    writer: W,
    ctx: SessionContext,
    resources: SessionResources<'_>,
) -> Result<TransferStats>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    AwaitHandshake::new(reader, writer, ctx)
        .accept_greeting(resources.catalog)
        .await?
        .read_request()
        .await?
        .run(resources)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Selection;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_handshake_transitions() {
        let catalog = Catalog::new("/nonexistent");
        let (client, server) = duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let session = AwaitHandshake::new(server_read, server_write, SessionContext::new(5, 1));

        client_write.write_all(b"hello").await.unwrap();
        let menu_sent = session.accept_greeting(&catalog).await.unwrap();

        let mut menu = vec![0u8; HANDSHAKE_BUFFER_SIZE];
        let n = client_read.read(&mut menu).await.unwrap();
        assert!(String::from_utf8_lossy(&menu[..n]).starts_with("Client 5:"));

        client_write.write_all(b"2").await.unwrap();
        let streaming = menu_sent.read_request().await.unwrap();
        assert_eq!(streaming.request(), Request::Watch(Selection::SailingBoat));
    }

    #[tokio::test]
    async fn test_greeting_eof() {
        let catalog = Catalog::default();
        let (client, server) = duplex(64);
        drop(client);
        let (r, w) = tokio::io::split(server);

        let result = AwaitHandshake::new(r, w, SessionContext::new(1, 1))
            .accept_greeting(&catalog)
            .await;
        assert!(matches!(result, Err(Error::UnexpectedEof(_))));
    }

    #[tokio::test]
    async fn test_missing_catalog_file_is_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new(dir.path());

        let (client, server) = duplex(4096);
        let (r, w) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"hi").await.unwrap();

        let server = tokio::spawn(async move {
            let resources = SessionResources {
                catalog: &catalog,
                upload_dir: Path::new("."),
            };
            serve_stream(r, w, SessionContext::new(1, 1), resources).await
        });

        let mut menu = vec![0u8; HANDSHAKE_BUFFER_SIZE];
        client_read.read(&mut menu).await.unwrap();
        client_write.write_all(b"1").await.unwrap();

        let result = server.await.unwrap();
        assert!(matches!(result, Err(Error::Resource { .. })));

        // 실패 경로에서도 스트림은 닫힌다
        let mut rest = Vec::new();
        client_read.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_read_chunk_fills_buffer() {
        let data: Vec<u8> = (0..10u8).collect();
        let mut source = data.as_slice();
        let mut buf = [0u8; 4];

        assert_eq!(read_chunk(&mut source, &mut buf).await.unwrap(), 4);
        assert_eq!(read_chunk(&mut source, &mut buf).await.unwrap(), 4);
        assert_eq!(read_chunk(&mut source, &mut buf).await.unwrap(), 2);
        assert_eq!(read_chunk(&mut source, &mut buf).await.unwrap(), 0);
    }

    #[test]
    fn test_chunk_size_clamped() {
        let ctx = SessionContext::new(1, 1).with_chunk_size(MAX_PDU_SIZE * 2);
        assert_eq!(ctx.chunk_size, MAX_PDU_SIZE);
        assert_eq!(upload_path(Path::new("/u"), &ctx), PathBuf::from("/u/client-1-1.bin"));
    }
}
