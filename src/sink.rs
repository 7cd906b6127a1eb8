//! 페이로드 싱크
//!
//! 수신한 PDU 페이로드를 도착 순서대로 넘겨받는 외부 소비자.
//! 코어는 [`PayloadSink`]만 알고, 프로세스/파일 관리는 구현체가 담당한다.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info};

use crate::{Error, Result};

/// 기본 플레이어 명령
pub const DEFAULT_PLAYER: &[&str] = &["ffplay", "-f", "mp4", "-i", "pipe:"];

/// 페이로드 바이트 소비자
pub trait PayloadSink {
    /// 페이로드 하나 기록
    fn write_payload(&mut self, payload: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// 소스가 끝났음을 알리고 싱크를 닫는다. 두 번 호출해도 안전하다.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// 표준 입력으로 미디어를 받는 플레이어 프로세스
#[derive(Debug)]
pub struct PlayerSink {
    child: Child,
    stdin: Option<ChildStdin>,
    program: String,
}

impl PlayerSink {
    /// 주어진 명령을 stdin 파이프와 함께 실행
    pub fn spawn<S: AsRef<str>>(command: &[S]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Config("플레이어 명령이 비어 있음".to_string()))?;
        let program = program.as_ref().to_string();

        let mut child = Command::new(&program)
            .args(args.iter().map(|a| a.as_ref()))
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| Error::resource(&program, e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Sink(format!("{} stdin 파이프 생성 실패", program)))?;

        info!("Player started: {}", program);
        Ok(Self {
            child,
            stdin: Some(stdin),
            program,
        })
    }
}

impl PayloadSink for PlayerSink {
    async fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Sink("플레이어 입력이 이미 닫힘".to_string()))?;
        stdin
            .write_all(payload)
            .await
            .map_err(|e| Error::Sink(format!("{}: {}", self.program, e)))
    }

    async fn close(&mut self) -> Result<()> {
        // stdin을 닫아야 플레이어가 EOF를 보고 마무리한다
        let Some(mut stdin) = self.stdin.take() else {
            return Ok(());
        };
        let _ = stdin.flush().await;
        drop(stdin);

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| Error::Sink(format!("{}: {}", self.program, e)))?;
        debug!("Player exited: {}", status);

        if status.success() {
            Ok(())
        } else {
            Err(Error::Sink(format!("{} exited with {}", self.program, status)))
        }
    }
}

/// 로컬 파일에 페이로드 저장
#[derive(Debug)]
pub struct FileSink {
    file: Option<File>,
    path: PathBuf,
    written: u64,
}

impl FileSink {
    /// 파일 생성 (기존 파일은 덮어쓴다)
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .await
            .map_err(|e| Error::resource(&path, e))?;
        Ok(Self {
            file: Some(file),
            path,
            written: 0,
        })
    }

    /// 지금까지 기록한 바이트
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl PayloadSink for FileSink {
    async fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::Sink(format!("{:?} 이미 닫힘", self.path)))?;
        file.write_all(payload)
            .await
            .map_err(|e| Error::resource(&self.path, e))?;
        self.written += payload.len() as u64;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(|e| Error::resource(&self.path, e))?;
        }
        Ok(())
    }
}

/// 임의의 `AsyncWrite`를 싱크로 사용
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
    closed: bool,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> PayloadSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::Sink("싱크가 이미 닫힘".to_string()));
        }
        self.writer
            .write_all(payload)
            .await
            .map_err(|e| Error::Sink(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer
            .shutdown()
            .await
            .map_err(|e| Error::Sink(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writer_sink_collects_in_order() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_payload(b"abc").await.unwrap();
        sink.write_payload(b"def").await.unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();

        assert!(sink.is_closed());
        assert!(sink.write_payload(b"x").await.is_err());
        assert_eq!(sink.into_inner(), b"abcdef".to_vec());
    }

    #[tokio::test]
    async fn test_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let mut sink = FileSink::create(&path).await.unwrap();
        sink.write_payload(&[1, 2, 3]).await.unwrap();
        sink.write_payload(&[4]).await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(sink.written(), 4);
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_file_sink_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.bin");

        assert!(matches!(
            FileSink::create(&path).await,
            Err(Error::Resource { .. })
        ));
    }

    #[test]
    fn test_player_empty_command() {
        let empty: [&str; 0] = [];
        assert!(matches!(PlayerSink::spawn(&empty[..]), Err(Error::Config(_))));
    }
}
