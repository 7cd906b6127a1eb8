//! 서버 루프와 연결 핸들러
//!
//! - 연결을 무한히 수락하고, 연결마다 클라이언트 ID를 발급해 태스크 하나에 맡긴다
//! - 연결 핸들러는 피어가 여는 스트림마다 세션 태스크를 따로 띄운다
//! - 세션/연결 에러는 해당 태스크만 종료시키고 서버 루프로 전파되지 않는다

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use quinn::{ConnectionError, Endpoint, Incoming, VarInt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::config::ServerConfig;
use crate::registry::{ClientGuard, ClientRegistry};
use crate::session::{serve_stream, SessionContext, SessionResources};
use crate::tls::{self, Identity};
use crate::{Error, Result};

/// 모든 연결 태스크가 공유하는 읽기 전용 상태
#[derive(Debug)]
struct Shared {
    catalog: Catalog,
    upload_dir: PathBuf,
    chunk_size: usize,
}

/// 서버 종료 핸들
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// 수락 루프 종료 요청
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// QUIC 서버
pub struct Server {
    config: ServerConfig,
    shared: Arc<Shared>,
    registry: Arc<ClientRegistry>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Server {
    /// 새 서버 생성
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            catalog: Catalog::new(&config.catalog_dir),
            upload_dir: config.upload_dir.clone(),
            chunk_size: config.chunk_size,
        });
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            shared,
            registry: Arc::new(ClientRegistry::new()),
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// 설정된 주소에 QUIC 엔드포인트 바인딩
    pub fn bind(&self) -> Result<Endpoint> {
        let addr = self.config.bind_addr()?;
        self.bind_to(addr)
    }

    /// 지정한 주소에 QUIC 엔드포인트 바인딩
    pub fn bind_to(&self, addr: SocketAddr) -> Result<Endpoint> {
        let identity = Identity::from_source(&self.config.tls)?;
        let server_config = tls::server_config(identity)?;

        let endpoint = Endpoint::server(server_config, addr).map_err(|e| {
            error!("error listening on {}: {}", addr, e);
            Error::Transport(format!("{} 바인딩 실패: {}", addr, e))
        })?;
        info!("Server listening on {}", endpoint.local_addr()?);
        Ok(endpoint)
    }

    /// 바인딩 후 수락 루프 실행
    pub async fn run(&self) -> Result<()> {
        let endpoint = self.bind()?;
        self.serve(endpoint).await
    }

    /// 수락 루프
    ///
    /// 종료 요청 시 `Ok(())`.
    /// 종료 요청 없이 엔드포인트가 닫혀 더 이상 연결을 받을 수 없으면 `Error::Transport`.
    /// 개별 연결/스트림 에러로는 끝나지 않는다.
    pub async fn serve(&self, endpoint: Endpoint) -> Result<()> {
        let mut shutdown = self.shutdown_tx.subscribe();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            debug!("Accepting new session");
            let incoming = tokio::select! {
                incoming = endpoint.accept() => incoming,
                _ = shutdown.changed() => continue,
            };

            let Some(incoming) = incoming else {
                error!("error accepting: endpoint closed");
                return Err(Error::Transport("엔드포인트가 닫힘".to_string()));
            };

            let guard = self.registry.register(incoming.remote_address());
            info!(
                "Client {} connecting from {} ({} active)",
                guard.id(),
                incoming.remote_address(),
                self.registry.active_count()
            );

            let shared = Arc::clone(&self.shared);
            tokio::spawn(handle_connection(incoming, guard, shared));
        }

        info!("Server shutting down");
        endpoint.close(VarInt::from_u32(0), b"server shutdown");
        endpoint.wait_idle().await;
        Ok(())
    }
}

/// 연결 하나를 끝까지 처리. 스트림마다 세션 태스크를 띄운다.
async fn handle_connection(incoming: Incoming, guard: ClientGuard, shared: Arc<Shared>) {
    let client_id = guard.id();
    let connection = match incoming.await {
        Ok(connection) => connection,
        Err(e) => {
            warn!("[server] handshake with client {} failed: {}", client_id, e);
            return;
        }
    };

    loop {
        debug!("[server] waiting for client {} to open stream", client_id);
        let (send, recv) = match connection.accept_bi().await {
            Ok(streams) => streams,
            Err(ConnectionError::ApplicationClosed(_)) | Err(ConnectionError::LocallyClosed) => {
                info!("[server] client {} disconnected", client_id);
                break;
            }
            Err(e) => {
                warn!("[server] connection to client {} lost: {}", client_id, e);
                break;
            }
        };

        let stream_no = guard.record_stream();
        let ctx = SessionContext::new(client_id, stream_no).with_chunk_size(shared.chunk_size);
        let shared = Arc::clone(&shared);

        tokio::spawn(async move {
            let resources = SessionResources {
                catalog: &shared.catalog,
                upload_dir: &shared.upload_dir,
            };
            match serve_stream(recv, send, ctx, resources).await {
                Ok(stats) => debug!(
                    "[server] client {} stream {} done: {}",
                    ctx.client_id,
                    ctx.stream_no,
                    stats.summary()
                ),
                Err(e) => warn!(
                    "[server] client {} stream {} terminated: {}",
                    ctx.client_id, ctx.stream_no, e
                ),
            }
        });
    }
    // guard drop으로 레지스트리에서 제거
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_before_serve() {
        let server = Server::new(ServerConfig::default()).unwrap();
        let endpoint = server
            .bind_to("127.0.0.1:0".parse().unwrap())
            .unwrap();

        server.shutdown_handle().shutdown();
        assert!(server.serve(endpoint).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_endpoint_is_error() {
        let server = Server::new(ServerConfig::default()).unwrap();
        let endpoint = server
            .bind_to("127.0.0.1:0".parse().unwrap())
            .unwrap();

        endpoint.close(VarInt::from_u32(0), b"test");
        assert!(matches!(
            server.serve(endpoint).await,
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ServerConfig::default();
        config.chunk_size = 0;
        assert!(Server::new(config).is_err());
    }
}
