//! 클라이언트 레지스트리
//!
//! 연결마다 단조 증가 클라이언트 ID를 발급한다. 연결은 동시에 수락되므로
//! ID 카운터는 원자적으로 증가하고, 활성 연결 목록은 `DashMap`에 둔다.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;

/// 클라이언트 ID (1부터 시작)
pub type ClientId = u64;

/// 활성 클라이언트 정보
#[derive(Debug)]
pub struct ClientEntry {
    /// 원격 주소
    pub remote_addr: SocketAddr,

    /// 연결 시간
    pub connected_at: Instant,

    /// 지금까지 수락한 스트림 수
    streams: AtomicU32,
}

/// 연결 → 클라이언트 ID 매핑
#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: DashMap<ClientId, ClientEntry>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 새 연결 등록. 반환된 가드가 drop되면 등록이 해제된다.
    pub fn register(self: &Arc<Self>, remote_addr: SocketAddr) -> ClientGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.clients.insert(
            id,
            ClientEntry {
                remote_addr,
                connected_at: Instant::now(),
                streams: AtomicU32::new(0),
            },
        );
        ClientGuard {
            id,
            registry: Arc::clone(self),
        }
    }

    /// 스트림 수락 기록. 연결 내 스트림 순번(1부터)을 돌려준다.
    pub fn record_stream(&self, id: ClientId) -> u32 {
        self.clients
            .get(&id)
            .map(|entry| entry.streams.fetch_add(1, Ordering::Relaxed) + 1)
            .unwrap_or(0)
    }

    /// 현재 활성 클라이언트 수
    pub fn active_count(&self) -> usize {
        self.clients.len()
    }

    /// 지금까지 발급한 ID 수
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}

/// 등록 해제 가드 (연결 핸들러가 소유)
#[derive(Debug)]
pub struct ClientGuard {
    id: ClientId,
    registry: Arc<ClientRegistry>,
}

impl ClientGuard {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn record_stream(&self) -> u32 {
        self.registry.record_stream(self.id)
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        if let Some((id, entry)) = self.registry.clients.remove(&self.id) {
            debug!(
                "[server] client {} ({}) released after {:?}, {} streams",
                id,
                entry.remote_addr,
                entry.connected_at.elapsed(),
                entry.streams.load(Ordering::Relaxed)
            );
        }
    }
}
