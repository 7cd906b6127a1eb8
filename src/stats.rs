//! 전송 통계와 시퀀스 번호 추적
//!
//! `packetNo`는 관측용이다. 수신자는 간격/중복을 기록만 하고
//! 재정렬이나 재요청은 하지 않는다 (신뢰성은 QUIC 스트림 담당).

use std::time::{Duration, Instant};

use tracing::warn;

/// 수신 시퀀스 번호 관측 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// 기대한 다음 번호
    InOrder,

    /// 번호가 건너뛰어짐 (누락 개수)
    Gap(u32),

    /// 이미 지나간 번호가 다시 도착
    Repeat,
}

/// 스트리밍 단계 하나의 `packetNo` 추적기
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    next_expected: u32,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self { next_expected: 1 }
    }

    /// 다음에 기대하는 번호
    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    /// 번호 하나 관측
    pub fn observe(&mut self, packet_no: u32) -> SequenceEvent {
        if packet_no == self.next_expected {
            self.next_expected = packet_no.wrapping_add(1);
            SequenceEvent::InOrder
        } else if packet_no > self.next_expected {
            let missing = packet_no - self.next_expected;
            self.next_expected = packet_no.wrapping_add(1);
            SequenceEvent::Gap(missing)
        } else {
            SequenceEvent::Repeat
        }
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// 스트리밍 단계 하나의 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 처리한 PDU 수
    pub packets: u64,

    /// 처리한 페이로드 바이트
    pub bytes: u64,

    /// 와이어에 실린 프레임 바이트 (프리픽스 포함, 송신측만)
    pub frame_bytes: u64,

    /// 관측된 누락 패킷 수
    pub gaps: u64,

    /// 관측된 중복 패킷 수
    pub duplicates: u64,

    /// 마지막 packetNo
    pub last_packet_no: u32,

    /// 종료 시간
    finished: Option<Instant>,

    tracker: SequenceTracker,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            packets: 0,
            bytes: 0,
            frame_bytes: 0,
            gaps: 0,
            duplicates: 0,
            last_packet_no: 0,
            finished: None,
            tracker: SequenceTracker::new(),
        }
    }

    /// 보낸 PDU 기록
    pub fn record_sent(&mut self, packet_no: u32, payload_len: usize, frame_len: usize) {
        self.packets += 1;
        self.bytes += payload_len as u64;
        self.frame_bytes += frame_len as u64;
        self.last_packet_no = packet_no;
    }

    /// 받은 PDU 기록. 시퀀스 이상은 로그로 남긴다.
    pub fn record_received(&mut self, packet_no: u32, payload_len: usize) -> SequenceEvent {
        let expected = self.tracker.next_expected();
        let event = self.tracker.observe(packet_no);
        match event {
            SequenceEvent::InOrder => {}
            SequenceEvent::Gap(missing) => {
                warn!(
                    "packet sequence gap: expected {}, got {} ({} missing)",
                    expected, packet_no, missing
                );
                self.gaps += missing as u64;
            }
            SequenceEvent::Repeat => {
                warn!("packet sequence repeat: expected {}, got {}", expected, packet_no);
                self.duplicates += 1;
            }
        }

        self.packets += 1;
        self.bytes += payload_len as u64;
        self.last_packet_no = packet_no;
        event
    }

    /// 단계 종료 표시
    pub fn finish(&mut self) {
        if self.finished.is_none() {
            self.finished = Some(Instant::now());
        }
    }

    /// 경과 시간 (종료되었으면 종료 시점까지)
    pub fn elapsed(&self) -> Duration {
        match self.finished {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// 페이로드 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / elapsed
    }

    /// 순서가 완전한지 (누락/중복 없음)
    pub fn is_contiguous(&self) -> bool {
        self.gaps == 0 && self.duplicates == 0
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Packets: {} | Bytes: {} | Throughput: {:.2} MB/s | Gaps: {} | Repeats: {}",
            self.elapsed().as_secs_f64(),
            self.packets,
            self.bytes,
            self.throughput() / 1_000_000.0,
            self.gaps,
            self.duplicates,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_in_order() {
        let mut tracker = SequenceTracker::new();
        for n in 1..=5 {
            assert_eq!(tracker.observe(n), SequenceEvent::InOrder);
        }
        assert_eq!(tracker.next_expected(), 6);
    }

    #[test]
    fn test_tracker_gap_and_repeat() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(1), SequenceEvent::InOrder);
        assert_eq!(tracker.observe(4), SequenceEvent::Gap(2));
        assert_eq!(tracker.observe(4), SequenceEvent::Repeat);
        assert_eq!(tracker.observe(5), SequenceEvent::InOrder);
    }

    #[test]
    fn test_stats_counts() {
        let mut stats = TransferStats::new();
        stats.record_received(1, 100);
        stats.record_received(2, 50);
        stats.record_received(5, 10);
        stats.finish();

        assert_eq!(stats.packets, 3);
        assert_eq!(stats.bytes, 160);
        assert_eq!(stats.gaps, 2);
        assert!(!stats.is_contiguous());
        assert_eq!(stats.last_packet_no, 5);
    }
}
