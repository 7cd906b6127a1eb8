//! PDU (Protocol Data Unit) 정의와 길이 프리픽스 프레이밍
//!
//! 와이어 형식: `[4바이트 빅엔디언 길이][직렬화된 PDU]` 반복
//!
//! PDU 본문은 확장이 쉬운 JSON 엔벨로프로 직렬화되고, 페이로드 바이트는
//! base64 문자열로 불투명하게 실린다.
//!
//! ```text
//! {"mtype":0,"len":3,"data":"AQID","packetNo":1}
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result, MAX_FRAME_SIZE, MAX_PDU_SIZE};

/// 길이 프리픽스 크기 (바이트)
pub const FRAME_HEADER_LEN: usize = 4;

/// PDU 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum PduType {
    /// 서버 → 클라이언트 데이터 청크
    Data = 0,

    /// 제어 메시지 (수신 확인)
    Ack = 1,

    /// 클라이언트 → 서버 업로드 청크
    Video = 2,
}

impl PduType {
    /// 로그 출력용 라벨
    pub fn label(&self) -> &'static str {
        match self {
            PduType::Data => "DATA",
            PduType::Ack => "ACK",
            PduType::Video => "VIDEO",
        }
    }
}

impl From<PduType> for u8 {
    fn from(t: PduType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for PduType {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(PduType::Data),
            1 => Ok(PduType::Ack),
            2 => Ok(PduType::Video),
            other => Err(format!("알 수 없는 PDU 타입: {}", other)),
        }
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 프로토콜 메시지 한 개
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pdu {
    /// 메시지 타입
    pub mtype: PduType,

    /// 페이로드 길이 (자기 기술 및 검증용)
    pub len: u32,

    /// 불투명 페이로드
    #[serde(with = "base64_bytes")]
    pub data: Bytes,

    /// 스트리밍 단계의 시퀀스 번호 (1부터 시작)
    #[serde(rename = "packetNo")]
    pub packet_no: u32,
}

impl Pdu {
    /// 새 PDU 생성. `len`은 항상 페이로드 길이로 채워진다.
    pub fn new(mtype: PduType, packet_no: u32, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            mtype,
            len: data.len() as u32,
            data,
            packet_no,
        }
    }

    /// DATA 청크
    pub fn data(packet_no: u32, data: impl Into<Bytes>) -> Self {
        Self::new(PduType::Data, packet_no, data)
    }

    /// VIDEO 청크 (업로드)
    pub fn video(packet_no: u32, data: impl Into<Bytes>) -> Self {
        Self::new(PduType::Video, packet_no, data)
    }

    /// 디버그 출력용 들여쓰기 JSON
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn validate(&self) -> Result<()> {
        if self.data.len() > MAX_PDU_SIZE {
            return Err(Error::PayloadTooLarge {
                size: self.data.len(),
                max: MAX_PDU_SIZE,
            });
        }
        if self.len as usize != self.data.len() {
            return Err(Error::LengthMismatch {
                declared: self.len,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// PDU를 와이어 표현으로 직렬화
pub fn encode(pdu: &Pdu) -> Result<Vec<u8>> {
    pdu.validate().map_err(|e| Error::Encoding(e.to_string()))?;
    serde_json::to_vec(pdu).map_err(|e| Error::Encoding(e.to_string()))
}

/// 와이어 표현에서 PDU 복원
pub fn decode(bytes: &[u8]) -> Result<Pdu> {
    let pdu: Pdu = serde_json::from_slice(bytes).map_err(|e| Error::Decoding(e.to_string()))?;
    pdu.validate().map_err(|e| Error::Decoding(e.to_string()))?;
    Ok(pdu)
}

/// 길이 프리픽스를 붙인 프레임 생성
pub fn frame(pdu: &Pdu) -> Result<Vec<u8>> {
    let body = encode(pdu)?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// 스트림에서 프레임 하나를 읽어 PDU로 복원
///
/// 길이 프리픽스 첫 바이트 이전에 스트림이 깨끗하게 끝나면 `Ok(None)`을 돌려준다.
/// 프리픽스나 본문 도중에 끊기면 `UnexpectedEof` 에러다.
pub async fn unframe<R>(reader: &mut R) -> Result<Option<Pdu>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        let n = reader
            .read(&mut header[filled..])
            .await
            .map_err(Error::transport)?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::UnexpectedEof("프레임 길이 프리픽스"));
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof("프레임 본문")
        } else {
            Error::transport(e)
        }
    })?;

    decode(&body).map(Some)
}

/// PDU를 프레임으로 만들어 스트림에 기록
pub async fn write_frame<W>(writer: &mut W, pdu: &Pdu) -> Result<usize>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = frame(pdu)?;
    writer.write_all(&bytes).await.map_err(Error::transport)?;
    Ok(bytes.len())
}

/// `Bytes` <-> base64 문자열
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        // 빈 페이로드가 null로 오는 경우도 허용
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            Some(s) => STANDARD
                .decode(s.as_bytes())
                .map(Bytes::from)
                .map_err(serde::de::Error::custom),
            None => Ok(Bytes::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pdu_roundtrip() {
        let pdu = Pdu::data(7, vec![0u8, 1, 2, 255]);
        let bytes = encode(&pdu).unwrap();
        let restored = decode(&bytes).unwrap();

        assert_eq!(pdu, restored);
        assert_eq!(restored.len, 4);
    }

    #[test]
    fn test_pretty_json_for_logging() {
        let pretty = Pdu::video(5, vec![1u8, 2, 3]).to_pretty_json();

        assert!(pretty.contains("\"mtype\": 2"));
        assert!(pretty.contains("\"packetNo\": 5"));
        assert!(pretty.contains("\"data\": \"AQID\""));
    }

    #[test]
    fn test_wire_field_names() {
        let pdu = Pdu::data(1, vec![1u8, 2, 3]);
        let json = String::from_utf8(encode(&pdu).unwrap()).unwrap();

        assert_eq!(json, r#"{"mtype":0,"len":3,"data":"AQID","packetNo":1}"#);
    }

    #[test]
    fn test_decode_null_data() {
        let pdu = decode(br#"{"mtype":1,"len":0,"data":null,"packetNo":0}"#).unwrap();

        assert_eq!(pdu.mtype, PduType::Ack);
        assert!(pdu.data.is_empty());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let pdu = Pdu::data(1, vec![0u8; MAX_PDU_SIZE + 1]);

        assert!(matches!(encode(&pdu), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(decode(b"not json"), Err(Error::Decoding(_))));
        assert!(matches!(
            decode(br#"{"mtype":9,"len":0,"data":"","packetNo":1}"#),
            Err(Error::Decoding(_))
        ));
        assert!(matches!(
            decode(br#"{"mtype":0,"len":5,"data":"AQID","packetNo":1}"#),
            Err(Error::Decoding(_))
        ));
        assert!(matches!(decode(br#"{"mtype":0,"len":3"#), Err(Error::Decoding(_))));
    }

    #[test]
    fn test_frame_prefix() {
        let pdu = Pdu::video(3, vec![9u8; 10]);
        let framed = frame(&pdu).unwrap();
        let body_len = u32::from_be_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;

        assert_eq!(body_len, framed.len() - FRAME_HEADER_LEN);
        assert_eq!(decode(&framed[FRAME_HEADER_LEN..]).unwrap(), pdu);
    }

    #[tokio::test]
    async fn test_unframe_sequence_then_eof() {
        let empty = Pdu::data(1, Vec::new());
        let full = Pdu::data(2, (0..MAX_PDU_SIZE).map(|i| i as u8).collect::<Vec<_>>());

        let mut wire = frame(&empty).unwrap();
        wire.extend(frame(&full).unwrap());
        let mut reader = wire.as_slice();

        assert_eq!(unframe(&mut reader).await.unwrap(), Some(empty));
        assert_eq!(unframe(&mut reader).await.unwrap(), Some(full));
        assert_eq!(unframe(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unframe_truncated() {
        let wire = frame(&Pdu::data(1, vec![1u8; 32])).unwrap();

        let mut partial_prefix = &wire[..2];
        assert!(matches!(
            unframe(&mut partial_prefix).await,
            Err(Error::UnexpectedEof(_))
        ));

        let mut partial_body = &wire[..wire.len() - 1];
        assert!(matches!(
            unframe(&mut partial_body).await,
            Err(Error::UnexpectedEof(_))
        ));
    }

    #[tokio::test]
    async fn test_unframe_rejects_huge_prefix() {
        let wire = u32::MAX.to_be_bytes();
        let mut reader = &wire[..];

        assert!(matches!(
            unframe(&mut reader).await,
            Err(Error::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_frame_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let pdu = Pdu::data(1, vec![42u8; 300]);

        let sent = pdu.clone();
        let writer = tokio::spawn(async move {
            write_frame(&mut a, &sent).await.unwrap();
        });

        assert_eq!(unframe(&mut b).await.unwrap(), Some(pdu));
        writer.await.unwrap();
        assert_eq!(unframe(&mut b).await.unwrap(), None);
    }

    fn any_pdu_type() -> impl Strategy<Value = PduType> {
        prop_oneof![
            Just(PduType::Data),
            Just(PduType::Ack),
            Just(PduType::Video)
        ]
    }

    fn any_pdu() -> impl Strategy<Value = Pdu> {
        (
            any_pdu_type(),
            any::<u32>(),
            prop::collection::vec(any::<u8>(), 0..=MAX_PDU_SIZE),
        )
            .prop_map(|(mtype, packet_no, data)| Pdu::new(mtype, packet_no, data))
    }

    fn unframe_all(wire: &[u8]) -> Vec<Pdu> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            let mut reader = wire;
            let mut pdus = Vec::new();
            while let Some(pdu) = unframe(&mut reader).await.unwrap() {
                pdus.push(pdu);
            }
            pdus
        })
    }

    proptest! {
        #[test]
        fn prop_encode_decode_roundtrip(pdu in any_pdu()) {
            let bytes = encode(&pdu).unwrap();
            let restored = decode(&bytes).unwrap();
            prop_assert_eq!(restored.len as usize, pdu.data.len());
            prop_assert_eq!(restored, pdu);
        }

        #[test]
        fn prop_frame_prefix_matches_body(pdu in any_pdu()) {
            let wire = frame(&pdu).unwrap();
            let declared = u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize;
            prop_assert_eq!(declared, wire.len() - FRAME_HEADER_LEN);
            prop_assert!(declared <= MAX_FRAME_SIZE);
        }

        #[test]
        fn prop_unframe_recovers_sequence(pdus in prop::collection::vec(any_pdu(), 0..8)) {
            let mut wire = Vec::new();
            for pdu in &pdus {
                wire.extend(frame(pdu).unwrap());
            }
            prop_assert_eq!(unframe_all(&wire), pdus);
        }

        #[test]
        fn prop_oversized_payload_rejected(extra in 1usize..256) {
            let pdu = Pdu::data(1, vec![0u8; MAX_PDU_SIZE + extra]);
            prop_assert!(matches!(encode(&pdu), Err(Error::Encoding(_))));
        }
    }
}
