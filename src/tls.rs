//! QUIC용 TLS 설정
//!
//! - 서버: PEM 인증서/키 로드 또는 자체 서명 인증서 생성
//! - 클라이언트: 지정한 인증서만 신뢰하거나, 지정이 없으면 검증 생략 (개발용)
//!
//! QUIC은 TLS 1.3만 허용하므로 프로토콜 버전은 TLS 1.3으로 고정한다.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::{certs, read_one, Item};
use tracing::{info, warn};

use crate::config::TlsSource;
use crate::{Error, Result, ALPN_PROTOCOL};

/// 인증서 체인 + 개인키
pub struct Identity {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl Identity {
    /// 설정에 따라 로드하거나 생성
    pub fn from_source(source: &TlsSource) -> Result<Self> {
        match source {
            TlsSource::Generate => generate_self_signed(),
            TlsSource::Files { cert, key } => Ok(Self {
                certs: load_certs(cert)?,
                key: load_private_key(key)?,
            }),
        }
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// PEM 파일에서 인증서 체인 로드
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| Error::resource(path, e))?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = certs(&mut reader)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Tls(format!("{:?}: 잘못된 인증서 PEM: {}", path, e)))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!("{:?}: 인증서 없음", path)));
    }

    Ok(certs)
}

/// PEM 파일에서 개인키 로드 (PKCS1, PKCS8, SEC1)
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| Error::resource(path, e))?;
    let mut reader = BufReader::new(file);

    loop {
        match read_one(&mut reader) {
            Ok(Some(Item::Pkcs1Key(key))) => return Ok(key.into()),
            Ok(Some(Item::Pkcs8Key(key))) => return Ok(key.into()),
            Ok(Some(Item::Sec1Key(key))) => return Ok(key.into()),
            Ok(None) => break,
            Ok(Some(_)) => {}
            Err(e) => {
                return Err(Error::Tls(format!("{:?}: 키 파싱 에러: {}", path, e)));
            }
        }
    }

    Err(Error::Tls(format!("{:?}: 개인키 없음", path)))
}

/// `localhost`용 자체 서명 인증서 생성
pub fn generate_self_signed() -> Result<Identity> {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| Error::Tls(format!("자체 서명 인증서 생성 실패: {}", e)))?;

    info!("Generated ephemeral self-signed certificate for localhost");
    Ok(Identity {
        certs: vec![certified.cert.der().clone()],
        key: PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()).into(),
    })
}

/// QUIC 서버 설정
pub fn server_config(identity: Identity) -> Result<quinn::ServerConfig> {
    let mut crypto = rustls::ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_no_client_auth()
        .with_single_cert(identity.certs, identity.key)?;
    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let quic = QuicServerConfig::try_from(crypto).map_err(|e| Error::Tls(e.to_string()))?;
    Ok(quinn::ServerConfig::with_crypto(Arc::new(quic)))
}

/// QUIC 클라이언트 설정
pub fn client_config(ca_cert: Option<&Path>) -> Result<quinn::ClientConfig> {
    let provider = provider();
    let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_protocol_versions(&[&rustls::version::TLS13])?;

    let mut crypto = match ca_cert {
        Some(path) => {
            info!("Using cert file: {:?}", path);
            let mut roots = RootCertStore::empty();
            for cert in load_certs(path)? {
                roots.add(cert)?;
            }
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        None => {
            warn!("No cert file given, server certificate will NOT be verified");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification(provider)))
                .with_no_client_auth()
        }
    };
    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let quic = QuicClientConfig::try_from(crypto).map_err(|e| Error::Tls(e.to_string()))?;
    Ok(quinn::ClientConfig::new(Arc::new(quic)))
}

/// 서버 인증서를 검증하지 않는 검증기 (서명 자체는 확인)
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_identity_builds_configs() {
        let identity = generate_self_signed().unwrap();
        assert_eq!(identity.certs.len(), 1);

        assert!(server_config(identity).is_ok());
        assert!(client_config(None).is_ok());
    }

    #[test]
    fn test_missing_cert_file() {
        let result = load_certs(Path::new("/nonexistent/cert.pem"));
        assert!(matches!(result, Err(Error::Resource { .. })));
    }

    #[test]
    fn test_key_file_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "not a pem file\n").unwrap();

        assert!(matches!(load_private_key(&path), Err(Error::Tls(_))));
    }
}
