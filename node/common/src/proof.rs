use crate::crypto::{canonical_json, sha256_hex};
use crate::error::{KeeperError, Result};
use crate::types::{IpfsData, ProofData};
use async_trait::async_trait;
use chrono::Utc;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Endpoint whose certificate is bound into each proof
#[derive(Debug, Clone, PartialEq)]
pub struct TlsProofConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub verify_peer: bool,
    pub server_name: String,
}

impl TlsProofConfig {
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            server_name: host.clone(),
            host,
            port: 443,
            timeout: Duration::from_secs(10),
            verify_peer: true,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Supplies the DER certificate a proof is bound to
#[async_trait]
pub trait CertificateSource: Send + Sync {
    async fn certificate(&self) -> Result<Vec<u8>>;
}

/// Fetches the end-entity certificate with a TLS handshake
pub struct TlsCertificateSource {
    config: TlsProofConfig,
}

impl TlsCertificateSource {
    pub fn new(config: TlsProofConfig) -> Self {
        Self { config }
    }

    fn client_config(&self) -> Result<ClientConfig> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| KeeperError::Tls(e.to_string()))?;

        let config = if self.config.verify_peer {
            let roots = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect(),
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        } else {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
                .with_no_client_auth()
        };

        Ok(config)
    }

    async fn handshake(&self) -> Result<Vec<u8>> {
        let connector = TlsConnector::from(Arc::new(self.client_config()?));
        let server_name = ServerName::try_from(self.config.server_name.clone())
            .map_err(|e| KeeperError::Tls(format!("invalid server name: {}", e)))?;

        let tcp = TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;
        let stream = connector.connect(server_name, tcp).await?;

        let (_, session) = stream.get_ref();
        let end_entity = session
            .peer_certificates()
            .and_then(|chain| chain.first())
            .ok_or_else(|| KeeperError::Tls("peer presented no certificate".into()))?;

        Ok(end_entity.as_ref().to_vec())
    }
}

#[async_trait]
impl CertificateSource for TlsCertificateSource {
    async fn certificate(&self) -> Result<Vec<u8>> {
        debug!(host = %self.config.host, port = self.config.port, "Fetching TLS certificate");

        tokio::time::timeout(self.config.timeout, self.handshake())
            .await
            .map_err(|_| {
                KeeperError::Tls(format!(
                    "handshake with {}:{} timed out",
                    self.config.host, self.config.port
                ))
            })?
    }
}

/// Certificate source with a fixed certificate
pub struct StaticCertificate(pub Vec<u8>);

#[async_trait]
impl CertificateSource for StaticCertificate {
    async fn certificate(&self) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Accepts any server certificate; handshake signatures are still checked
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
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

/// Hex SHA256 of a DER certificate
pub fn certificate_hash(der: &[u8]) -> String {
    sha256_hex(der)
}

/// Hex SHA256 over the bundle without its proof and signature
pub fn proof_of_task(ipfs: &IpfsData) -> Result<String> {
    Ok(sha256_hex(&canonical_json(&ipfs.proof_view())?))
}

/// Bind a bundle to a certificate
pub fn generate_proof(ipfs: &IpfsData, certificate: &[u8]) -> Result<ProofData> {
    let task_id = ipfs
        .action_data
        .as_ref()
        .map(|action| action.task_id)
        .or_else(|| {
            ipfs.task_data
                .as_ref()
                .and_then(|task| task.task_id.first().copied())
        })
        .unwrap_or_default();

    Ok(ProofData {
        task_id,
        proof_of_task: proof_of_task(ipfs)?,
        certificate_hash: certificate_hash(certificate),
        certificate_timestamp: Utc::now(),
    })
}
