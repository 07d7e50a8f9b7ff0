use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::rustls::{ClientConfig, ServerConfig};

use super::MaybeTlsStream;

#[derive(Debug)]
pub enum TlsError {
    Io(std::io::Error),
    Configuration(String),
    NoCertificatesFound,
    NoPrivateKeyFound,
    InvalidDnsName(String),
    CertificateGeneration(String),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsError::Io(e) => write!(f, "TLS I/O error: {}", e),
            TlsError::Configuration(msg) => write!(f, "TLS configuration error: {}", msg),
            TlsError::NoCertificatesFound => write!(f, "no certificates found in PEM data"),
            TlsError::NoPrivateKeyFound => write!(f, "no private key found in PEM data"),
            TlsError::InvalidDnsName(name) => write!(f, "invalid DNS name: {}", name),
            TlsError::CertificateGeneration(msg) => {
                write!(f, "self-signed certificate generation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for TlsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TlsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TlsError {
    fn from(err: std::io::Error) -> Self {
        TlsError::Io(err)
    }
}

impl From<rustls::Error> for TlsError {
    fn from(err: rustls::Error) -> Self {
        TlsError::Configuration(err.to_string())
    }
}

impl From<TlsError> for crate::Error {
    fn from(err: TlsError) -> Self {
        crate::Error::Tls(err.to_string())
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct NoCertificateVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// TLS settings for `wss://` client connections.
///
/// The default skips certificate verification, which makes self-signed
/// development servers reachable but offers no protection against an active
/// attacker. Use [`ClientTlsOptions::webpki_roots`] or
/// [`ClientTlsOptions::custom`] for anything else.
#[derive(Debug, Clone, Default)]
pub enum ClientTlsOptions {
    /// Accept any certificate.
    #[default]
    Insecure,
    /// Verify against the Mozilla root set bundled by `webpki-roots`.
    WebpkiRoots,
    /// Use a caller-built rustls configuration.
    Custom(Arc<ClientConfig>),
}

impl ClientTlsOptions {
    #[must_use]
    pub fn insecure() -> Self {
        ClientTlsOptions::Insecure
    }

    #[must_use]
    pub fn webpki_roots() -> Self {
        ClientTlsOptions::WebpkiRoots
    }

    #[must_use]
    pub fn custom(config: Arc<ClientConfig>) -> Self {
        ClientTlsOptions::Custom(config)
    }

    /// Whether server certificates are checked.
    #[must_use]
    pub fn verifies_certificates(&self) -> bool {
        !matches!(self, ClientTlsOptions::Insecure)
    }

    /// Build the rustls configuration these options describe.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, TlsError> {
        match self {
            ClientTlsOptions::Insecure => insecure_client_config(),
            ClientTlsOptions::WebpkiRoots => client_config_with_webpki_roots(),
            ClientTlsOptions::Custom(config) => Ok(Arc::clone(config)),
        }
    }
}

pub fn insecure_client_config() -> Result<Arc<ClientConfig>, TlsError> {
    let provider = provider();
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoCertificateVerification(provider)))
        .with_no_client_auth();

    Ok(Arc::new(config))
}

pub fn client_config_with_webpki_roots() -> Result<Arc<ClientConfig>, TlsError> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

pub fn server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
) -> Result<Arc<ServerConfig>, TlsError> {
    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|e| TlsError::Configuration(e.to_string()))?;

    Ok(Arc::new(config))
}

/// Server configuration from a PEM certificate chain and private key.
pub fn server_config_from_pem(cert: &[u8], key: &[u8]) -> Result<Arc<ServerConfig>, TlsError> {
    server_config(certs_from_pem(cert)?, private_key_from_pem(key)?)
}

/// Server configuration with a throwaway self-signed certificate for
/// `localhost`. Clients must skip verification to connect.
pub fn self_signed_server_config() -> Result<Arc<ServerConfig>, TlsError> {
    let certified = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .map_err(|e| TlsError::CertificateGeneration(e.to_string()))?;

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.key_pair.serialize_der(),
    ));
    server_config(vec![certified.cert.der().clone()], key)
}

pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            inner: tokio_rustls::TlsConnector::from(config),
        }
    }

    pub async fn connect<S>(&self, domain: &str, stream: S) -> Result<MaybeTlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|_| TlsError::InvalidDnsName(domain.to_string()))?;

        let tls_stream = self
            .inner
            .connect(server_name, stream)
            .await
            .map_err(TlsError::Io)?;

        Ok(MaybeTlsStream::ClientTls(Box::new(tls_stream)))
    }
}

#[derive(Clone)]
pub struct TlsAcceptor {
    inner: tokio_rustls::TlsAcceptor,
}

impl TlsAcceptor {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            inner: tokio_rustls::TlsAcceptor::from(config),
        }
    }

    pub async fn accept<S>(&self, stream: S) -> Result<MaybeTlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let tls_stream = self.inner.accept(stream).await.map_err(TlsError::Io)?;
        Ok(MaybeTlsStream::ServerTls(Box::new(tls_stream)))
    }
}

pub fn certs_from_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = pem;
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificatesFound);
    }

    Ok(certs)
}

pub fn private_key_from_pem(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = pem;

    for item in rustls_pemfile::read_all(&mut reader) {
        match item? {
            rustls_pemfile::Item::Pkcs1Key(key) => return Ok(PrivateKeyDer::Pkcs1(key)),
            rustls_pemfile::Item::Pkcs8Key(key) => return Ok(PrivateKeyDer::Pkcs8(key)),
            rustls_pemfile::Item::Sec1Key(key) => return Ok(PrivateKeyDer::Sec1(key)),
            _ => continue,
        }
    }

    Err(TlsError::NoPrivateKeyFound)
}

pub fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    certs_from_pem(&fs::read(path)?)
}

pub fn load_private_key_from_file(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    private_key_from_pem(&fs::read(path)?)
}
