#![cfg(feature = "tls-rustls")]

mod harness;

use std::sync::Arc;

use barews::tls::{ClientTlsOptions, TlsConnector, TlsError};
use barews::{ClientConfig, Error, ServerConfig};
use harness::{TestClient, TestServer};
use rcgen::{CertifiedKey, generate_simple_self_signed};
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig as RustlsClientConfig, RootCertStore};
use tokio::net::{TcpListener, TcpStream};

struct TestIdentity {
    cert_pem: String,
    key_pem: String,
    cert_der: CertificateDer<'static>,
}

fn generate_test_identity() -> TestIdentity {
    let subject_alt_names = vec!["localhost".to_string()];
    let CertifiedKey { cert, key_pair } = generate_simple_self_signed(subject_alt_names).unwrap();

    TestIdentity {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        cert_der: cert.der().clone(),
    }
}

fn trusting_client_config(server_cert: CertificateDer<'static>) -> Arc<RustlsClientConfig> {
    let mut root_store = RootCertStore::empty();
    root_store.add(server_cert).unwrap();

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = RustlsClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Arc::new(config)
}

#[tokio::test]
async fn test_wss_echo_with_verified_certificate() {
    let identity = generate_test_identity();
    let server_config = ServerConfig::default()
        .with_secure(true)
        .with_identity(identity.cert_pem.clone(), identity.key_pem.clone());
    let (server, addr) = TestServer::spawn_with(server_config).await;

    let client_config = ClientConfig::default()
        .with_tls(ClientTlsOptions::custom(trusting_client_config(identity.cert_der)));
    let url = format!("wss://localhost:{}/secure", addr.port());
    let mut client = TestClient::connect_url(&url, client_config, 0).await.unwrap();

    client.send_text("over tls");
    assert_eq!(client.recv_text().await, Some("over tls".to_string()));
    assert_eq!(client.close().await, "Connection closed by client");

    server.shutdown().await;
}

#[tokio::test]
async fn test_wss_self_signed_server_with_insecure_client() {
    let (server, addr) = TestServer::spawn_with(ServerConfig::default().with_secure(true)).await;

    let url = format!("wss://localhost:{}/", addr.port());
    let mut client = TestClient::connect_url(&url, ClientConfig::default(), 0)
        .await
        .unwrap();

    client.send(b"\x00\x01\x02");
    assert_eq!(client.recv().await, Some(vec![0x00, 0x01, 0x02]));

    server.shutdown().await;
}

#[tokio::test]
async fn test_verifying_client_rejects_untrusted_certificate() {
    let (server, addr) = TestServer::spawn_with(ServerConfig::default().with_secure(true)).await;

    let other = generate_test_identity();
    let client_config = ClientConfig::default()
        .with_tls(ClientTlsOptions::custom(trusting_client_config(other.cert_der)));
    let url = format!("wss://localhost:{}/", addr.port());

    let err = TestClient::connect_url(&url, client_config, 0)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Tls(_)), "unexpected error {:?}", err);
    assert_eq!(server.handle.connection_count(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_plain_client_against_tls_server_fails() {
    let (server, addr) = TestServer::spawn_with(ServerConfig::default().with_secure(true)).await;

    let url = format!("ws://127.0.0.1:{}/", addr.port());
    let result = TestClient::connect_url(&url, ClientConfig::default(), 0).await;
    assert!(result.is_err());
    assert_eq!(server.handle.connection_count(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_bind_with_bad_identity_fails() {
    let config = ServerConfig::default()
        .with_secure(true)
        .with_identity("not a certificate", "not a key");
    let err = barews::WebSocketServer::bind("127.0.0.1:0", config)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Tls(_)));
}

#[tokio::test]
async fn test_invalid_dns_name() {
    let config = barews::tls::insecure_client_config().unwrap();
    let connector = TlsConnector::new(config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let stream = TcpStream::connect(addr).await.unwrap();
    let result = connector.connect("invalid..name", stream).await;

    assert!(matches!(result, Err(TlsError::InvalidDnsName(_))));
}

#[test]
fn test_tls_error_display() {
    let io_err = TlsError::Io(std::io::Error::other("test"));
    assert!(io_err.to_string().contains("TLS I/O error"));

    let config_err = TlsError::Configuration("bad config".to_string());
    assert!(config_err.to_string().contains("TLS configuration error"));

    let no_certs = TlsError::NoCertificatesFound;
    assert!(no_certs.to_string().contains("no certificates found"));

    let no_key = TlsError::NoPrivateKeyFound;
    assert!(no_key.to_string().contains("no private key found"));

    let invalid_dns = TlsError::InvalidDnsName("bad.name".to_string());
    assert!(invalid_dns.to_string().contains("invalid DNS name"));

    let converted: Error = TlsError::NoCertificatesFound.into();
    assert_eq!(converted, Error::Tls("no certificates found in PEM data".into()));
}
