mod common;

use std::net::SocketAddr;
use std::pin::Pin;

use cert_archiver::net::{protocol_name, OpensslDialer, TlsDialer};
use common::{pem_to_der, LEGACY_SERVER_CERT_PEM, LEGACY_SERVER_KEY_PEM};
use openssl::pkey::PKey;
use openssl::ssl::{Ssl, SslContext, SslMethod, SslVersion};
use openssl::x509::X509;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio_openssl::SslStream;

/// Serve one TLS connection pinned to `version`, then wait for the client to hang up.
async fn serve_once(version: SslVersion) -> SocketAddr {
    let mut builder = SslContext::builder(SslMethod::tls_server()).unwrap();
    builder
        .set_private_key(&PKey::private_key_from_pem(LEGACY_SERVER_KEY_PEM.as_bytes()).unwrap())
        .unwrap();
    builder
        .set_certificate(&X509::from_pem(LEGACY_SERVER_CERT_PEM.as_bytes()).unwrap())
        .unwrap();
    builder.set_cipher_list("ALL:@SECLEVEL=0").unwrap();
    builder.set_min_proto_version(Some(version)).unwrap();
    builder.set_max_proto_version(Some(version)).unwrap();
    let ctx = builder.build();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut stream = SslStream::new(Ssl::new(&ctx).unwrap(), tcp).unwrap();
        if Pin::new(&mut stream).accept().await.is_ok() {
            let mut buf = [0u8; 16];
            let _ = stream.read(&mut buf).await;
        }
    });
    addr
}

#[tokio::test]
async fn captures_tls10_only_server() {
    let addr = serve_once(SslVersion::TLS1).await;
    let dialer = OpensslDialer::new(None).unwrap();

    let session = dialer.dial("legacy.test", addr).await.expect("legacy handshake");
    assert_eq!(session.protocol, 0x0301);
    assert_eq!(protocol_name(session.protocol), "TLS 1.0");
    assert_ne!(session.cipher_suite, 0);
    assert_eq!(session.chain, vec![pem_to_der(LEGACY_SERVER_CERT_PEM)]);
}

#[tokio::test]
async fn reports_tls12_protocol_and_cipher() {
    let addr = serve_once(SslVersion::TLS1_2).await;
    let dialer = OpensslDialer::new(None).unwrap();

    let session = dialer.dial("legacy.test", addr).await.expect("handshake");
    assert_eq!(protocol_name(session.protocol), "TLS 1.2");
    assert_ne!(session.cipher_suite, 0);
    assert_eq!(session.chain.len(), 1);
}

#[tokio::test]
async fn refused_connection_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dialer = OpensslDialer::new(Some(std::time::Duration::from_secs(5))).unwrap();
    assert!(dialer.dial("legacy.test", addr).await.is_err());
}
