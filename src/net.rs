use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{LookupIpStrategy, ResolverConfig, ResolverOpts};
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;
use openssl::error::ErrorStack;
use openssl::ssl::{SslConnector, SslMethod, SslOptions, SslRef, SslVerifyMode, SslVersion};
use tokio::net::TcpStream;
use tokio::time;
use tokio_openssl::SslStream;
use tracing::{debug, warn};

use crate::types::TlsSession;

/// Hostname to address lookup.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// All addresses of `host`, both families, in resolver order.
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, String>;
}

/// Opens a TLS session and reports what the server presented.
#[async_trait]
pub trait TlsDialer: Send + Sync {
    async fn dial(&self, host: &str, addr: SocketAddr) -> Result<TlsSession, String>;
}

/// Textual form of an address as stored with each probe: IPv6 is bracketed.
pub fn display_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    }
}

/// Resolver backed by hickory, configured from the system resolv.conf.
pub struct SystemResolver {
    inner: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn new() -> Self {
        let (config, opts) = resolver_settings();
        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// System (or default) resolver settings, always querying A and AAAA so
/// dual-stack hosts yield addresses of both families.
fn resolver_settings() -> (ResolverConfig, ResolverOpts) {
    let (config, mut opts) = read_system_conf().unwrap_or_else(|e| {
        warn!(error = %e, "system resolver configuration unavailable, using defaults");
        (ResolverConfig::default(), ResolverOpts::default())
    });
    opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
    (config, opts)
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, String> {
        let found = self.inner.lookup_ip(host).await.map_err(|e| e.to_string())?;
        Ok(found.iter().collect())
    }
}

/// TLS client built on OpenSSL with certificate verification disabled, every
/// protocol version the library was compiled with enabled, and security level
/// 0 so legacy ciphers, short keys and SHA-1 signatures still handshake. The
/// archiver records chains, it never trusts them.
pub struct OpensslDialer {
    connector: SslConnector,
    timeout: Option<Duration>,
}

impl OpensslDialer {
    pub fn new(timeout: Option<Duration>) -> Result<Self, ErrorStack> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())?;
        builder.set_verify(SslVerifyMode::NONE);
        builder.clear_options(SslOptions::NO_SSLV3);
        builder.set_min_proto_version(None)?;
        builder.set_cipher_list("ALL:COMPLEMENTOFALL:@SECLEVEL=0")?;
        Ok(Self {
            connector: builder.build(),
            timeout,
        })
    }

    async fn handshake(&self, host: &str, addr: SocketAddr) -> Result<TlsSession, String> {
        let mut config = self.connector.configure().map_err(|e| e.to_string())?;
        config.set_verify_hostname(false);
        let ssl = config
            .into_ssl(host)
            .map_err(|e| format!("invalid server name {host}: {e}"))?;
        let tcp = TcpStream::connect(addr).await.map_err(|e| e.to_string())?;
        let mut stream = SslStream::new(ssl, tcp).map_err(|e| e.to_string())?;
        Pin::new(&mut stream).connect().await.map_err(|e| e.to_string())?;

        let session = session_of(stream.ssl())?;
        debug!(
            host,
            %addr,
            protocol = protocol_name(session.protocol),
            cipher_suite = session.cipher_suite,
            "handshake complete"
        );
        // The chain is owned by `session` now; dropping `stream` closes the connection.
        Ok(session)
    }
}

/// Protocol, cipher suite and leaf-first chain of an established connection.
fn session_of(ssl: &SslRef) -> Result<TlsSession, String> {
    let protocol = ssl.version2().map(version_code).unwrap_or_default();
    let cipher_suite = ssl
        .current_cipher()
        .map(|c| u16::from_be_bytes(c.protocol_id()))
        .unwrap_or_default();
    let chain = match ssl.peer_cert_chain() {
        Some(certs) => certs
            .iter()
            .map(|c| c.to_der())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?,
        None => Vec::new(),
    };
    Ok(TlsSession {
        protocol,
        cipher_suite,
        chain,
    })
}

/// Wire value of a negotiated protocol version.
fn version_code(version: SslVersion) -> u16 {
    if version == SslVersion::TLS1_3 {
        0x0304
    } else if version == SslVersion::TLS1_2 {
        0x0303
    } else if version == SslVersion::TLS1_1 {
        0x0302
    } else if version == SslVersion::TLS1 {
        0x0301
    } else if version == SslVersion::SSL3 {
        0x0300
    } else {
        0
    }
}

#[async_trait]
impl TlsDialer for OpensslDialer {
    async fn dial(&self, host: &str, addr: SocketAddr) -> Result<TlsSession, String> {
        match self.timeout {
            Some(limit) => time::timeout(limit, self.handshake(host, addr))
                .await
                .map_err(|_| format!("timed out after {}ms", limit.as_millis()))?,
            None => self.handshake(host, addr).await,
        }
    }
}

/// Human-readable name of a TLS protocol wire value.
pub fn protocol_name(version: u16) -> &'static str {
    match version {
        0x0304 => "TLS 1.3",
        0x0303 => "TLS 1.2",
        0x0302 => "TLS 1.1",
        0x0301 => "TLS 1.0",
        0x0300 => "SSL 3.0",
        _ => "unknown",
    }
}
