#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;

use async_trait::async_trait;
use cert_archiver::net::{Resolver, TlsDialer};
use cert_archiver::types::TlsSession;

pub const LOCALHOST_V1_PEM: &str = include_str!("../data/localhost-v1.pem");
pub const MULTI_VALUED_PEM: &str = include_str!("../data/multi-valued.pem");
pub const UNKNOWN_KEY_MULTI_CN_PEM: &str = include_str!("../data/unknown-key-multi-cn.pem");
pub const LEGACY_SERVER_CERT_PEM: &str = include_str!("../data/legacy-server.pem");
pub const LEGACY_SERVER_KEY_PEM: &str = include_str!("../data/legacy-server-key.pem");

pub fn pem_to_der(pem: &str) -> Vec<u8> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes()).expect("valid PEM");
    pem.contents
}

/// Resolver answering from a fixed table; unknown hosts fail.
#[derive(Default)]
pub struct StubResolver {
    answers: HashMap<String, Vec<IpAddr>>,
}

impl StubResolver {
    pub fn with(mut self, host: &str, ips: &[&str]) -> Self {
        let ips = ips.iter().map(|s| s.parse().expect("valid ip")).collect();
        self.answers.insert(host.to_string(), ips);
        self
    }
}

#[async_trait]
impl Resolver for StubResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, String> {
        self.answers
            .get(host)
            .cloned()
            .ok_or_else(|| format!("no such host: {host}"))
    }
}

/// TLS layer answering per address; addresses without an entry refuse the connection.
#[derive(Default)]
pub struct StubDialer {
    sessions: HashMap<IpAddr, TlsSession>,
    pub dialed: Mutex<Vec<SocketAddr>>,
}

impl StubDialer {
    pub fn with(mut self, ip: &str, session: TlsSession) -> Self {
        self.sessions.insert(ip.parse().expect("valid ip"), session);
        self
    }

    pub fn dialed(&self) -> Vec<SocketAddr> {
        self.dialed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TlsDialer for StubDialer {
    async fn dial(&self, _host: &str, addr: SocketAddr) -> Result<TlsSession, String> {
        self.dialed.lock().unwrap().push(addr);
        self.sessions
            .get(&addr.ip())
            .cloned()
            .ok_or_else(|| "connection refused".to_string())
    }
}

pub fn session(protocol: u16, cipher_suite: u16, chain: Vec<Vec<u8>>) -> TlsSession {
    TlsSession { protocol, cipher_suite, chain }
}
