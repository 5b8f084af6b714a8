use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Why a probe produced no certificate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ProbeFailure {
    #[error("failed to resolve {host}: {reason}")]
    Resolution { host: String, reason: String },
    #[error("failed to connect to {addr}: {reason}")]
    Connection { addr: String, reason: String },
}

/// Result of one TLS handshake, handed back by a `TlsDialer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSession {
    /// Negotiated protocol version as its wire value (0x0303 = TLS 1.2).
    pub protocol: u16,
    /// Negotiated cipher suite as its IANA code point.
    pub cipher_suite: u16,
    /// DER certificates as presented, leaf first.
    pub chain: Vec<Vec<u8>>,
}

/// Flat, serializable view of one X.509 certificate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub subject_cn: String,
    pub subject_o: String,
    pub subject_ou: Vec<String>,
    pub subject_country: Vec<String>,
    pub issuer_cn: String,
    pub issuer_o: String,
    pub issuer_ou: Vec<String>,
    pub issuer_country: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    /// Decimal rendering of the serial, which may exceed any fixed-width integer.
    pub serial_number: String,
    pub x509_version: u32,
    pub signature_algorithm: String,
    /// Canonical SPKI fingerprint, empty when it could not be computed.
    pub fingerprint_sha1: String,
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// One presented certificate together with the connection it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedCertificate {
    pub protocol: u16,
    pub cipher_suite: u16,
    /// Position in the chain, 0 for the leaf.
    pub index: usize,
    pub der: Vec<u8>,
    /// `None` when the DER blob could not be parsed.
    pub record: Option<CertificateRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Failed(ProbeFailure),
    Certificate(ProbedCertificate),
}

/// One observed outcome for one address of one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub host: String,
    /// Address the outcome refers to. Empty when resolution failed, bracketed for IPv6.
    pub ip: String,
    pub timestamp: OffsetDateTime,
    pub outcome: ProbeOutcome,
}

impl Probe {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Failed(_))
    }

    pub fn failure(&self) -> Option<&ProbeFailure> {
        match &self.outcome {
            ProbeOutcome::Failed(f) => Some(f),
            ProbeOutcome::Certificate(_) => None,
        }
    }

    pub fn certificate(&self) -> Option<&ProbedCertificate> {
        match &self.outcome {
            ProbeOutcome::Failed(_) => None,
            ProbeOutcome::Certificate(c) => Some(c),
        }
    }
}

/// Number of new certificates observed on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertStat {
    pub host: String,
    pub new_certs: usize,
}

/// Everything a worker reports to the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    HostStarted(String),
    Probe(Probe),
    HostFinished(String),
}

/// Aggregate counters returned once a scan has finished.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub hosts_total: usize,
    pub hosts_dispatched: usize,
    pub hosts_dropped: usize,
    pub probes_saved: u64,
    pub probes_failed_to_save: u64,
}
