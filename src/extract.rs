use tracing::{debug, warn};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::fingerprint::Fingerprint;
use crate::types::CertificateRecord;

/// Where a certificate was observed; only used to give diagnostics context.
#[derive(Debug, Clone, Copy)]
pub struct CertMeta<'a> {
    pub host: &'a str,
    pub ip: &'a str,
    pub index: usize,
}

/// Parse `der` and build a record. Returns `None` when the blob is not a
/// certificate at all; every other anomaly degrades to best-effort fields.
pub fn extract(der: &[u8], meta: CertMeta<'_>) -> Option<CertificateRecord> {
    match parse_x509_certificate(der) {
        Ok((_, cert)) => Some(extract_parsed(&cert, der, meta)),
        Err(e) => {
            warn!(host = meta.host, ip = meta.ip, index = meta.index, error = %e, "unable to parse presented certificate");
            None
        }
    }
}

pub fn extract_parsed(cert: &X509Certificate<'_>, der: &[u8], meta: CertMeta<'_>) -> CertificateRecord {
    let subject = cert.subject();
    let issuer = cert.issuer();
    let validity = cert.validity();

    CertificateRecord {
        subject_cn: join_legacy("subject CN", values(subject.iter_common_name()), meta),
        subject_o: join_legacy("subject O", values(subject.iter_organization()), meta),
        subject_ou: values(subject.iter_organizational_unit()),
        subject_country: values(subject.iter_country()),
        issuer_cn: join_legacy("issuer CN", values(issuer.iter_common_name()), meta),
        issuer_o: join_legacy("issuer O", values(issuer.iter_organization()), meta),
        issuer_ou: values(issuer.iter_organizational_unit()),
        issuer_country: values(issuer.iter_country()),
        not_before: validity.not_before.to_datetime(),
        not_after: validity.not_after.to_datetime(),
        serial_number: cert.tbs_certificate.serial.to_string(),
        x509_version: cert.version().0 + 1,
        signature_algorithm: cert.signature_algorithm.algorithm.to_id_string(),
        fingerprint_sha1: spki_fingerprint(cert, meta)
            .map(|fp| fp.to_string())
            .unwrap_or_default(),
        raw: der.to_vec(),
    }
}

/// X25519 and Ed25519: not decoded by x509-parser, still fingerprintable.
const EDWARDS_KEYS: [&str; 2] = ["1.3.101.110", "1.3.101.112"];

/// Fingerprint of the certificate's public key, or `None` when the key
/// material cannot be decoded or uses an algorithm we do not know.
pub fn spki_fingerprint(cert: &X509Certificate<'_>, meta: CertMeta<'_>) -> Option<Fingerprint> {
    let spki = cert.public_key();
    let algorithm = spki.algorithm.algorithm.to_id_string();
    let reason = match spki.parsed() {
        Ok(PublicKey::Unknown(_)) if !EDWARDS_KEYS.contains(&algorithm.as_str()) => {
            "unsupported public key algorithm".to_string()
        }
        Ok(_) => return Some(Fingerprint::of_spki(spki.raw)),
        Err(e) => e.to_string(),
    };
    warn!(
        host = meta.host,
        index = meta.index,
        algorithm = %algorithm,
        error = %reason,
        "failed to extract the fingerprint"
    );
    None
}

fn values<'a, 'b: 'a>(attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> Vec<String> {
    attrs
        .filter_map(|attr| match attr.as_str() {
            Ok(s) => Some(s.to_string()),
            Err(e) => {
                debug!(error = %e, "skipping undecodable name attribute");
                None
            }
        })
        .collect()
}

/// Collapse a multi-valued attribute into the single string the archive
/// schema expects. Several values are joined with newlines.
fn join_legacy(field: &str, values: Vec<String>, meta: CertMeta<'_>) -> String {
    match values.len() {
        0 => String::new(),
        1 => values.into_iter().next().unwrap_or_default(),
        n => {
            warn!(
                host = meta.host,
                index = meta.index,
                field,
                count = n,
                "multi-valued attribute, joining lines with newlines"
            );
            values.join("\n")
        }
    }
}

/// `C=/O=/OU=/CN=` rendering used for verbose output.
pub fn describe_subject(record: &CertificateRecord) -> String {
    format!(
        "C={:?}/O={}/OU={:?}/CN={}",
        record.subject_country, record.subject_o, record.subject_ou, record.subject_cn
    )
}
