use std::fmt;
use std::str::FromStr;

use sha1::{Digest, Sha1};

/// Digest-based identity of a certificate's public key material.
///
/// The canonical text form is a series of two-digit uppercase hexadecimal
/// octets separated by single colons, e.g. `32:45:0D:44`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintError {
    #[error("malformed fingerprint {input:?}: {reason}")]
    MalformedFingerprint { input: String, reason: &'static str },
}

impl Fingerprint {
    /// SHA-1 over the DER-encoded SubjectPublicKeyInfo.
    pub fn of_spki(spki: &[u8]) -> Self {
        Self(Sha1::digest(spki).to_vec())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        let malformed = |reason| FingerprintError::MalformedFingerprint {
            input: s.to_string(),
            reason,
        };
        let mut out = Vec::with_capacity(s.len() / 3 + 1);
        for seg in s.split(':') {
            if seg.is_empty() {
                return Err(malformed("empty segment"));
            }
            if seg.len() != 2 {
                return Err(malformed("segment is not a two-digit octet"));
            }
            if !seg.bytes().all(|c| c.is_ascii_hexdigit()) {
                return Err(malformed("invalid hex character"));
            }
            let byte = u8::from_str_radix(seg, 16).map_err(|_| malformed("invalid hex character"))?;
            out.push(byte);
        }
        Ok(Self(out))
    }
}

/// Parse a colon-delimited fingerprint.
pub fn parse_fingerprint(s: &str) -> Result<Fingerprint, FingerprintError> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_uppercase_colon_delimited() {
        let fp = Fingerprint::from_bytes(vec![0x32, 0x45, 0x0d, 0xff]);
        assert_eq!(fp.to_string(), "32:45:0D:FF");
    }

    #[test]
    fn parses_known_fingerprint() {
        let txt = "32:45:0D:44:BD:21:9D:17:9C:D7:CE:3B:74:90:E8:A5:AD:58:FE:01";
        let fp = parse_fingerprint(txt).unwrap();
        assert_eq!(fp.as_bytes().len(), 20);
        assert_eq!(fp.to_string(), txt);
    }

    #[test]
    fn rejects_odd_length_segment() {
        let err = parse_fingerprint("12:3:45").unwrap_err();
        assert!(matches!(err, FingerprintError::MalformedFingerprint { .. }));
    }

    #[test]
    fn rejects_non_hex() {
        assert!(parse_fingerprint("ZZ:11").is_err());
        assert!(parse_fingerprint("+1:11").is_err());
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(parse_fingerprint(":AB").is_err());
        assert!(parse_fingerprint("AB:").is_err());
        assert!(parse_fingerprint("AB::CD").is_err());
    }

    #[test]
    fn empty_round_trips() {
        let fp = parse_fingerprint("").unwrap();
        assert!(fp.is_empty());
        assert_eq!(fp.to_string(), "");
    }

    #[test]
    fn spki_digest_is_160_bits() {
        let fp = Fingerprint::of_spki(b"not really a key");
        assert_eq!(fp.as_bytes().len(), 20);
        assert_eq!(fp, Fingerprint::of_spki(b"not really a key"));
    }
}
