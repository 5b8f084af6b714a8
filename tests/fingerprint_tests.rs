use cert_archiver::fingerprint::{parse_fingerprint, Fingerprint, FingerprintError};
use proptest::prelude::*;

#[test]
fn known_fingerprint_round_trips() {
    let txt = "32:45:0D:44:BD:21:9D:17:9C:D7:CE:3B:74:90:E8:A5:AD:58:FE:01";
    let fp: Fingerprint = txt.parse().expect("parse ok");
    assert_eq!(fp.to_string(), txt);
}

#[test]
fn malformed_inputs_rejected() {
    for bad in ["12:3:45", "ZZ:11", "123:45", "AB::CD", ":AB", "AB:", "AB CD"] {
        assert!(
            matches!(parse_fingerprint(bad), Err(FingerprintError::MalformedFingerprint { .. })),
            "{bad:?} should be rejected"
        );
    }
}

proptest! {
    #[test]
    fn parse_inverts_format(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let fp = Fingerprint::from_bytes(bytes);
        prop_assert_eq!(parse_fingerprint(&fp.to_string()).unwrap(), fp);
    }

    #[test]
    fn format_inverts_parse_on_canonical_text(s in "[0-9A-F]{2}(:[0-9A-F]{2}){0,31}") {
        prop_assert_eq!(parse_fingerprint(&s).unwrap().to_string(), s);
    }
}
