//! The Extra-Info-Descriptor Sanitizer (`spec.md` §4.6).
//!
//! Simpler than the server-descriptor sanitizer (no addresses or ports to
//! defer), so it has no need for the builder's placeholder slots: every
//! transformed value is known at the point its line is read.

use crate::cert;
use crate::digest;
use crate::doc::{check_master_key_match, consume_pem_block};
use bridgedesc_error::Error;
use sha1::{Digest, Sha1};
use sha2::Sha256;

/// Statistics-family line keywords copied verbatim, matched by exact keyword
/// or by a `-`-terminated glob prefix.
const STATS_EXACT: &[&str] = &[
    "write-history",
    "read-history",
    "ipv6-write-history",
    "ipv6-read-history",
    "conn-bi-direct",
    "ipv6-conn-bi-direct",
    "padding-counts",
];

/// Statistics-family glob prefixes (`geoip-stats`, `bridge-stats`, ...).
const STATS_PREFIXES: &[&str] = &["geoip-", "bridge-", "dirreq-", "cell-", "entry-", "exit-", "hidserv-"];

/// Sanitize one bridge extra-info descriptor.
pub fn sanitize(raw: &[u8]) -> Result<Vec<u8>, Error> {
    let text = std::str::from_utf8(raw).map_err(|_| Error::malformed("document is not ASCII"))?;
    let lines: Vec<&str> = text.lines().collect();

    let mut out = String::new();
    out.push_str("@type bridge-extra-info 1.3\n");

    let mut saw_extra_info = false;
    let mut saw_published = false;
    let mut recovered_master_key_b64: Option<String> = None;
    let mut stored_literal_master_key: Option<String> = None;
    let mut saw_identity_ed25519 = false;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if line.is_empty() {
            i += 1;
            continue;
        }

        if let Some(rest) = line.strip_prefix("extra-info ") {
            let fields: Vec<&str> = rest.split(' ').collect();
            if fields.len() != 2 {
                return Err(Error::malformed("extra-info line must have exactly 3 tokens"));
            }
            let [nickname, fp_hex] = <[&str; 2]>::try_from(fields).expect("checked length above");
            let fp_bytes = hex::decode(fp_hex).map_err(|_| Error::malformed("extra-info fingerprint is not valid hex"))?;
            let hashed = hex::encode(Sha1::digest(&fp_bytes)).to_uppercase();
            out.push_str(&format!("extra-info {nickname} {hashed}\n"));
            saw_extra_info = true;
        } else if let Some(ts) = line.strip_prefix("published ") {
            let _ = crate::doc::parse_timestamp(ts)?;
            out.push_str(line);
            out.push('\n');
            saw_published = true;
        } else if let Some(rest) = line.strip_prefix("transport ") {
            let fields: Vec<&str> = rest.split(' ').collect();
            if fields.len() <= 1 {
                return Err(Error::malformed("transport line is missing its address"));
            }
            out.push_str(&format!("transport {}\n", fields[0]));
        } else if line.starts_with("transport-info") {
            // dropped
        } else if line == "identity-ed25519" {
            let (pem_end, body) = consume_pem_block(&lines, i, "-----END ED25519 CERT-----")?;
            i = pem_end;
            saw_identity_ed25519 = true;
            if let Some(cert_bytes) = cert::decode_pem_cert(&body) {
                if let Some(master_b64) = cert::extract_master_key_b64(&cert_bytes) {
                    if let Some(stored) = &stored_literal_master_key {
                        check_master_key_match(stored, &master_b64)?;
                    }
                    out.push_str(&format!("master-key-ed25519 {master_b64}\n"));
                    recovered_master_key_b64 = Some(master_b64);
                } else {
                    tracing::warn!("identity-ed25519 certificate had no recoverable master key");
                }
            } else {
                tracing::warn!("identity-ed25519 PEM block could not be decoded");
            }
            continue;
        } else if let Some(k) = line.strip_prefix("master-key-ed25519 ") {
            if let Some(recovered) = &recovered_master_key_b64 {
                check_master_key_match(k, recovered)?;
            } else {
                stored_literal_master_key = Some(k.to_string());
            }
        } else if line == "router-signature" {
            break;
        } else if line == "router-sig-ed25519" || line.starts_with("router-sig-ed25519 ") {
            // dropped
        } else if is_stats_line(line) {
            out.push_str(line);
            out.push('\n');
        } else {
            return Err(Error::malformed(format!("unrecognized extra-info line: {line}")));
        }

        i += 1;
    }

    if !(saw_extra_info && saw_published) {
        return Err(Error::malformed("extra-info descriptor missing required extra-info/published line"));
    }
    if let (Some(stored), Some(recovered)) = (&stored_literal_master_key, &recovered_master_key_b64) {
        check_master_key_match(stored, recovered)?;
    }

    let router_digest = digest::sha1_hex_of_region(raw, b"extra-info ", b"\nrouter-signature\n")
        .ok_or_else(|| Error::malformed("could not locate extra-info .. router-signature region"))?;
    out.push_str(&format!("router-digest {}\n", router_digest.to_uppercase()));

    if saw_identity_ed25519 {
        if let Some(sha256) = digest::sha256_base64_of_region(raw, b"extra-info ", b"\n-----END SIGNATURE-----\n") {
            out.push_str(&format!("router-digest-sha256 {sha256}\n"));
        }
    }

    Ok(out.into_bytes())
}

/// Whether `line` belongs to the statistics-family whitelist copied
/// verbatim: an exact keyword match, or a `-`-joined glob prefix.
fn is_stats_line(line: &str) -> bool {
    let keyword = line.split(' ').next().unwrap_or(line);
    STATS_EXACT.contains(&keyword) || STATS_PREFIXES.iter().any(|p| keyword.starts_with(p))
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_doc() -> Vec<u8> {
        let fp_hex = hex::encode([0x11u8; 20]);
        format!(
            "extra-info Foo {fp_hex}\n\
             published 2020-01-15 10:00:00\n\
             transport obfs4 192.0.2.7:443 cert=AAAA\n\
             transport-info obfs4 secret\n\
             write-history 2020-01-15 10:00:00 (900 s) 1,2,3\n\
             router-signature\n\
             -----BEGIN SIGNATURE-----\n\
             AAAA\n\
             -----END SIGNATURE-----\n"
        )
        .into_bytes()
    }

    #[test]
    fn s4_extra_info_with_transport_info() {
        let out = sanitize(&sample_doc()).unwrap();
        let out = String::from_utf8(out).unwrap();

        let expected_fp = hex::encode(Sha1::digest([0x11u8; 20])).to_uppercase();
        assert!(out.contains(&format!("extra-info Foo {expected_fp}")));
        assert!(out.contains("transport obfs4\n"));
        assert!(!out.contains("transport-info"));
        assert!(!out.contains("192.0.2.7"));
        assert!(out.contains("write-history 2020-01-15 10:00:00 (900 s) 1,2,3"));
        assert!(out.contains("router-digest "));
    }

    #[test]
    fn transport_without_address_is_rejected() {
        let doc = b"extra-info Foo 1111111111111111111111111111111111111111\n\
published 2020-01-15 10:00:00\n\
transport obfs4\n\
router-signature\n"
            .to_vec();
        assert!(sanitize(&doc).is_err());
    }

    #[test]
    fn unrecognized_line_rejects_descriptor() {
        let mut doc = String::from_utf8(sample_doc()).unwrap();
        let idx = doc.find("router-signature").unwrap();
        doc.insert_str(idx, "mystery-line 123\n");
        assert!(sanitize(doc.as_bytes()).is_err());
    }

    #[test]
    fn geoip_stats_prefix_copied_verbatim() {
        let mut doc = String::from_utf8(sample_doc()).unwrap();
        doc = doc.replacen(
            "router-signature",
            "geoip-stats foo=1,bar=2\nrouter-signature",
            1,
        );
        let out = sanitize(doc.as_bytes()).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("geoip-stats foo=1,bar=2"));
    }
}
