//! The Server-Descriptor Sanitizer (`spec.md` §4.5).

use crate::builder::{DocBuilder, Slot};
use crate::cert;
use crate::digest;
use crate::doc::{check_master_key_match, consume_pem_block, decode_b64_flexible, parse_timestamp};
use crate::sanitize::{month_of, ScrubResult, SensitiveSanitizer};
use bridgedesc_error::Error;
use sha1::{Digest as _, Sha1};
use sha2::Sha256;
use std::net::Ipv4Addr;

/// Informational lines copied verbatim, after stripping an optional leading
/// `opt ` token to find the keyword.
const WHITELIST: &[&str] = &[
    "accept",
    "platform",
    "proto",
    "uptime",
    "bandwidth",
    "ntor-onion-key",
    "hidden-service-dir",
    "caches-extra-info",
    "allow-single-hop-exits",
    "ipv6-policy",
    "tunnelled-dir-server",
    "bridge-distribution-request",
    "hibernating",
    "protocols",
];

/// Line keywords that introduce a crypto PEM block to be dropped in its
/// entirety (the keyword line itself through the matching `-----END ...`).
const CRYPTO_BLOCK_KEYWORDS: &[&str] = &["onion-key", "signing-key", "onion-key-crosscert"];

/// A scrub still awaiting the bridge's fingerprint and publication month.
enum Pending {
    /// Fill with `scrub_ipv4`.
    Ipv4(Ipv4Addr),
    /// Fill with `scrub_tcp_port`.
    Port(String),
    /// Fill with `scrub_or_address`; on [`ScrubResult::Invalid`] the whole
    /// line (not just the value) is omitted.
    OrAddressLine(String),
}

/// Sanitize one bridge server descriptor.
pub fn sanitize(sanitizer: &mut SensitiveSanitizer, raw: &[u8]) -> Result<Vec<u8>, Error> {
    let text = std::str::from_utf8(raw).map_err(|_| Error::malformed("document is not ASCII"))?;
    let lines: Vec<&str> = text.lines().collect();

    let mut builder = DocBuilder::new();
    builder.append("@type bridge-server-descriptor 1.2\n");

    let mut saw_router = false;
    let mut saw_fingerprint = false;
    let mut saw_published = false;
    let mut published: Option<String> = None;
    let mut fp_bytes: Option<[u8; 20]> = None;
    let mut recovered_master_key_b64: Option<String> = None;
    let mut stored_literal_master_key: Option<String> = None;
    let mut saw_identity_ed25519 = false;
    let mut router_addr: Option<Ipv4Addr> = None;
    let mut router_addr_slot: Option<Slot> = None;

    let mut pending: Vec<(Slot, Pending)> = Vec::new();
    let mut in_skip_crypto = false;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if line.is_empty() {
            i += 1;
            continue;
        }

        if in_skip_crypto {
            if line.starts_with("-----END") {
                in_skip_crypto = false;
            }
            i += 1;
            continue;
        }

        if let Some(rest) = line.strip_prefix("router ") {
            let fields: Vec<&str> = rest.split(' ').collect();
            if fields.len() != 5 {
                return Err(Error::malformed("router line must have exactly 6 tokens"));
            }
            let [nickname, addr, orport, dirport, socksport] = <[&str; 5]>::try_from(fields)
                .expect("checked length above");
            let addr: Ipv4Addr = addr
                .parse()
                .map_err(|_| Error::malformed("router line address is not IPv4"))?;

            builder.append("router ").append(nickname).space();
            let addr_slot = builder.append_slot();
            builder.space();
            let orport_slot = builder.append_slot();
            builder.space();
            let dirport_slot = builder.append_slot();
            builder.space();
            let socksport_slot = builder.append_slot();
            builder.new_line();

            pending.push((addr_slot.clone(), Pending::Ipv4(addr)));
            pending.push((orport_slot, Pending::Port(orport.to_string())));
            pending.push((dirport_slot, Pending::Port(dirport.to_string())));
            pending.push((socksport_slot, Pending::Port(socksport.to_string())));

            router_addr = Some(addr);
            router_addr_slot = Some(addr_slot);
            saw_router = true;
        } else if let Some(addr_port) = line.strip_prefix("or-address ") {
            let slot = builder.append_slot();
            pending.push((slot, Pending::OrAddressLine(addr_port.to_string())));
        } else if let Some(ts) = line.strip_prefix("published ") {
            let _ = parse_timestamp(ts)?;
            builder.append(line).new_line();
            published = Some(ts.to_string());
            saw_published = true;
        } else if let Some(hex_fp) = line.strip_prefix("fingerprint ").or_else(|| line.strip_prefix("opt fingerprint ")) {
            let prefix = if line.starts_with("opt ") { "opt fingerprint " } else { "fingerprint " };
            let bytes = parse_fingerprint_hex(hex_fp)?;
            let hashed = group4(&hex::encode(Sha1::digest(bytes)).to_uppercase());
            builder.append(prefix).append(&hashed).new_line();
            fp_bytes = Some(bytes);
            saw_fingerprint = true;
        } else if line.starts_with("contact ") {
            builder.append("contact somebody\n");
        } else if line == "router-signature" {
            break;
        } else if let Some(rest) = line
            .strip_prefix("extra-info-digest ")
            .or_else(|| line.strip_prefix("opt extra-info-digest "))
        {
            let prefix = if line.starts_with("opt ") { "opt extra-info-digest " } else { "extra-info-digest " };
            let tokens: Vec<&str> = rest.split(' ').collect();
            if tokens.len() > 2 {
                return Err(Error::malformed("extra-info-digest has more than 2 tokens"));
            }
            let sha1_bytes = hex::decode(tokens[0])
                .map_err(|_| Error::malformed("extra-info-digest sha1 is not valid hex"))?;
            let new_sha1 = hex::encode(Sha1::digest(&sha1_bytes)).to_uppercase();
            if let Some(sha256_tok) = tokens.get(1) {
                let sha256_bytes = decode_b64_flexible(sha256_tok)
                    .ok_or_else(|| Error::malformed("extra-info-digest sha256 is not valid base64"))?;
                let once = Sha256::digest(&sha256_bytes);
                let twice = Sha256::digest(once);
                let new_sha256 = digest::base64_no_pad(&twice);
                builder.append(prefix).append(&new_sha1).space().append(&new_sha256).new_line();
            } else {
                builder.append(prefix).append(&new_sha1).new_line();
            }
        } else if let Some(rest) = line.strip_prefix("reject ") {
            if let (Some(addr_str), Some(slot)) = (router_addr.as_ref(), router_addr_slot.as_ref()) {
                let addr_token = rest.split(':').next().unwrap_or(rest);
                if addr_token == addr_str.to_string() {
                    let suffix = &rest[addr_token.len()..];
                    builder.append("reject ");
                    builder.append_existing_slot(slot);
                    builder.append(suffix).new_line();
                    i += 1;
                    continue;
                }
            }
            builder.append(line).new_line();
        } else if line == "identity-ed25519" {
            let (pem_end, body) = consume_pem_block(&lines, i, "-----END ED25519 CERT-----")?;
            i = pem_end;
            saw_identity_ed25519 = true;
            if let Some(cert_bytes) = cert::decode_pem_cert(&body) {
                if let Some(master_b64) = cert::extract_master_key_b64(&cert_bytes) {
                    if let Some(stored) = &stored_literal_master_key {
                        check_master_key_match(stored, &master_b64)?;
                    }
                    builder.append("master-key-ed25519 ").append(&master_b64).new_line();
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
        } else if let Some(rest) = line.strip_prefix("family ") {
            let rewritten: Vec<String> = rest.split(' ').map(rewrite_family_entry).collect::<Result<_, _>>()?;
            builder.append("family ").append(rewritten.join(" ")).new_line();
        } else if line.starts_with("@purpose ") || line == "router-sig-ed25519" || line.starts_with("router-sig-ed25519 ") {
            // dropped
        } else if is_whitelisted(line) {
            builder.append(line).new_line();
        } else if CRYPTO_BLOCK_KEYWORDS.contains(&line) || line.starts_with("ntor-onion-key-crosscert") {
            in_skip_crypto = true;
        } else {
            return Err(Error::malformed(format!("unrecognized server-descriptor line: {line}")));
        }

        i += 1;
    }

    if !(saw_router && saw_fingerprint && saw_published) {
        return Err(Error::malformed(
            "server descriptor missing required router/fingerprint/published line",
        ));
    }
    if let (Some(stored), Some(recovered)) = (&stored_literal_master_key, &recovered_master_key_b64) {
        check_master_key_match(stored, recovered)?;
    }

    let fp_bytes = fp_bytes.expect("saw_fingerprint implies fp_bytes is set");
    let month = published.as_deref().map(month_of).expect("saw_published implies published is set").to_string();

    for (slot, kind) in pending {
        match kind {
            Pending::Ipv4(addr) => match sanitizer.scrub_ipv4(addr, &fp_bytes, &month) {
                ScrubResult::Ok(s) => slot.fill(s),
                ScrubResult::Invalid => return Err(Error::malformed("router address rejected")),
                ScrubResult::Disabled => return Err(disabled_err()),
            },
            Pending::Port(p) => match sanitizer.scrub_tcp_port(&p, &fp_bytes, &month) {
                ScrubResult::Ok(s) => slot.fill(s),
                ScrubResult::Invalid => return Err(Error::malformed("router port rejected")),
                ScrubResult::Disabled => return Err(disabled_err()),
            },
            Pending::OrAddressLine(addr_port) => match sanitizer.scrub_or_address(&addr_port, &fp_bytes, &month) {
                ScrubResult::Ok(s) => slot.fill(format!("or-address {s}\n")),
                ScrubResult::Invalid => {
                    tracing::warn!(addr_port, "dropping invalid or-address line");
                    slot.fill("");
                }
                ScrubResult::Disabled => return Err(disabled_err()),
            },
        }
    }

    let router_digest = digest::sha1_hex_of_region(raw, b"router ", b"\nrouter-signature\n")
        .ok_or_else(|| Error::malformed("could not locate router .. router-signature region"))?;
    builder.append("router-digest ").append(router_digest.to_uppercase()).new_line();

    if saw_identity_ed25519 {
        if let Some(sha256) = digest::sha256_base64_of_region(raw, b"router ", b"\n-----END SIGNATURE-----\n") {
            builder.append("router-digest-sha256 ").append(&sha256).new_line();
        }
    }

    Ok(builder.to_bytes())
}

/// Parse a (possibly space-grouped) hex fingerprint into 20 bytes.
fn parse_fingerprint_hex(s: &str) -> Result<[u8; 20], Error> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&cleaned).map_err(|_| Error::malformed("fingerprint is not valid hex"))?;
    bytes.try_into().map_err(|_| Error::malformed("fingerprint is not 20 bytes"))
}

/// Uppercase-hex `s`, grouped into 4-character blocks separated by spaces.
fn group4(s: &str) -> String {
    s.as_bytes()
        .chunks(4)
        .map(|c| std::str::from_utf8(c).expect("hex is ASCII"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `line`'s keyword (after stripping an optional `opt ` prefix) is
/// on the informational-line whitelist.
fn is_whitelisted(line: &str) -> bool {
    let body = line.strip_prefix("opt ").unwrap_or(line);
    let keyword = body.split(' ').next().unwrap_or(body);
    WHITELIST.contains(&keyword)
}

/// Rewrite one `family` entry: `$<hex-fp>[<suffix>]` becomes
/// `$<sha1_hex(fp).upper><suffix>`; anything else (a bare nickname) is
/// unchanged.
fn rewrite_family_entry(entry: &str) -> Result<String, Error> {
    let Some(rest) = entry.strip_prefix('$') else {
        return Ok(entry.to_string());
    };
    let split_at = rest.find(['~', '=']).unwrap_or(rest.len());
    let (hex_part, suffix) = rest.split_at(split_at);
    let bytes = hex::decode(hex_part).map_err(|_| Error::malformed("family entry fingerprint is not valid hex"))?;
    let hashed = hex::encode(Sha1::digest(&bytes)).to_uppercase();
    Ok(format!("${hashed}{suffix}"))
}

/// The error used when the sensitive-parts sanitizer has latched into
/// `HashingDisabled` mid-document.
fn disabled_err() -> Error {
    Error::Invalid {
        kind: bridgedesc_error::ErrorKind::PersistenceFailure,
        msg: "hashing disabled; skipping document".into(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bridgedesc_persist::SecretsStore;

    fn sanitizer(dir: &std::path::Path) -> SensitiveSanitizer {
        let secrets = SecretsStore::load(dir.join("bridge-ip-secrets")).unwrap();
        SensitiveSanitizer::new(false, secrets, None)
    }

    fn sample_cert(master_key: [u8; 32]) -> String {
        let mut cert = vec![0u8; 40];
        cert[0] = 0x01;
        cert[1] = 0x04;
        cert[6] = 0x01;
        cert[39] = 1;
        cert.extend_from_slice(&32u16.to_be_bytes());
        cert.push(0x04);
        cert.push(0);
        cert.extend_from_slice(&master_key);
        base64::encode(&cert)
    }

    fn sample_doc() -> Vec<u8> {
        let cert_b64 = sample_cert([0xAB; 32]);
        let fp_hex = hex::encode([0xFFu8; 20]);
        format!(
            "router Foo 192.0.2.7 9001 9030 0\n\
             identity-ed25519\n\
             -----BEGIN ED25519 CERT-----\n\
             {cert_b64}\n\
             -----END ED25519 CERT-----\n\
             published 2020-01-15 09:00:00\n\
             fingerprint {fp_hex}\n\
             contact me@example.com\n\
             router-signature\n\
             -----BEGIN SIGNATURE-----\n\
             AAAA\n\
             -----END SIGNATURE-----\n"
        )
        .into_bytes()
    }

    #[test]
    fn s3_server_descriptor_with_ed25519_cert() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = sanitizer(dir.path());
        let out = sanitize(&mut s, &sample_doc()).unwrap();
        let out = String::from_utf8(out).unwrap();

        let expected_master_key = crate::digest::base64_no_pad(&[0xABu8; 32]);
        assert!(out.contains(&format!("master-key-ed25519 {expected_master_key}")));
        assert!(out.contains("contact somebody"));
        let expected_fp = hex::encode(Sha1::digest([0xFFu8; 20])).to_uppercase();
        assert!(out.contains(&group4(&expected_fp)));
        assert!(out.contains("router-digest-sha256 "));
        assert!(out.contains("router-digest "));
        assert!(!out.contains("me@example.com"));
    }

    #[test]
    fn s5_malformed_router_line_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = sanitizer(dir.path());
        let doc = b"router Foo 192.0.2.7 9001 9030\nrouter-signature\n".to_vec();
        assert!(sanitize(&mut s, &doc).is_err());
    }

    #[test]
    fn unrecognized_line_rejects_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = sanitizer(dir.path());
        let mut doc = String::from_utf8(sample_doc()).unwrap();
        let idx = doc.find("router-signature").unwrap();
        doc.insert_str(idx, "totally-unknown-line\n");
        assert!(sanitize(&mut s, doc.as_bytes()).is_err());
    }

    #[test]
    fn family_entries_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = sanitizer(dir.path());
        let fp_hex = hex::encode([0x11u8; 20]);
        let mut doc = String::from_utf8(sample_doc()).unwrap();
        doc = doc.replacen(
            "contact me@example.com\n",
            &format!("family ${fp_hex}~Nick other-nick\ncontact me@example.com\n"),
            1,
        );
        let out = sanitize(&mut s, doc.as_bytes()).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("other-nick"));
        assert!(!out.contains(&fp_hex));
    }

    #[test]
    fn reject_self_address_reuses_scrubbed_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = sanitizer(dir.path());
        let mut doc = String::from_utf8(sample_doc()).unwrap();
        doc = doc.replacen("contact me@example.com\n", "reject 192.0.2.7:*\ncontact me@example.com\n", 1);
        let out = sanitize(&mut s, doc.as_bytes()).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("reject 127.0.0.1:*"));
        assert!(!out.contains("192.0.2.7"));
    }
}
