//! Ed25519 identity-certificate parsing: recovering the onion master public
//! key from the fixed-layout binary certificate embedded in an
//! `identity-ed25519` PEM block.

/// Certificate version this parser understands.
const CERT_VERSION: u8 = 0x01;
/// Cert type for an ed25519 identity certificate signed by a master key.
const CERT_TYPE_IDENTITY: u8 = 0x04;
/// Certified-key-type byte meaning "ed25519 public key".
const CERTIFIED_KEY_TYPE_ED25519: u8 = 0x01;
/// Extension type carrying the signing (master) key.
const EXTENSION_TYPE_SIGNING_KEY: u8 = 0x04;
/// Length in bytes of the master public key extension body.
const MASTER_KEY_LEN: usize = 32;

/// Extract the 32-byte master public key from a decoded ed25519 identity
/// certificate, if present, and return it base64-encoded without padding.
///
/// Returns `None` (after logging) on any length or type mismatch, per the
/// certificate's fixed binary layout:
///
/// - byte 0: version, must be `0x01`.
/// - byte 1: cert type, must be `0x04`.
/// - byte 6: certified key type, must be `0x01`.
/// - byte 39: extension count; `0x00` means no extensions.
/// - extensions start at offset 40, each `<len:u16 BE><type:u8><flags:u8><body>`;
///   a `len == 32, type == 4` extension's body is the master public key.
pub fn extract_master_key_b64(cert_bytes: &[u8]) -> Option<String> {
    let bytes = extract_master_key_bytes(cert_bytes)?;
    Some(crate::digest::base64_no_pad(&bytes))
}

/// As [`extract_master_key_b64`], but returns the raw 32 key bytes.
fn extract_master_key_bytes(cert: &[u8]) -> Option<[u8; MASTER_KEY_LEN]> {
    if cert.len() < 40 {
        tracing::warn!(len = cert.len(), "ed25519 cert too short to contain a header");
        return None;
    }
    if cert[0] != CERT_VERSION {
        tracing::warn!(version = cert[0], "unsupported ed25519 cert version");
        return None;
    }
    if cert[1] != CERT_TYPE_IDENTITY {
        tracing::warn!(cert_type = cert[1], "unexpected ed25519 cert type");
        return None;
    }
    if cert[6] != CERTIFIED_KEY_TYPE_ED25519 {
        tracing::warn!(key_type = cert[6], "unexpected certified key type");
        return None;
    }

    let ext_count = cert[39];
    if ext_count == 0 {
        tracing::warn!("ed25519 cert has no extensions; no master key present");
        return None;
    }

    let mut cursor = 40usize;
    for _ in 0..ext_count {
        if cursor + 4 > cert.len() {
            tracing::warn!("ed25519 cert extension header runs past end of certificate");
            return None;
        }
        let ext_len = u16::from_be_bytes([cert[cursor], cert[cursor + 1]]) as usize;
        let ext_type = cert[cursor + 2];
        // byte cursor+3 is the flags byte; unused here.
        let body_start = cursor + 4;
        let body_end = match body_start.checked_add(ext_len) {
            Some(end) if end <= cert.len() => end,
            _ => {
                tracing::warn!("ed25519 cert extension body runs past end of certificate");
                return None;
            }
        };

        if ext_len == MASTER_KEY_LEN && ext_type == EXTENSION_TYPE_SIGNING_KEY {
            let mut key = [0u8; MASTER_KEY_LEN];
            key.copy_from_slice(&cert[body_start..body_end]);
            return Some(key);
        }

        cursor = body_end;
    }

    tracing::warn!("ed25519 cert has no master-key extension (len=32, type=4)");
    None
}

/// Extract the base64 certificate body between the `-----BEGIN ED25519
/// CERT-----` / `-----END ED25519 CERT-----` PEM markers and decode it.
pub fn decode_pem_cert(pem: &str) -> Option<Vec<u8>> {
    let start = pem.find("-----BEGIN ED25519 CERT-----")? + "-----BEGIN ED25519 CERT-----".len();
    let end = pem[start..].find("-----END ED25519 CERT-----")? + start;
    let body: String = pem[start..end].chars().filter(|c| !c.is_whitespace()).collect();
    base64::decode(&body).ok()
}

#[cfg(test)]
mod test {
    use super::*;

    fn build_cert(master_key: [u8; 32]) -> Vec<u8> {
        let mut cert = vec![0u8; 40];
        cert[0] = CERT_VERSION;
        cert[1] = CERT_TYPE_IDENTITY;
        cert[6] = CERTIFIED_KEY_TYPE_ED25519;
        cert[39] = 1; // one extension
        cert.extend_from_slice(&32u16.to_be_bytes());
        cert.push(EXTENSION_TYPE_SIGNING_KEY);
        cert.push(0); // flags
        cert.extend_from_slice(&master_key);
        cert
    }

    #[test]
    fn extracts_master_key() {
        let key = [0xAB; 32];
        let cert = build_cert(key);
        let got = extract_master_key_bytes(&cert).unwrap();
        assert_eq!(got, key);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut cert = build_cert([1; 32]);
        cert[0] = 0x02;
        assert!(extract_master_key_bytes(&cert).is_none());
    }

    #[test]
    fn rejects_no_extensions() {
        let mut cert = build_cert([1; 32]);
        cert[39] = 0;
        cert.truncate(40);
        assert!(extract_master_key_bytes(&cert).is_none());
    }

    #[test]
    fn skips_unrelated_extensions_before_master_key() {
        let mut cert = vec![0u8; 40];
        cert[0] = CERT_VERSION;
        cert[1] = CERT_TYPE_IDENTITY;
        cert[6] = CERTIFIED_KEY_TYPE_ED25519;
        cert[39] = 2;
        // first: unrelated extension, len 4
        cert.extend_from_slice(&4u16.to_be_bytes());
        cert.push(0x09);
        cert.push(0);
        cert.extend_from_slice(&[1, 2, 3, 4]);
        // second: the master key extension
        let key = [0x42; 32];
        cert.extend_from_slice(&32u16.to_be_bytes());
        cert.push(EXTENSION_TYPE_SIGNING_KEY);
        cert.push(0);
        cert.extend_from_slice(&key);

        assert_eq!(extract_master_key_bytes(&cert).unwrap(), key);
    }

    #[test]
    fn pem_roundtrip() {
        let key = [0x11; 32];
        let cert = build_cert(key);
        let encoded = base64::encode(&cert);
        let pem = format!("identity-ed25519\n-----BEGIN ED25519 CERT-----\n{encoded}\n-----END ED25519 CERT-----\n");
        let decoded = decode_pem_cert(&pem).unwrap();
        assert_eq!(decoded, cert);
        assert_eq!(
            extract_master_key_b64(&decoded).unwrap(),
            crate::digest::base64_no_pad(&key)
        );
    }
}
