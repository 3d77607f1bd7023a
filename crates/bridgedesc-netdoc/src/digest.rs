//! The descriptor digester: SHA-1 and SHA-256 digests over byte ranges of
//! the original input, keyed by literal start/end tokens.

use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Locate the inclusive byte range `[start_token .. end_token]` in `bytes`:
/// the first occurrence of `start_token`, through the end of the first
/// occurrence of `end_token` that begins at or after the start of
/// `start_token`.
fn find_region<'a>(bytes: &'a [u8], start_token: &[u8], end_token: &[u8]) -> Option<&'a [u8]> {
    let start = find_subslice(bytes, start_token, 0)?;
    let end = find_subslice(bytes, end_token, start)?;
    let end_incl = end + end_token.len();
    Some(&bytes[start..end_incl])
}

/// Find the first occurrence of `needle` in `haystack` at or after `from`.
fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Compute `sha1_hex(sha1(region))` — the hex encoding of the SHA-1 digest
/// of the token-delimited region — matching Tor's descriptor-digest
/// convention. Returns `None` if either token is missing.
pub fn sha1_hex_of_region(bytes: &[u8], start_token: &[u8], end_token: &[u8]) -> Option<String> {
    let region = find_region(bytes, start_token, end_token)?;
    Some(hex::encode(Sha1::digest(region)))
}

/// Compute base64 (padding stripped) of `sha256(sha256(region))` over the
/// token-delimited region. Returns `None` if either token is missing.
pub fn sha256_base64_of_region(bytes: &[u8], start_token: &[u8], end_token: &[u8]) -> Option<String> {
    let region = find_region(bytes, start_token, end_token)?;
    let once = Sha256::digest(region);
    let twice = Sha256::digest(once);
    Some(base64_no_pad(&twice))
}

/// Base64-encode `bytes` using the standard alphabet with padding stripped.
pub fn base64_no_pad(bytes: &[u8]) -> String {
    let config = base64::Config::new(base64::CharacterSet::Standard, false);
    base64::encode_config(bytes, config)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn finds_inclusive_region() {
        let doc = b"preamble\nrouter foo\nbody\nrouter-signature\ntrailer";
        let region = find_region(doc, b"router ", b"\nrouter-signature\n").unwrap();
        assert_eq!(region, &doc[9..44]);
    }

    #[test]
    fn missing_token_is_none() {
        let doc = b"router foo\nno signature here";
        assert!(sha1_hex_of_region(doc, b"router ", b"\nrouter-signature\n").is_none());
    }

    #[test]
    fn end_token_must_follow_start() {
        let doc = b"\nrouter-signature\nrouter foo\n";
        // end_token occurs before start_token; region search must fail.
        assert!(find_region(doc, b"router ", b"\nrouter-signature\n").is_none());
    }

    #[test]
    fn sha1_hex_matches_manual_digest() {
        let doc = b"router foo\nrouter-signature\n";
        let got = sha1_hex_of_region(doc, b"router ", b"\nrouter-signature\n").unwrap();
        let want = hex::encode(Sha1::digest(&doc[..]));
        assert_eq!(got, want);
    }

    #[test]
    fn sha256_base64_is_double_hashed_and_unpadded() {
        let doc = b"router foo\n-----END SIGNATURE-----\n";
        let got = sha256_base64_of_region(doc, b"router ", b"\n-----END SIGNATURE-----\n").unwrap();
        let once = Sha256::digest(&doc[..]);
        let twice = Sha256::digest(once);
        let want = base64_no_pad(&twice);
        assert_eq!(got, want);
        assert!(!got.ends_with('='));
    }
}
