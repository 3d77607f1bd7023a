//! The three document sanitizers: line-oriented state machines that share
//! the builder, digester, and sensitive-parts sanitizer defined in the
//! parent module.

pub mod extrainfo;
pub mod netstatus;
pub mod serverdesc;

use bridgedesc_error::Error;

/// Decode a base64 string that may or may not carry `=` padding.
pub(crate) fn decode_b64_flexible(s: &str) -> Option<Vec<u8>> {
    base64::decode_config(s, base64::STANDARD_NO_PAD)
        .or_else(|_| base64::decode_config(s, base64::STANDARD))
        .ok()
}

/// Parse a `"YYYY-MM-DD HH:MM:SS"` timestamp into a `chrono::NaiveDateTime`.
pub(crate) fn parse_timestamp(s: &str) -> Result<chrono::NaiveDateTime, Error> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map_err(|_| Error::malformed(format!("not a recognized timestamp: {s}")))
}

/// Consume `lines[start..]` through (and including) a line equal to
/// `end_marker`, returning the index just past it and the joined block text
/// (including the line at `start`). Used by the server-descriptor and
/// extra-info sanitizers to swallow a multi-line `identity-ed25519` PEM
/// block without losing track of where the line scan should resume.
pub(crate) fn consume_pem_block(
    lines: &[&str],
    start: usize,
    end_marker: &str,
) -> Result<(usize, String), Error> {
    let mut j = start;
    loop {
        if j >= lines.len() {
            return Err(Error::malformed("identity-ed25519 PEM block is missing its END marker"));
        }
        if lines[j] == end_marker {
            let body = lines[start..=j].join("\n");
            return Ok((j + 1, body));
        }
        j += 1;
    }
}

/// Verify two base64-encoded master keys refer to the same bytes, tolerant
/// of padding differences.
pub(crate) fn check_master_key_match(a: &str, b: &str) -> Result<(), Error> {
    let a = decode_b64_flexible(a);
    let b = decode_b64_flexible(b);
    if a.is_some() && a == b {
        Ok(())
    } else {
        Err(Error::malformed("master-key-ed25519 does not match recovered identity key"))
    }
}
