//! The Archive Reader (`spec.md` §4.8): walks the input directory, untars
//! snapshots, identifies document boundaries, dedupes by content digest
//! within one run, and dispatches to the appropriate document sanitizer.

use crate::authority::{Authority, SnapshotName};
use bridgedesc_error::Error;
use bridgedesc_netdoc::sanitize::SensitiveSanitizer;
use chrono::NaiveDateTime;
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// The three kinds of sanitized document this module can produce, carrying
/// exactly the identifying information the output layer needs to place each
/// one at its archive and recent paths.
#[derive(Debug)]
pub enum SanitizedDoc {
    /// A sanitized bridge network status.
    Status {
        /// The authority that published it.
        authority: Authority,
        /// The snapshot's embedded timestamp, `YYYYMMDD-HHMMSS`.
        timestamp_compact: String,
        /// The sanitized document bytes.
        bytes: Vec<u8>,
    },
    /// A sanitized bridge server descriptor.
    ServerDescriptor {
        /// Lowercase hex SHA-1 of the original (pre-sanitization) bytes.
        digest_hex: String,
        /// The snapshot's embedded timestamp, used for archive-path sharding.
        snapshot_published: NaiveDateTime,
        /// The sanitized document bytes.
        bytes: Vec<u8>,
    },
    /// A sanitized bridge extra-info descriptor.
    ExtraInfo {
        /// Lowercase hex SHA-1 of the original (pre-sanitization) bytes.
        digest_hex: String,
        /// The snapshot's embedded timestamp, used for archive-path sharding.
        snapshot_published: NaiveDateTime,
        /// The sanitized document bytes.
        bytes: Vec<u8>,
    },
}

/// Per-type parsed/skipped counters, logged at job end.
#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    /// Network statuses successfully sanitized.
    pub statuses_parsed: u64,
    /// Network statuses rejected.
    pub statuses_skipped: u64,
    /// Server descriptors successfully sanitized.
    pub server_descriptors_parsed: u64,
    /// Server descriptors rejected.
    pub server_descriptors_skipped: u64,
    /// Extra-info descriptors successfully sanitized.
    pub extra_infos_parsed: u64,
    /// Extra-info descriptors rejected.
    pub extra_infos_skipped: u64,
    /// Input archive files skipped because their name didn't match the
    /// expected layout.
    pub archives_skipped: u64,
}

/// Per-run dedup sets: SHA-1 digests of whole tar members and of individual
/// descriptors already dispatched this run, so repeats across archives (or
/// within one) are skipped rather than redone.
#[derive(Debug, Default)]
pub struct RunDedup {
    /// Digests of whole tar members already processed this run.
    members_seen: HashSet<[u8; 20]>,
    /// Digests of individual router/extra-info descriptors already
    /// dispatched this run.
    descriptors_seen: HashSet<[u8; 20]>,
}

/// Process one snapshot tarball (already known to exist), dispatching every
/// contained document to the matching sanitizer and invoking `emit` for each
/// sanitized result.
///
/// Returns the updated [`Counters`] for this file. Does not consult or
/// update the persistent parsed-archives set; the caller does that once
/// this call returns successfully.
pub fn process_archive(
    path: &Path,
    file_name: &str,
    sanitizer: &mut SensitiveSanitizer,
    dedup: &mut RunDedup,
    mut emit: impl FnMut(SanitizedDoc) -> Result<(), Error>,
) -> Result<Counters, Error> {
    let mut counters = Counters::default();

    let snapshot = match SnapshotName::parse(file_name) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(file_name, error = %e, "skipping archive with unrecognized name");
            counters.archives_skipped += 1;
            return Ok(counters);
        }
    };

    let raw_file = std::fs::File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let reader: Box<dyn Read> = if snapshot.gzipped {
        Box::new(flate2::read::GzDecoder::new(raw_file))
    } else {
        Box::new(raw_file)
    };
    let mut archive = tar::Archive::new(reader);
    let entries = archive.entries().map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let member_digest: [u8; 20] = Sha1::digest(&bytes).into();
        if !dedup.members_seen.insert(member_digest) {
            continue;
        }

        process_member(&bytes, &snapshot, sanitizer, dedup, &mut counters, &mut emit)?;
    }

    Ok(counters)
}

/// Dispatch one tar member: either a whole network-status document, or a
/// run of concatenated server/extra-info descriptors.
fn process_member(
    bytes: &[u8],
    snapshot: &SnapshotName,
    sanitizer: &mut SensitiveSanitizer,
    dedup: &mut RunDedup,
    counters: &mut Counters,
    emit: &mut impl FnMut(SanitizedDoc) -> Result<(), Error>,
) -> Result<(), Error> {
    let Some(hint) = first_non_annotation_line(bytes) else {
        tracing::warn!("tar member has no content; skipping");
        return Ok(());
    };

    if hint.starts_with("published ") || hint.starts_with("flag-thresholds ") || hint.starts_with("r ") {
        let authority_fp = snapshot.authority.fingerprint_hex();
        let canonical_published = snapshot.published_canonical();
        match bridgedesc_netdoc::doc::netstatus::sanitize(sanitizer, bytes, authority_fp, &canonical_published) {
            Ok(sanitized) => {
                counters.statuses_parsed += 1;
                emit(SanitizedDoc::Status {
                    authority: snapshot.authority,
                    timestamp_compact: snapshot.published.format("%Y%m%d-%H%M%S").to_string(),
                    bytes: sanitized,
                })?;
            }
            Err(e) => {
                tracing::warn!(error = %e, "rejecting malformed network status");
                counters.statuses_skipped += 1;
            }
        }
        return Ok(());
    }

    for region in split_concatenated_descriptors(bytes) {
        let digest: [u8; 20] = Sha1::digest(region).into();
        if !dedup.descriptors_seen.insert(digest) {
            continue;
        }
        let digest_hex = hex::encode(digest);

        if region.starts_with(b"router ") {
            match bridgedesc_netdoc::doc::serverdesc::sanitize(sanitizer, region) {
                Ok(sanitized) => {
                    counters.server_descriptors_parsed += 1;
                    emit(SanitizedDoc::ServerDescriptor {
                        digest_hex,
                        snapshot_published: snapshot.published,
                        bytes: sanitized,
                    })?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "rejecting malformed server descriptor");
                    counters.server_descriptors_skipped += 1;
                }
            }
        } else if region.starts_with(b"extra-info ") {
            match bridgedesc_netdoc::doc::extrainfo::sanitize(region) {
                Ok(sanitized) => {
                    counters.extra_infos_parsed += 1;
                    emit(SanitizedDoc::ExtraInfo {
                        digest_hex,
                        snapshot_published: snapshot.published,
                        bytes: sanitized,
                    })?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "rejecting malformed extra-info descriptor");
                    counters.extra_infos_skipped += 1;
                }
            }
        }
    }

    Ok(())
}

/// Skip leading `@`-prefixed annotation lines and return the first line of
/// substance, if any.
fn first_non_annotation_line(bytes: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(bytes).ok()?;
    text.lines().find(|l| !l.starts_with('@'))
}

/// Repeatedly locate `router `/`extra-info ` … `\n-----END SIGNATURE-----\n`
/// regions in `bytes`, returning each inclusive slice in order.
fn split_concatenated_descriptors(bytes: &[u8]) -> Vec<&[u8]> {
    const END: &[u8] = b"\n-----END SIGNATURE-----\n";
    let mut out = Vec::new();
    let mut cursor = 0usize;

    while cursor < bytes.len() {
        let router_at = find_from(bytes, b"router ", cursor);
        let extra_info_at = find_from(bytes, b"extra-info ", cursor);
        let start = match (router_at, extra_info_at) {
            (Some(r), Some(e)) => r.min(e),
            (Some(r), None) => r,
            (None, Some(e)) => e,
            (None, None) => break,
        };

        let Some(end_at) = find_from(bytes, END, start) else {
            tracing::warn!("dropping trailing descriptor fragment with no signature end marker");
            break;
        };
        let end_incl = end_at + END.len();
        out.push(&bytes[start..end_incl]);
        cursor = end_incl;
    }

    out
}

/// Find the first occurrence of `needle` in `haystack` at or after `from`.
fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|w| w == needle).map(|p| p + from)
}
