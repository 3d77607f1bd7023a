//! Output Layout & Retention (`spec.md` §4.9): places each sanitized
//! document at its date-sharded archive path and its flat recent path, and
//! sweeps both trees for expired files.

use crate::authority::Authority;
use crate::reader::SanitizedDoc;
use bridgedesc_error::Error;
use chrono::NaiveDateTime;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Archive-path retention window: 49 days.
pub const ARCHIVE_RETENTION: Duration = Duration::from_secs(49 * 24 * 60 * 60);
/// Recent-path retention window: 3 days.
pub const RECENT_RETENTION: Duration = Duration::from_secs(3 * 24 * 60 * 60);

fn io_err(path: &Path, source: std::io::Error) -> Error {
    Error::Io { path: path.to_path_buf(), source }
}

/// Write one sanitized document to its archive path (create-once, never
/// rewritten) and append it at its recent path.
///
/// `run_timestamp_compact` is the `rsync`-style catalog timestamp
/// (`YYYY-MM-DD-HH-MM-SS`) of the current job run, used to name the
/// server-descriptor/extra-info `.tmp` batch files at the recent path.
pub fn write_document(
    archive_root: &Path,
    recent_root: &Path,
    run_timestamp_compact: &str,
    doc: &SanitizedDoc,
) -> Result<(), Error> {
    match doc {
        SanitizedDoc::Status { authority, timestamp_compact, bytes } => {
            write_status(archive_root, recent_root, *authority, timestamp_compact, bytes)
        }
        SanitizedDoc::ServerDescriptor { digest_hex, snapshot_published, bytes } => write_sharded_descriptor(
            archive_root,
            recent_root,
            run_timestamp_compact,
            "server-descriptors",
            "server-descriptor",
            *snapshot_published,
            digest_hex,
            bytes,
        ),
        SanitizedDoc::ExtraInfo { digest_hex, snapshot_published, bytes } => write_sharded_descriptor(
            archive_root,
            recent_root,
            run_timestamp_compact,
            "extra-infos",
            "extra-info",
            *snapshot_published,
            digest_hex,
            bytes,
        ),
    }
}

/// Write a network-status document to its archive and recent paths. Both
/// are named identically (`<yyyymmdd>-<HHMMSS>-<authority-fp>`), so this
/// never uses the recent path's append-and-promote `.tmp` convention.
fn write_status(
    archive_root: &Path,
    recent_root: &Path,
    authority: Authority,
    timestamp_compact: &str,
    bytes: &[u8],
) -> Result<(), Error> {
    let file_name = format!("{timestamp_compact}-{}", authority.fingerprint_hex());

    let yyyy = &timestamp_compact[0..4];
    let mm = &timestamp_compact[4..6];
    let dd = &timestamp_compact[6..8];

    let archive_path = archive_root
        .join(yyyy)
        .join(mm)
        .join("statuses")
        .join(dd)
        .join(&file_name);
    create_once(&archive_path, bytes)?;

    let recent_path = recent_root.join("statuses").join(&file_name);
    create_once(&recent_path, bytes)?;

    Ok(())
}

/// Write a server-descriptor or extra-info document: a create-once archive
/// copy sharded by the first two digest hex characters, plus an appended
/// line in the recent path's per-run `.tmp` batch file for that kind.
fn write_sharded_descriptor(
    archive_root: &Path,
    recent_root: &Path,
    run_timestamp_compact: &str,
    archive_dir_name: &str,
    recent_kind_name: &str,
    published: NaiveDateTime,
    digest_hex: &str,
    bytes: &[u8],
) -> Result<(), Error> {
    let yyyy = published.format("%Y").to_string();
    let mm = published.format("%m").to_string();
    let d0 = &digest_hex[0..1];
    let d1 = &digest_hex[1..2];

    let archive_path = archive_root
        .join(&yyyy)
        .join(&mm)
        .join(archive_dir_name)
        .join(d0)
        .join(d1)
        .join(digest_hex);
    create_once(&archive_path, bytes)?;

    let tmp_path = recent_root
        .join("bridge-descriptors")
        .join(recent_kind_name)
        .join(format!("{run_timestamp_compact}-{recent_kind_name}.tmp"));
    append_to(&tmp_path, bytes)?;

    Ok(())
}

/// Write `bytes` to `path` only if it does not already exist (archive-path
/// writing policy: deterministic output, never rewritten).
fn create_once(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    fs::write(path, bytes).map_err(|e| io_err(path, e))
}

/// Append `bytes` to `path`, creating it (and its parent directories) if
/// needed.
fn append_to(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    f.write_all(bytes).map_err(|e| io_err(path, e))
}

/// Promote every `.tmp` file directly or transitively under `recent_root`'s
/// `bridge-descriptors` tree to its stripped name, ending this run's append
/// window for the recent-path batch files.
pub fn promote_tmp_files(recent_root: &Path) -> Result<(), Error> {
    let dir = recent_root.join("bridge-descriptors");
    if !dir.exists() {
        return Ok(());
    }
    promote_tmp_in_dir(&dir)
}

fn promote_tmp_in_dir(dir: &Path) -> Result<(), Error> {
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            promote_tmp_in_dir(&path)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
            let promoted = path.with_extension("");
            fs::rename(&path, &promoted).map_err(|e| io_err(&path, e))?;
        }
    }
    Ok(())
}

/// Walk `path`, deleting any file older than `retention`, and rename any
/// remaining `*.tmp` file to its de-`.tmp` name.
///
/// Mirrors upstream CollecTor's `clean_directory`: retention and crash
/// recovery (a killed run leaves partial `.tmp` files) are handled by the
/// same sweep.
pub fn clean_directory(path: &Path, retention: Duration) -> Result<(), Error> {
    if !path.exists() {
        return Ok(());
    }
    let cutoff = SystemTime::now().checked_sub(retention);
    clean_dir_recursive(path, cutoff)
}

fn clean_dir_recursive(dir: &Path, cutoff: Option<SystemTime>) -> Result<(), Error> {
    for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();

        if path.is_dir() {
            clean_dir_recursive(&path, cutoff)?;
            continue;
        }

        let metadata = entry.metadata().map_err(|e| io_err(&path, e))?;
        let modified = metadata.modified().map_err(|e| io_err(&path, e))?;

        if let Some(cutoff) = cutoff {
            if modified < cutoff {
                fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
                continue;
            }
        }

        if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
            let promoted = path.with_extension("");
            fs::rename(&path, &promoted).map_err(|e| io_err(&path, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::authority::Authority;

    #[test]
    fn status_written_to_archive_and_recent() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("out");
        let recent = dir.path().join("recent");

        let doc = SanitizedDoc::Status {
            authority: Authority::Bifroest,
            timestamp_compact: "20200115-100000".to_string(),
            bytes: b"@type bridge-network-status 1.2\n".to_vec(),
        };
        write_document(&archive, &recent, "2020-01-15-10-00-00", &doc).unwrap();

        let expected_name = format!("20200115-100000-{}", Authority::Bifroest.fingerprint_hex());
        assert!(archive.join("2020").join("01").join("statuses").join("15").join(&expected_name).exists());
        assert!(recent.join("statuses").join(&expected_name).exists());
    }

    #[test]
    fn archive_path_not_rewritten_once_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("file");
        create_once(&path, b"first").unwrap();
        create_once(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn recent_tmp_files_are_appended_then_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let recent = dir.path().join("recent");

        let published = chrono::NaiveDate::from_ymd_opt(2020, 1, 15).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let doc1 = SanitizedDoc::ServerDescriptor {
            digest_hex: "ab".to_string() + &"0".repeat(38),
            snapshot_published: published,
            bytes: b"doc-one\n".to_vec(),
        };
        let doc2 = SanitizedDoc::ServerDescriptor {
            digest_hex: "cd".to_string() + &"0".repeat(38),
            snapshot_published: published,
            bytes: b"doc-two\n".to_vec(),
        };
        write_document(&dir.path().join("out"), &recent, "2020-01-15-10-00-00", &doc1).unwrap();
        write_document(&dir.path().join("out"), &recent, "2020-01-15-10-00-00", &doc2).unwrap();

        let tmp_path = recent
            .join("bridge-descriptors")
            .join("server-descriptor")
            .join("2020-01-15-10-00-00-server-descriptor.tmp");
        let contents = fs::read_to_string(&tmp_path).unwrap();
        assert!(contents.contains("doc-one"));
        assert!(contents.contains("doc-two"));

        promote_tmp_files(&recent).unwrap();
        assert!(!tmp_path.exists());
        let promoted = recent.join("bridge-descriptors").join("server-descriptor").join("2020-01-15-10-00-00-server-descriptor");
        assert!(promoted.exists());
    }

    #[test]
    fn clean_directory_promotes_leftover_tmp_from_a_crashed_run() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("fresh-file");
        fs::write(&fresh, b"kept").unwrap();

        let leftover_tmp = dir.path().join("leftover.tmp");
        fs::write(&leftover_tmp, b"partial").unwrap();

        clean_directory(dir.path(), RECENT_RETENTION).unwrap();

        assert!(fresh.exists());
        assert!(!leftover_tmp.exists());
        assert!(dir.path().join("leftover").exists());
    }

    #[test]
    fn clean_directory_respects_zero_retention_as_delete_everything() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("file");
        fs::write(&f, b"data").unwrap();
        clean_directory(dir.path(), Duration::from_secs(0)).unwrap();
        assert!(!f.exists());
    }
}
