//! The monthly-secrets store.

use bridgedesc_error::Error;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// An append-only store of monthly secrets, keyed by `YYYY-MM`.
///
/// Each line on disk is `YYYY-MM,<hex bytes>`. On load, if the same key
/// appears more than once, the later line in the file wins. [`trim`] rewrites
/// the whole file, dropping keys older than a cutoff and leaving the
/// remainder sorted ascending by key with no duplicates.
///
/// [`trim`]: SecretsStore::trim
#[derive(Debug)]
pub struct SecretsStore {
    /// Path to the backing file.
    path: PathBuf,
    /// In-memory view of the store, one entry per month.
    entries: BTreeMap<String, Vec<u8>>,
}

impl SecretsStore {
    /// Load the secrets store from `path`. A missing file is treated as an
    /// empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let mut entries = BTreeMap::new();

        match File::open(&path) {
            Ok(f) => {
                for line in BufReader::new(f).lines() {
                    let line = line.map_err(|source| Error::Io {
                        path: path.clone(),
                        source,
                    })?;
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let Some((month, hex_bytes)) = line.split_once(',') else {
                        tracing::warn!(%line, "ignoring malformed line in secrets store");
                        continue;
                    };
                    match hex::decode(hex_bytes) {
                        Ok(bytes) => {
                            entries.insert(month.to_string(), bytes);
                        }
                        Err(_) => {
                            tracing::warn!(%line, "ignoring non-hex line in secrets store");
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(Error::Io { path, source }),
        }

        Ok(SecretsStore { path, entries })
    }

    /// Look up the raw bytes stored for `month`, if any.
    pub fn get(&self, month: &str) -> Option<&[u8]> {
        self.entries.get(month).map(Vec::as_slice)
    }

    /// Durably append a `month,<hex bytes>` line to the backing file and
    /// record it in memory.
    ///
    /// On success, the caller may rely on the bytes being on disk before
    /// this call returns: every write is followed by an explicit `sync_all`.
    /// On failure, the entry is *not* recorded in memory, and the caller
    /// must treat this as a fatal persistence failure for the run.
    pub fn append(&mut self, month: &str, bytes: &[u8]) -> Result<(), Error> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| Error::SecretsPersistence {
                path: self.path.clone(),
                source,
            })?;

        let line = format!("{month},{}\n", hex::encode(bytes));
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|source| Error::SecretsPersistence {
                path: self.path.clone(),
                source,
            })?;

        self.entries.insert(month.to_string(), bytes.to_vec());
        Ok(())
    }

    /// Drop every entry whose month key is lexically less than `cutoff`
    /// (`YYYY-MM` keys compare correctly as strings), then rewrite the file
    /// sorted ascending with no duplicate keys.
    ///
    /// A `cutoff` of `None` disables expiry: the file is still rewritten
    /// into canonical (sorted, deduplicated) form, but nothing is dropped.
    pub fn trim(&mut self, cutoff: Option<&str>) -> Result<(), Error> {
        if let Some(cutoff) = cutoff {
            self.entries.retain(|month, _| month.as_str() >= cutoff);
        }

        let mut contents = String::new();
        for (month, bytes) in &self.entries {
            contents.push_str(month);
            contents.push(',');
            contents.push_str(&hex::encode(bytes));
            contents.push('\n');
        }

        write_atomic(&self.path, contents.as_bytes()).map_err(|source| Error::SecretsPersistence {
            path: self.path.clone(),
            source,
        })
    }

    /// Iterate over all `(month, bytes)` pairs currently held, ascending by
    /// month.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(m, b)| (m.as_str(), b.as_slice()))
    }
}

/// Write `contents` to `path` by writing to a sibling temp file and
/// renaming over the target, so a crash mid-write cannot leave a truncated
/// store.
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp-rewrite");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(contents)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn load_empty_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretsStore::load(dir.path().join("bridge-ip-secrets")).unwrap();
        assert!(store.get("2020-01").is_none());
    }

    #[test]
    fn append_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge-ip-secrets");
        let mut store = SecretsStore::load(&path).unwrap();
        store.append("2020-01", &[0u8; 83]).unwrap();
        store.append("2020-02", &[1u8; 83]).unwrap();

        let reloaded = SecretsStore::load(&path).unwrap();
        assert_eq!(reloaded.get("2020-01"), Some(&[0u8; 83][..]));
        assert_eq!(reloaded.get("2020-02"), Some(&[1u8; 83][..]));
    }

    #[test]
    fn duplicate_keys_keep_latest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge-ip-secrets");
        fs::write(&path, format!("2020-01,{}\n2020-01,{}\n", hex::encode([0u8; 4]), hex::encode([1u8; 4]))).unwrap();

        let store = SecretsStore::load(&path).unwrap();
        assert_eq!(store.get("2020-01"), Some(&[1u8; 4][..]));
    }

    #[test]
    fn trim_sorts_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge-ip-secrets");
        let mut store = SecretsStore::load(&path).unwrap();
        store.append("2020-03", &[3u8; 4]).unwrap();
        store.append("2019-01", &[1u8; 4]).unwrap();
        store.append("2020-01", &[2u8; 4]).unwrap();
        store.trim(Some("2020-01")).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("2020-01,"));
        assert!(lines[1].starts_with("2020-03,"));
    }
}
