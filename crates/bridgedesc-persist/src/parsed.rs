//! The persistent set of already-fully-consumed input archive names.

use bridgedesc_error::Error;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// The set of archive file names that a previous run has fully consumed.
///
/// Stored as one name per line at `<stats_path>/parsed-bridge-directories`.
#[derive(Debug)]
pub struct ParsedArchives {
    /// Path to the backing file.
    path: PathBuf,
    /// Names already recorded as parsed.
    names: HashSet<String>,
}

impl ParsedArchives {
    /// Load the set from `path`. A missing file means nothing has been
    /// parsed yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let mut names = HashSet::new();

        match std::fs::File::open(&path) {
            Ok(f) => {
                for line in BufReader::new(f).lines() {
                    let line = line.map_err(|source| Error::Io {
                        path: path.clone(),
                        source,
                    })?;
                    let line = line.trim();
                    if !line.is_empty() {
                        names.insert(line.to_string());
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(Error::Io { path, source }),
        }

        Ok(ParsedArchives { path, names })
    }

    /// Returns whether `name` has already been fully consumed.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Durably record `name` as fully consumed.
    pub fn mark_parsed(&mut self, name: &str) -> Result<(), Error> {
        if self.names.contains(name) {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| Error::Io {
                path: self.path.clone(),
                source,
            })?;
        writeln!(file, "{name}").map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        file.sync_all().map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        self.names.insert(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn marks_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parsed-bridge-directories");
        let mut parsed = ParsedArchives::load(&path).unwrap();
        assert!(!parsed.contains("from-tonga-2020-01-15-10-00-00.tar"));

        parsed.mark_parsed("from-tonga-2020-01-15-10-00-00.tar").unwrap();
        assert!(parsed.contains("from-tonga-2020-01-15-10-00-00.tar"));

        let reloaded = ParsedArchives::load(&path).unwrap();
        assert!(reloaded.contains("from-tonga-2020-01-15-10-00-00.tar"));
    }

    #[test]
    fn marking_twice_does_not_duplicate_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parsed-bridge-directories");
        let mut parsed = ParsedArchives::load(&path).unwrap();
        parsed.mark_parsed("a.tar").unwrap();
        parsed.mark_parsed("a.tar").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
