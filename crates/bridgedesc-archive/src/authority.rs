//! Bridge authority name/fingerprint registry and snapshot file-name parsing.

use bridgedesc_error::Error;
use chrono::NaiveDateTime;

/// A recognized bridge authority, with its fixed identity fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Tonga, the original bridge authority.
    Tonga,
    /// Bifroest, the long-running bridge authority.
    Bifroest,
    /// Serge, a secondary bridge authority.
    Serge,
}

impl Authority {
    /// The 40-character uppercase hex fingerprint for this authority.
    pub fn fingerprint_hex(self) -> &'static str {
        match self {
            Authority::Tonga => "4A0CCD2DDC7995083D73F5D667100C8A5831F16D",
            Authority::Bifroest => "BA44A889E64B93FAA2B114E02C2A279A8555C533",
            Authority::Serge => "BA2C6CF1ADDF1AA5B2B3EC3E7B05DE4D30A6563B",
        }
    }

    /// Parse an authority from the lowercase name embedded in a snapshot
    /// file name (`tonga`, `bifroest`, `serge`).
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "tonga" => Some(Authority::Tonga),
            "bifroest" => Some(Authority::Bifroest),
            "serge" => Some(Authority::Serge),
            _ => None,
        }
    }
}

/// A parsed `from-<authority>-YYYY-MM-DD-HH-MM-SS.tar[.gz]` snapshot name.
#[derive(Debug, Clone)]
pub struct SnapshotName {
    /// The authority that published this snapshot.
    pub authority: Authority,
    /// The timestamp embedded in the file name.
    pub published: NaiveDateTime,
    /// Whether the file is gzip-compressed.
    pub gzipped: bool,
}

impl SnapshotName {
    /// Parse a snapshot file name, rejecting anything that doesn't match
    /// `from-(tonga|bifroest|serge)-<YYYY>-<MM>-<DD>-<HH>-<MM>-<SS>.tar[.gz]`.
    pub fn parse(file_name: &str) -> Result<Self, Error> {
        let (stem, gzipped) = if let Some(s) = file_name.strip_suffix(".tar.gz") {
            (s, true)
        } else if let Some(s) = file_name.strip_suffix(".tar") {
            (s, false)
        } else {
            return Err(Error::unknown_archive(format!("{file_name} has no .tar[.gz] suffix")));
        };

        let rest = stem
            .strip_prefix("from-")
            .ok_or_else(|| Error::unknown_archive(format!("{file_name} does not start with from-")))?;

        let mut parts = rest.splitn(2, '-');
        let authority_name = parts.next().unwrap_or("");
        let timestamp_part = parts
            .next()
            .ok_or_else(|| Error::unknown_archive(format!("{file_name} is missing its timestamp")))?;

        let authority = Authority::from_name(authority_name)
            .ok_or_else(|| Error::unknown_archive(format!("{authority_name} is not a recognized bridge authority")))?;

        let published = NaiveDateTime::parse_from_str(timestamp_part, "%Y-%m-%d-%H-%M-%S")
            .map_err(|_| Error::unknown_archive(format!("{file_name} has an unparseable timestamp")))?;

        Ok(SnapshotName {
            authority,
            published,
            gzipped,
        })
    }
}

/// The `"YYYY-MM-DD HH:MM:SS"` form of this snapshot's timestamp, the form
/// emitted as the canonical `published` line in the network-status output.
impl SnapshotName {
    /// Render this snapshot's timestamp the way it should appear in the
    /// canonical `published` line of the sanitized network status.
    pub fn published_canonical(&self) -> String {
        self.published.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
