//! Configuration surface for the bridge descriptor sanitizer.
//!
//! This crate defines exactly the options table from the external
//! interfaces section: where to read archives from, where to write output,
//! where to keep the secrets store, whether IP hashing is enabled, and how
//! long a monthly secret may be kept before it's trimmed.
//!
//! Loading this structure from a richer configuration provider (file
//! layering, environment variables, command-line flags) is the job of an
//! external driver; this crate only defines the shape and its defaults, and
//! knows how to deserialize it from TOML via `serde`.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

use serde::Deserialize;
use std::path::PathBuf;

/// Configuration for one run of the sanitizer.
///
/// Field names match the options table in the external-interfaces section
/// verbatim (translated to `snake_case` for Rust/TOML conventions).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SanitizerConfig {
    /// Directory holding `from-<authority>-...tar[.gz]` snapshot archives.
    pub bridge_local_origins: PathBuf,

    /// Root of the long-term, date-sharded archive tree.
    pub output_path: PathBuf,

    /// Root of the short-term "recent" mirror tree.
    pub recent_path: PathBuf,

    /// Directory holding the secrets store and the parsed-archives list.
    pub stats_path: PathBuf,

    /// Whether IP/port hashing is enabled. When `false`, the sanitizer runs
    /// in passthrough mode (fixed sentinel values).
    #[serde(default = "default_replace_ip_addresses_with_hashes")]
    pub replace_ip_addresses_with_hashes: bool,

    /// Number of days a monthly secret may be kept before it is no longer
    /// persisted and is trimmed from the store. A negative value disables
    /// expiry entirely.
    #[serde(default = "default_bridge_descriptor_mappings_limit_days")]
    pub bridge_descriptor_mappings_limit_days: i64,
}

/// Default for `replace_ip_addresses_with_hashes`: hashing mode, matching
/// upstream CollecTor's default deployment.
const fn default_replace_ip_addresses_with_hashes() -> bool {
    true
}

/// Default retention window for monthly secrets, in days (roughly three
/// months), matching upstream CollecTor's default deployment.
const fn default_bridge_descriptor_mappings_limit_days() -> i64 {
    90
}

impl SanitizerConfig {
    /// Parse a `SanitizerConfig` from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let cfg = SanitizerConfig::from_toml_str(
            r#"
            bridge_local_origins = "/var/lib/collector/in"
            output_path = "/var/lib/collector/out"
            recent_path = "/var/lib/collector/recent"
            stats_path = "/var/lib/collector/stats"
            "#,
        )
        .unwrap();
        assert!(cfg.replace_ip_addresses_with_hashes);
        assert_eq!(cfg.bridge_descriptor_mappings_limit_days, 90);
        assert_eq!(cfg.bridge_local_origins, PathBuf::from("/var/lib/collector/in"));
    }

    #[test]
    fn overrides_defaults() {
        let cfg = SanitizerConfig::from_toml_str(
            r#"
            bridge_local_origins = "in"
            output_path = "out"
            recent_path = "recent"
            stats_path = "stats"
            replace_ip_addresses_with_hashes = false
            bridge_descriptor_mappings_limit_days = -1
            "#,
        )
        .unwrap();
        assert!(!cfg.replace_ip_addresses_with_hashes);
        assert_eq!(cfg.bridge_descriptor_mappings_limit_days, -1);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = SanitizerConfig::from_toml_str(
            r#"
            bridge_local_origins = "in"
            output_path = "out"
            recent_path = "recent"
            stats_path = "stats"
            typo_field = true
            "#,
        );
        assert!(err.is_err());
    }
}
