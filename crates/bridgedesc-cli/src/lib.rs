//! The sanitizer's command-line driver.
//!
//! A thin wrapper around [`bridgedesc_archive::run_locked`]: load the
//! configuration, run one job, and log whatever happened. Per the external
//! interface, [`run_sanitizer`] never propagates failure as a process exit
//! code — every error is logged and swallowed, since the next scheduled
//! invocation will simply reprocess whatever this one didn't finish.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

use bridgedesc_config::SanitizerConfig;
use chrono::Local;
use std::path::Path;

/// Run one sanitizer job using the TOML configuration at `config_path`.
///
/// Always returns normally; every failure (an unreadable or malformed
/// config file, an archive-walk error, an I/O failure) is logged via
/// `tracing` and otherwise ignored, matching the "exit code 0 always"
/// external interface.
pub fn run_sanitizer(config_path: &Path) {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %config_path.display(), error = %e, "could not load sanitizer configuration");
            return;
        }
    };

    let now = Local::now().naive_local();
    match bridgedesc_archive::run_locked(&config, now) {
        Ok(Some(summary)) => {
            tracing::info!(?summary, "sanitizer run finished");
        }
        Ok(None) => {
            tracing::warn!("sanitizer run skipped: lock held by another process");
        }
        Err(e) => {
            tracing::error!(error = %e, "sanitizer run failed");
        }
    }
}

/// Read and parse `path` as a [`SanitizerConfig`].
fn load_config(path: &Path) -> Result<SanitizerConfig, ConfigLoadError> {
    let text = std::fs::read_to_string(path).map_err(ConfigLoadError::Io)?;
    SanitizerConfig::from_toml_str(&text).map_err(ConfigLoadError::Toml)
}

/// Why [`load_config`] failed.
#[derive(Debug, thiserror::Error)]
enum ConfigLoadError {
    /// The config file could not be read.
    #[error("could not read config file: {0}")]
    Io(#[source] std::io::Error),
    /// The config file's contents were not valid TOML for a [`SanitizerConfig`].
    #[error("could not parse config file: {0}")]
    Toml(#[source] toml::de::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn run_sanitizer_does_not_panic_on_missing_config() {
        run_sanitizer(Path::new("/nonexistent/path/to/config.toml"));
    }

    #[test]
    fn run_sanitizer_does_not_panic_on_a_minimal_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let origins = dir.path().join("in");
        let out = dir.path().join("out");
        let recent = dir.path().join("recent");
        let stats = dir.path().join("stats");
        std::fs::create_dir_all(&origins).unwrap();

        let config_path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
            bridge_local_origins = {origins:?}
            output_path = {out:?}
            recent_path = {recent:?}
            stats_path = {stats:?}
            "#
        )
        .unwrap();

        run_sanitizer(&config_path);
    }
}
