//! Archive ingestion, output layout/retention, and staleness monitoring for
//! the bridge descriptor sanitizer.
//!
//! This crate is the orchestration layer: it walks the configured input
//! directory, hands each document to `bridgedesc-netdoc`'s sanitizers via
//! [`reader`], places sanitized output via [`output`], and tracks
//! [`staleness`]. [`run`] ties all of it together into the single entry
//! point a CLI driver calls once per job.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod authority;
pub mod output;
pub mod reader;
pub mod staleness;

use bridgedesc_config::SanitizerConfig;
use bridgedesc_error::Error;
use bridgedesc_netdoc::sanitize::SensitiveSanitizer;
use bridgedesc_persist::{ParsedArchives, SecretsStore};
use chrono::NaiveDateTime;
use reader::{Counters, RunDedup, SanitizedDoc};

/// Totals for one full run, logged at job end.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    /// Per-document-type parsed/skipped counts, accumulated across every
    /// archive file processed this run.
    pub counters: Counters,
    /// Archive files that existed in the input directory but were already
    /// recorded as fully consumed.
    pub archives_already_parsed: u64,
}

/// Run one full sanitizer job: walk `config.bridge_local_origins` for
/// not-yet-parsed snapshot tarballs, sanitize every document inside them,
/// write sanitized output to the archive and recent trees, trim expired
/// secrets, sweep both output trees for retention, and check staleness.
///
/// `now` is the wall-clock time to treat as "now" for staleness comparison
/// and for the recent-path run-batch timestamp; callers pass the real
/// current time in production and a fixed value in tests.
pub fn run(config: &SanitizerConfig, now: NaiveDateTime) -> Result<RunSummary, Error> {
    let secrets = SecretsStore::load(config.stats_path.join("bridge-ip-secrets"))?;
    let retention_cutoff_month = retention_cutoff_month(config.bridge_descriptor_mappings_limit_days, now);
    let mut sanitizer = SensitiveSanitizer::new(
        config.replace_ip_addresses_with_hashes,
        secrets,
        retention_cutoff_month,
    );

    let mut parsed = ParsedArchives::load(config.stats_path.join("parsed-bridge-directories"))?;
    let mut dedup = RunDedup::default();
    let mut staleness = staleness::StalenessTracker::new();
    let mut summary = RunSummary::default();

    let run_timestamp_compact = now.format("%Y-%m-%d-%H-%M-%S").to_string();

    let mut entries: Vec<_> = std::fs::read_dir(&config.bridge_local_origins)
        .map_err(|source| Error::Io { path: config.bridge_local_origins.clone(), source })?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if parsed.contains(file_name) {
            summary.archives_already_parsed += 1;
            continue;
        }

        let file_name = file_name.to_string();
        let counters = reader::process_archive(&path, &file_name, &mut sanitizer, &mut dedup, |doc| {
            observe_and_emit(config, &run_timestamp_compact, &mut staleness, &doc)
        })?;

        accumulate(&mut summary.counters, counters);
        parsed.mark_parsed(&file_name)?;

        if sanitizer.is_disabled() {
            tracing::warn!("sensitive-parts sanitizer disabled; aborting remaining archives this run");
            break;
        }
    }

    output::promote_tmp_files(&config.recent_path)?;
    output::clean_directory(&config.recent_path, output::RECENT_RETENTION)?;
    output::clean_directory(&config.output_path, output::ARCHIVE_RETENTION)?;

    sanitizer.finish_writing()?;
    staleness.check(now);

    log_summary(&summary);
    Ok(summary)
}

/// Write a sanitized document to both output sinks and record its
/// publication time for the staleness monitor.
fn observe_and_emit(
    config: &SanitizerConfig,
    run_timestamp_compact: &str,
    staleness: &mut staleness::StalenessTracker,
    doc: &SanitizedDoc,
) -> Result<(), Error> {
    match doc {
        SanitizedDoc::Status { timestamp_compact, .. } => {
            if let Ok(ts) = NaiveDateTime::parse_from_str(
                &format!("{}-{}", &timestamp_compact[0..8], &timestamp_compact[9..15]),
                "%Y%m%d-%H%M%S",
            ) {
                staleness.observe_status(ts);
            }
        }
        SanitizedDoc::ServerDescriptor { snapshot_published, .. } => {
            staleness.observe_server_descriptor(*snapshot_published);
        }
        SanitizedDoc::ExtraInfo { snapshot_published, .. } => {
            staleness.observe_extra_info(*snapshot_published);
        }
    }

    output::write_document(&config.output_path, &config.recent_path, run_timestamp_compact, doc)
}

/// Fold one archive file's counters into the running job total.
fn accumulate(total: &mut Counters, one: Counters) {
    total.statuses_parsed += one.statuses_parsed;
    total.statuses_skipped += one.statuses_skipped;
    total.server_descriptors_parsed += one.server_descriptors_parsed;
    total.server_descriptors_skipped += one.server_descriptors_skipped;
    total.extra_infos_parsed += one.extra_infos_parsed;
    total.extra_infos_skipped += one.extra_infos_skipped;
    total.archives_skipped += one.archives_skipped;
}

/// Compute the `YYYY-MM` cutoff at or after which freshly generated secrets
/// may be durably persisted, from the configured retention window in days.
/// A negative limit disables expiry (`None`, meaning no cutoff: every month
/// persists).
fn retention_cutoff_month(limit_days: i64, now: NaiveDateTime) -> Option<String> {
    if limit_days < 0 {
        return None;
    }
    let cutoff_date = now - chrono::Duration::days(limit_days);
    Some(cutoff_date.format("%Y-%m").to_string())
}

/// Emit the end-of-job summary line.
fn log_summary(summary: &RunSummary) {
    tracing::info!(
        statuses_parsed = summary.counters.statuses_parsed,
        statuses_skipped = summary.counters.statuses_skipped,
        server_descriptors_parsed = summary.counters.server_descriptors_parsed,
        server_descriptors_skipped = summary.counters.server_descriptors_skipped,
        extra_infos_parsed = summary.counters.extra_infos_parsed,
        extra_infos_skipped = summary.counters.extra_infos_skipped,
        archives_skipped = summary.counters.archives_skipped,
        archives_already_parsed = summary.archives_already_parsed,
        "sanitizer run complete"
    );
}

/// Acquire the run lock at `<stats_path>/lock`, run the job if acquired,
/// and release the lock on return. Returns `Ok(None)` without doing any
/// work if another run already holds the lock.
pub fn run_locked(config: &SanitizerConfig, now: NaiveDateTime) -> Result<Option<RunSummary>, Error> {
    let lock_path = config.stats_path.join("lock");
    match bridgedesc_persist::RunLock::try_acquire(&lock_path)? {
        Some(_guard) => run(config, now).map(Some),
        None => {
            tracing::warn!(path = %lock_path.display(), "another sanitizer run holds the lock; skipping this run");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cutoff_month_disabled_for_negative_limit() {
        let now = NaiveDateTime::parse_from_str("2020-04-15 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(retention_cutoff_month(-1, now), None);
    }

    #[test]
    fn cutoff_month_subtracts_days() {
        let now = NaiveDateTime::parse_from_str("2020-04-15 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(retention_cutoff_month(90, now), Some("2020-01".to_string()));
    }
}
