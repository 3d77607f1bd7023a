//! The Staleness Monitor (`spec.md` §4.10): compares the largest publication
//! timestamp seen for each document type against "now minus 5h30m" and logs
//! a warning if the feed looks frozen. Purely observational: it never
//! affects output.

use chrono::NaiveDateTime;

/// Tracks the most recent publication timestamp seen per document type
/// during one run.
#[derive(Debug, Default)]
pub struct StalenessTracker {
    /// Largest `published` seen among network statuses.
    latest_status: Option<NaiveDateTime>,
    /// Largest `published` seen among server descriptors.
    latest_server_descriptor: Option<NaiveDateTime>,
    /// Largest `published` seen among extra-info descriptors.
    latest_extra_info: Option<NaiveDateTime>,
}

/// The staleness threshold: a document type whose latest publication is
/// older than "now minus this" is considered possibly frozen.
pub const STALENESS_THRESHOLD: chrono::Duration = chrono::Duration::minutes(5 * 60 + 30);

impl StalenessTracker {
    /// Construct an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a network status's publication time, if it is newer than any
    /// seen so far.
    pub fn observe_status(&mut self, published: NaiveDateTime) {
        Self::bump(&mut self.latest_status, published);
    }

    /// Record a server descriptor's publication time.
    pub fn observe_server_descriptor(&mut self, published: NaiveDateTime) {
        Self::bump(&mut self.latest_server_descriptor, published);
    }

    /// Record an extra-info descriptor's publication time.
    pub fn observe_extra_info(&mut self, published: NaiveDateTime) {
        Self::bump(&mut self.latest_extra_info, published);
    }

    /// Replace `slot` with `published` if it is later (or absent).
    fn bump(slot: &mut Option<NaiveDateTime>, published: NaiveDateTime) {
        if slot.is_none_or(|current| published > current) {
            *slot = Some(published);
        }
    }

    /// Compare each tracked timestamp against `now - 5h30m` and log a
    /// warning for any document type that looks stale or was never seen.
    pub fn check(&self, now: NaiveDateTime) {
        let cutoff = now - STALENESS_THRESHOLD;
        Self::check_one("bridge network status", self.latest_status, cutoff);
        Self::check_one("bridge server descriptor", self.latest_server_descriptor, cutoff);
        Self::check_one("bridge extra-info descriptor", self.latest_extra_info, cutoff);
    }

    /// Log a warning if `latest` is absent or older than `cutoff`.
    fn check_one(kind: &str, latest: Option<NaiveDateTime>, cutoff: NaiveDateTime) {
        match latest {
            None => tracing::warn!(kind, "no {} seen this run; feed may be stale", kind),
            Some(latest) if latest < cutoff => {
                tracing::warn!(kind, %latest, %cutoff, "{} publication timestamps look stale", kind)
            }
            Some(_) => {}
        }
    }
}

/// `Option::is_none_or` is stable from Rust 1.82; this crate targets an
/// edition before that, so it's reimplemented as a free function used via
/// `Self::bump` above rather than relying on the standard method.
trait IsNoneOrLt {
    fn is_none_or(self, f: impl FnOnce(NaiveDateTime) -> bool) -> bool;
}

impl IsNoneOrLt for Option<NaiveDateTime> {
    fn is_none_or(self, f: impl FnOnce(NaiveDateTime) -> bool) -> bool {
        match self {
            None => true,
            Some(v) => f(v),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn keeps_the_latest_observation() {
        let mut t = StalenessTracker::new();
        t.observe_status(dt("2020-01-15 09:00:00"));
        t.observe_status(dt("2020-01-15 10:00:00"));
        t.observe_status(dt("2020-01-15 08:00:00"));
        assert_eq!(t.latest_status, Some(dt("2020-01-15 10:00:00")));
    }

    #[test]
    fn check_does_not_panic_when_nothing_observed() {
        let t = StalenessTracker::new();
        t.check(dt("2020-01-15 10:00:00"));
    }

    #[test]
    fn fresh_timestamp_does_not_trigger_stale_branch() {
        let mut t = StalenessTracker::new();
        let now = dt("2020-01-15 10:00:00");
        t.observe_status(now - chrono::Duration::minutes(10));
        assert!(t.latest_status.unwrap() > now - STALENESS_THRESHOLD);
    }
}
