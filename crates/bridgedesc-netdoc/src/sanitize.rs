//! The sensitive-parts sanitizer: deterministic, salted hashing (or fixed
//! passthrough) of IPv4, IPv6, and TCP-port values, and the owner of the
//! monthly-secrets lifecycle.
//!
//! Every hashed output mixes in the bridge's 20-byte fingerprint and an
//! 83-byte secret drawn once per calendar month, so that outputs for the
//! same bridge are linkable within a month but not across months, and are
//! not usefully invertible. All three value kinds (IPv4, IPv6, port) hash a
//! 55-byte message: `<value bytes> ‖ <20 fingerprint bytes> ‖ <secret
//! slice>`, using disjoint, non-overlapping slices of the monthly secret
//! (`0..31` for IPv4, `31..50` for IPv6, `50..83` for ports).

use bridgedesc_error::{Error, ErrorKind};
use bridgedesc_persist::SecretsStore;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::net::Ipv4Addr;

/// Length in bytes of a full monthly secret.
pub const SECRET_LEN: usize = 83;

/// The result of a scrub attempt.
///
/// Mirrors the reference implementation's "string or null" dual return: only
/// `Ok` is written to output, `Invalid` causes the caller to drop just the
/// one offending line, and `Disabled` means the owning sanitizer has
/// latched into `HashingDisabled` and the *whole document* must be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrubResult {
    /// Scrubbing succeeded; this is the replacement text.
    Ok(String),
    /// The input was syntactically invalid; skip just this line.
    Invalid,
    /// The sanitizer can no longer scrub anything this run.
    Disabled,
}

impl ScrubResult {
    /// Returns the scrubbed string, if any.
    pub fn into_option(self) -> Option<String> {
        match self {
            ScrubResult::Ok(s) => Some(s),
            _ => None,
        }
    }

    /// True if this result means the whole document must be abandoned.
    pub fn is_disabled(&self) -> bool {
        matches!(self, ScrubResult::Disabled)
    }
}

/// Extract the `YYYY-MM` month key from a `YYYY-MM-DD HH:MM:SS` (or
/// `YYYY-MM-DD`) timestamp.
pub fn month_of(published: &str) -> &str {
    published.get(0..7).unwrap_or(published)
}

/// The sensitive-parts sanitizer.
///
/// Owns the in-memory view of the monthly-secrets map (via the
/// [`SecretsStore`] it wraps) for the duration of one job run. Once a
/// persistence failure occurs, every subsequent scrub call returns
/// [`ScrubResult::Disabled`] for the rest of the run; a new run starts with
/// a fresh sanitizer and so a fresh chance to persist.
pub struct SensitiveSanitizer {
    /// Whether hashing mode is active. When false, every scrub uses the
    /// fixed passthrough sentinels.
    hashing_enabled: bool,
    /// The backing secrets store.
    secrets: SecretsStore,
    /// Months at or after this key may have their generated secret
    /// persisted; months before it are generated in-memory only and
    /// trimmed. `None` disables expiry (every month may persist).
    retention_cutoff_month: Option<String>,
    /// Latched once a persistence failure occurs.
    disabled: bool,
}

/// Fixed IPv4 sentinel used in passthrough mode.
pub const PASSTHROUGH_IPV4: &str = "127.0.0.1";
/// Fixed TCP port sentinel used in passthrough mode (other than port 0).
pub const PASSTHROUGH_PORT: &str = "1";
/// Fixed IPv6 sentinel used in passthrough mode.
pub const PASSTHROUGH_IPV6: &str = "[fd9f:2e19:3bcf::]";

impl SensitiveSanitizer {
    /// Construct a new sanitizer.
    ///
    /// `retention_cutoff_month`, if given, is the `YYYY-MM` key at or after
    /// which freshly generated secrets are durably persisted; secrets for
    /// earlier months are generated in memory only and never written.
    pub fn new(
        hashing_enabled: bool,
        secrets: SecretsStore,
        retention_cutoff_month: Option<String>,
    ) -> Self {
        SensitiveSanitizer {
            hashing_enabled,
            secrets,
            retention_cutoff_month,
            disabled: false,
        }
    }

    /// Whether this sanitizer has latched into `HashingDisabled` for the
    /// rest of the run.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Trim secrets older than the retention cutoff from the backing store.
    /// Always attempted, even if this sanitizer is already disabled.
    pub fn finish_writing(&mut self) -> Result<(), Error> {
        self.secrets.trim(self.retention_cutoff_month.as_deref())
    }

    /// Fetch (generating and persisting if necessary) the 83-byte secret
    /// for `month`.
    fn get_secret_for_month(&mut self, month: &str) -> Result<[u8; SECRET_LEN], Error> {
        if self.disabled {
            return Err(Error::Invalid {
                kind: ErrorKind::PersistenceFailure,
                msg: "sensitive-parts sanitizer is disabled for this run".into(),
            });
        }

        if let Some(existing) = self.secrets.get(month) {
            if existing.len() == SECRET_LEN {
                let mut buf = [0u8; SECRET_LEN];
                buf.copy_from_slice(existing);
                return Ok(buf);
            }
            let mut buf = [0u8; SECRET_LEN];
            let keep = existing.len().min(SECRET_LEN);
            buf[..keep].copy_from_slice(&existing[..keep]);
            rand::thread_rng().fill_bytes(&mut buf[keep..]);
            return self.persist_or_keep_in_memory(month, buf);
        }

        let mut buf = [0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut buf);
        self.persist_or_keep_in_memory(month, buf)
    }

    /// Persist a freshly generated (or zero-extended) secret if `month` is
    /// at or after the retention cutoff; otherwise keep it in memory only.
    fn persist_or_keep_in_memory(
        &mut self,
        month: &str,
        buf: [u8; SECRET_LEN],
    ) -> Result<[u8; SECRET_LEN], Error> {
        let should_persist = match &self.retention_cutoff_month {
            None => true,
            Some(cutoff) => month >= cutoff.as_str(),
        };

        if !should_persist {
            tracing::warn!(
                month,
                "generated monthly secret for a month before the retention cutoff; keeping in memory only"
            );
            return Ok(buf);
        }

        match self.secrets.append(month, &buf) {
            Ok(()) => Ok(buf),
            Err(e) => {
                self.disabled = true;
                tracing::warn!(month, error = %e, "failed to persist monthly secret; disabling hashing for the rest of the run");
                Err(e)
            }
        }
    }

    /// Scrub an IPv4 address.
    pub fn scrub_ipv4(&mut self, addr: Ipv4Addr, fingerprint: &[u8; 20], month: &str) -> ScrubResult {
        if !self.hashing_enabled {
            return ScrubResult::Ok(PASSTHROUGH_IPV4.to_string());
        }
        let secret = match self.get_secret_for_month(month) {
            Ok(s) => s,
            Err(_) => return ScrubResult::Disabled,
        };

        let mut message = Vec::with_capacity(55);
        message.extend_from_slice(&addr.octets());
        message.extend_from_slice(fingerprint);
        message.extend_from_slice(&secret[0..31]);
        let digest = Sha256::digest(&message);

        ScrubResult::Ok(format!("10.{}.{}.{}", digest[0], digest[1], digest[2]))
    }

    /// Scrub an IPv6 address literal (e.g. `fd00::1` or `::ffff:1.2.3.4`,
    /// without brackets).
    pub fn scrub_ipv6(&mut self, addr: &str, fingerprint: &[u8; 20], month: &str) -> ScrubResult {
        let Some(bytes) = normalize_ipv6(addr) else {
            return ScrubResult::Invalid;
        };

        if !self.hashing_enabled {
            return ScrubResult::Ok(PASSTHROUGH_IPV6.to_string());
        }
        let secret = match self.get_secret_for_month(month) {
            Ok(s) => s,
            Err(_) => return ScrubResult::Disabled,
        };

        let mut message = Vec::with_capacity(55);
        message.extend_from_slice(&bytes);
        message.extend_from_slice(fingerprint);
        message.extend_from_slice(&secret[31..50]);
        let digest = Sha256::digest(&message);

        let tail = hex::encode(&digest[29..32]);
        let (h01, h23) = tail.split_at(2);
        ScrubResult::Ok(format!("[fd9f:2e19:3bcf::{h01}:{h23}]"))
    }

    /// Scrub a TCP port given as its decimal string representation. Port
    /// `"0"` always maps to `"0"`, in both modes.
    pub fn scrub_tcp_port(&mut self, port_str: &str, fingerprint: &[u8; 20], month: &str) -> ScrubResult {
        if port_str == "0" {
            return ScrubResult::Ok("0".to_string());
        }
        let Ok(port) = port_str.parse::<u16>() else {
            return ScrubResult::Invalid;
        };

        if !self.hashing_enabled {
            return ScrubResult::Ok(PASSTHROUGH_PORT.to_string());
        }
        let secret = match self.get_secret_for_month(month) {
            Ok(s) => s,
            Err(_) => return ScrubResult::Disabled,
        };

        let mut message = Vec::with_capacity(55);
        message.extend_from_slice(&port.to_be_bytes());
        message.extend_from_slice(fingerprint);
        message.extend_from_slice(&secret[50..83]);
        let digest = Sha256::digest(&message);

        let value = u16::from_be_bytes([digest[0], digest[1]]) & 0x3FFF;
        ScrubResult::Ok(format!("{}", value | 0xC000))
    }

    /// Scrub a combined `addr:port` or `[ipv6]:port` string, splitting at
    /// the last colon (outside of brackets) and dispatching to
    /// [`scrub_ipv4`](Self::scrub_ipv4) or [`scrub_ipv6`](Self::scrub_ipv6).
    pub fn scrub_or_address(
        &mut self,
        addr_port: &str,
        fingerprint: &[u8; 20],
        month: &str,
    ) -> ScrubResult {
        if let Some(rest) = addr_port.strip_prefix('[') {
            let Some(close) = rest.find(']') else {
                return ScrubResult::Invalid;
            };
            let ip_part = &rest[..close];
            let Some(port_part) = rest[close + 1..].strip_prefix(':') else {
                return ScrubResult::Invalid;
            };
            match self.scrub_ipv6(ip_part, fingerprint, month) {
                ScrubResult::Ok(ip) => match self.scrub_tcp_port(port_part, fingerprint, month) {
                    ScrubResult::Ok(port) => ScrubResult::Ok(format!("{ip}:{port}")),
                    other => other,
                },
                other => other,
            }
        } else {
            let Some((ip_part, port_part)) = addr_port.rsplit_once(':') else {
                return ScrubResult::Invalid;
            };
            let Ok(addr) = ip_part.parse::<Ipv4Addr>() else {
                return ScrubResult::Invalid;
            };
            match self.scrub_ipv4(addr, fingerprint, month) {
                ScrubResult::Ok(ip) => match self.scrub_tcp_port(port_part, fingerprint, month) {
                    ScrubResult::Ok(port) => ScrubResult::Ok(format!("{ip}:{port}")),
                    other => other,
                },
                other => other,
            }
        }
    }
}

/// Normalize an IPv6 literal (no brackets) to 16 address bytes, per the
/// expansion rules: expand `::`, expand an embedded IPv4 tail to 4 bytes,
/// left-pad each hextet. Returns `None` if the address is malformed.
fn normalize_ipv6(s: &str) -> Option<[u8; 16]> {
    let double_colon_parts: Vec<&str> = s.splitn(3, "::").collect();
    let (head, tail, has_double_colon) = match double_colon_parts.len() {
        1 => (double_colon_parts[0], "", false),
        2 => (double_colon_parts[0], double_colon_parts[1], true),
        _ => return None,
    };

    let head_groups = parse_ipv6_groups(head)?;
    let tail_groups = parse_ipv6_groups(tail)?;
    let total = head_groups.len() + tail_groups.len();

    let groups: Vec<u16> = if has_double_colon {
        if total > 8 {
            return None;
        }
        let missing = 8 - total;
        head_groups
            .into_iter()
            .chain(std::iter::repeat(0u16).take(missing))
            .chain(tail_groups)
            .collect()
    } else {
        if total != 8 {
            return None;
        }
        head_groups.into_iter().chain(tail_groups).collect()
    };

    let mut bytes = [0u8; 16];
    for (i, group) in groups.iter().enumerate() {
        let be = group.to_be_bytes();
        bytes[i * 2] = be[0];
        bytes[i * 2 + 1] = be[1];
    }
    Some(bytes)
}

/// Parse a `:`-separated run of hextets (possibly ending in an embedded
/// IPv4 literal) into 16-bit groups.
fn parse_ipv6_groups(s: &str) -> Option<Vec<u16>> {
    if s.is_empty() {
        return Some(Vec::new());
    }
    let parts: Vec<&str> = s.split(':').collect();
    let mut groups = Vec::with_capacity(parts.len() + 1);
    for (i, part) in parts.iter().enumerate() {
        if part.contains('.') {
            if i != parts.len() - 1 {
                return None;
            }
            let octets: Vec<&str> = part.split('.').collect();
            if octets.len() != 4 {
                return None;
            }
            let mut bytes = [0u8; 4];
            for (j, o) in octets.iter().enumerate() {
                bytes[j] = o.parse::<u8>().ok()?;
            }
            groups.push(u16::from_be_bytes([bytes[0], bytes[1]]));
            groups.push(u16::from_be_bytes([bytes[2], bytes[3]]));
        } else {
            if part.is_empty() || part.len() > 4 {
                return None;
            }
            if !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            groups.push(u16::from_str_radix(part, 16).ok()?);
        }
    }
    Some(groups)
}
