//! Persistent state for the bridge descriptor sanitizer.
//!
//! Three kinds of on-disk state are owned here, mirroring the role
//! `tor-persist` plays for the rest of the Arti workspace:
//!
//! - the [`SecretsStore`] (`bridge-ip-secrets`): an append-only `YYYY-MM,<hex>`
//!   text file holding the monthly secrets used by the sensitive-parts
//!   sanitizer;
//! - the [`ParsedArchives`] set (`parsed-bridge-directories`): one archive
//!   file name per line, recording which input tarballs have already been
//!   fully consumed;
//! - [`RunLock`], an `fslock`-backed guard preventing two sanitizer runs from
//!   touching the same output tree concurrently (the concurrency model
//!   requires this to be external to the sanitizer proper).

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

mod parsed;
mod run_lock;
mod secrets;

pub use parsed::ParsedArchives;
pub use run_lock::RunLock;
pub use secrets::SecretsStore;
