//! Parsing, sanitization, and digesting of bridge network-status,
//! server-descriptor, and extra-info-descriptor documents.
//!
//! This crate is deliberately line-oriented rather than building a general
//! parse tree: every document type here is a flat sequence of keyword lines,
//! and the sanitizers are state machines over that sequence sharing a common
//! set of primitives (the builder, the digester, the sensitive-parts
//! sanitizer, and ed25519 certificate parsing).

#![deny(missing_docs)]

pub mod builder;
pub mod cert;
pub mod digest;
pub mod doc;
pub mod sanitize;

pub use builder::{DocBuilder, Slot};
pub use doc::{extrainfo, netstatus, serverdesc};
pub use sanitize::{ScrubResult, SensitiveSanitizer};
