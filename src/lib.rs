//! Source-level vendoring for Git repositories.
//!
//! This crate copies files and line/column ranges from upstream Git
//! repositories into a consumer project's tree, records exact provenance
//! in a lockfile, and can later verify or re-sync against that record.

pub mod cache;
pub mod cascade;
pub mod commit_annotator;
pub mod concurrency;
pub mod config;
pub mod content;
pub mod copy;
pub mod error;
pub mod git;
pub mod hooks;
pub mod license;
pub mod lock;
pub mod path;
pub mod policy;
pub mod sync;
pub mod url;
pub mod verify;

pub use error::VendorError;
