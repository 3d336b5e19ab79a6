//! Structured errors for the vendoring engine.
//!
//! Mirrors the shape of a typical git-client error enum: one flat set of
//! named variants, enough context embedded to identify the failing vendor
//! without a human needing to re-run with extra flags, and a plain
//! [`std::fmt::Display`] impl. Unlike a CLI-facing error type, this one
//! never embeds ANSI styling or emoji — that's the presentation layer's
//! job, not the core's.

use std::path::PathBuf;

#[derive(Debug)]
pub enum VendorError {
    /// Config file is structurally invalid: missing field, duplicate vendor
    /// name, empty specs/mappings, or mutually exclusive options set together.
    ConfigInvalid(String),
    /// A destination path is absolute or escapes the consumer root via `..`.
    UnsafePath { path: String, reason: &'static str },
    /// A `:L10-L12`/`:C5-C20` position specifier is malformed.
    PositionInvalid(String),
    /// A position specifier's range does not fit the source or destination.
    PositionOutOfRange { path: String, detail: String },
    /// A `file://`/local filesystem URL was used without `allow_local_urls`.
    LocalPathDisallowed(String),
    /// Every URL candidate failed at both shallow and full clone depth.
    FetchFailed {
        vendor: String,
        r#ref: String,
        last_error: String,
    },
    /// Checkout was refused for a reason other than a stale locked commit.
    CheckoutFailed {
        vendor: String,
        r#ref: String,
        detail: String,
    },
    /// The locked commit is no longer reachable from the upstream remote.
    StaleCommit {
        vendor: String,
        r#ref: String,
        commit: String,
    },
    /// The sibling dependency graph built by the cascade service has a cycle.
    Cycle { participants: Vec<String> },
    /// Verify was invoked but neither the lockfile nor a commit-matching
    /// cache entry has any file hashes to check against.
    NoHashesAvailable { vendor: String, r#ref: String },
    /// A user-supplied pre/post-sync hook command exited non-zero.
    HookFailed {
        vendor: String,
        command: String,
        exit_code: Option<i32>,
    },
    /// A cooperative cancellation signal was observed mid-operation.
    Cancelled,
    /// The underlying git client reported a failure.
    GitCommandFailed { command: String, detail: String },
    /// Filesystem I/O failure, wrapped with the path that triggered it.
    Io { path: PathBuf, detail: String },
}

impl VendorError {
    pub fn unsafe_path(path: impl Into<String>, reason: &'static str) -> Self {
        VendorError::UnsafePath {
            path: path.into(),
            reason,
        }
    }

    /// True for the one error kind that callers must never treat as a
    /// per-vendor failure when reporting (spec.md §7 / §9).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VendorError::Cancelled)
    }
}

impl std::fmt::Display for VendorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VendorError::ConfigInvalid(msg) => write!(f, "invalid vendor configuration: {msg}"),
            VendorError::UnsafePath { path, reason } => {
                write!(f, "unsafe destination path {path:?}: {reason}")
            }
            VendorError::PositionInvalid(spec) => {
                write!(f, "invalid position specifier {spec:?}")
            }
            VendorError::PositionOutOfRange { path, detail } => {
                write!(f, "position out of range for {path:?}: {detail}")
            }
            VendorError::LocalPathDisallowed(url) => {
                write!(
                    f,
                    "local path URL {url:?} requires allow_local_urls to be set"
                )
            }
            VendorError::FetchFailed {
                vendor,
                r#ref,
                last_error,
            } => write!(
                f,
                "failed to fetch {vendor}@{ref}: all URL candidates failed ({last_error})"
            ),
            VendorError::CheckoutFailed {
                vendor,
                r#ref,
                detail,
            } => write!(f, "checkout failed for {vendor}@{ref}: {detail}"),
            VendorError::StaleCommit {
                vendor,
                r#ref,
                commit,
            } => write!(
                f,
                "locked commit {short} for {vendor}@{ref} is no longer reachable upstream",
                short = &commit[..commit.len().min(12)]
            ),
            VendorError::Cycle { participants } => {
                write!(
                    f,
                    "dependency cycle among projects: {}",
                    participants.join(" -> ")
                )
            }
            VendorError::NoHashesAvailable { vendor, r#ref } => write!(
                f,
                "no file hashes available to verify {vendor}@{ref} (lock and cache both empty)"
            ),
            VendorError::HookFailed {
                vendor,
                command,
                exit_code,
            } => write!(
                f,
                "hook command for {vendor} failed (exit {code:?}): {command}",
                code = exit_code
            ),
            VendorError::Cancelled => write!(f, "operation cancelled"),
            VendorError::GitCommandFailed { command, detail } => {
                write!(f, "git command failed ({command}): {detail}")
            }
            VendorError::Io { path, detail } => {
                write!(f, "I/O error at {path:?}: {detail}")
            }
        }
    }
}

impl std::error::Error for VendorError {}
