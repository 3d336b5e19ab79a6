//! License Service: copies a detected upstream LICENSE file into the
//! consumer tree's per-vendor license slot (spec.md §4.5 step 4d, §6).
//!
//! The HTTP detectors (GitHub/GitLab adapters keyed off `GITHUB_TOKEN`/
//! `GITLAB_TOKEN`) are explicit non-goals; this module ships only the
//! local-file detector, behind the same `LicenseDetector` trait so a
//! consumer embedding this crate can supply a network-backed one later.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::VendorError;

const LICENSE_CANDIDATES: &[&str] = &[
    "LICENSE",
    "LICENSE.txt",
    "LICENSE.md",
    "COPYING",
    "license",
];

pub trait LicenseDetector {
    /// Return the absolute path to a detected license file in `scratch_root`,
    /// if any.
    fn detect(&self, scratch_root: &Path) -> Option<PathBuf>;
}

/// Looks for a well-known LICENSE filename at the root of the fetched
/// upstream tree. Non-counting: failure to find or copy a license is
/// never fatal to a vendor sync.
pub struct LocalLicenseDetector;

impl LicenseDetector for LocalLicenseDetector {
    fn detect(&self, scratch_root: &Path) -> Option<PathBuf> {
        LICENSE_CANDIDATES
            .iter()
            .map(|name| scratch_root.join(name))
            .find(|p| p.is_file())
    }
}

/// Copy the detected license (if any) to `<vendor_dir>/licenses/<vendor_name>.txt`.
/// Returns the destination's path relative to `consumer_root`, for recording
/// in the lock entry's `license_path`.
pub fn copy_license(
    detector: &dyn LicenseDetector,
    scratch_root: &Path,
    consumer_root: &Path,
    vendor_dir: &str,
    vendor_name: &str,
) -> Option<String> {
    let source = detector.detect(scratch_root)?;
    let rel_dest = format!("{vendor_dir}/licenses/{vendor_name}.txt");
    let dest_abs = consumer_root.join(&rel_dest);

    if let Some(parent) = dest_abs.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            log::warn!("failed to create license directory for {vendor_name}: {e}");
            return None;
        }
    }

    match fs::copy(&source, &dest_abs) {
        Ok(_) => Some(rel_dest),
        Err(e) => {
            log::warn!("failed to copy license for {vendor_name}: {e}");
            None
        }
    }
}

/// Error kind retained for symmetry with other component modules, even
/// though license failures are always swallowed to a warning at call
/// sites (spec.md §4.5 "non-counting").
pub fn license_io_error(path: &Path, detail: impl Into<String>) -> VendorError {
    VendorError::Io {
        path: path.to_path_buf(),
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_license_at_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("LICENSE"), "MIT").unwrap();
        let detected = LocalLicenseDetector.detect(dir.path());
        assert_eq!(detected, Some(dir.path().join("LICENSE")));
    }

    #[test]
    fn returns_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalLicenseDetector.detect(dir.path()).is_none());
    }

    #[test]
    fn copies_to_per_vendor_slot() {
        let scratch = tempfile::tempdir().unwrap();
        let consumer = tempfile::tempdir().unwrap();
        fs::write(scratch.path().join("LICENSE"), "MIT License text").unwrap();

        let rel = copy_license(
            &LocalLicenseDetector,
            scratch.path(),
            consumer.path(),
            "vendor/acme",
            "acme",
        )
        .unwrap();

        assert_eq!(rel, "vendor/acme/licenses/acme.txt");
        assert_eq!(
            fs::read_to_string(consumer.path().join(&rel)).unwrap(),
            "MIT License text"
        );
    }

    #[test]
    fn missing_license_returns_none_without_error() {
        let scratch = tempfile::tempdir().unwrap();
        let consumer = tempfile::tempdir().unwrap();
        let rel = copy_license(
            &LocalLicenseDetector,
            scratch.path(),
            consumer.path(),
            "vendor/acme",
            "acme",
        );
        assert!(rel.is_none());
    }
}
