//! Commit Annotator: composes a structured commit message and a JSON note
//! payload bundling every vendor's changes into one commit (spec.md §4.9).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::VendorError;
use crate::git::GitClient;

pub const COMMIT_SCHEMA: &str = "vendor/v1";
pub const NOTE_REF: &str = "refs/notes/vendor";

#[derive(Debug, Clone)]
pub struct VendorCommitInfo {
    pub name: String,
    pub url: String,
    pub r#ref: String,
    pub commit_hash: String,
    pub license_spdx: Option<String>,
    pub source_version_tag: Option<String>,
    pub file_hashes: Vec<(String, String)>,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DiffTrailers {
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub files: Option<u64>,
    pub surface: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct NoteVendor {
    pub name: String,
    pub url: String,
    pub r#ref: String,
    pub commit_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_spdx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_version_tag: Option<String>,
    pub file_hashes: Vec<(String, String)>,
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CommitNote {
    pub schema: String,
    pub vendors: Vec<NoteVendor>,
}

/// Area derivation for the `Touch:` trailer: `a/b/c/file.go` -> `a.b`,
/// root-level files produce no area, numeric-initial segments are
/// dropped, backslashes normalize to forward slashes, leading dots strip
/// (spec.md §4.9 step 1).
pub fn touch_area(path: &str) -> Option<String> {
    let normalized = path.replace('\\', "/");
    let mut segments: Vec<&str> = normalized.split('/').collect();
    if !segments.is_empty() {
        segments.pop(); // drop the filename itself
    }
    let areas: Vec<String> = segments
        .into_iter()
        .map(|s| s.trim_start_matches('.'))
        .filter(|s| !s.is_empty())
        .filter(|s| !s.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false))
        .map(|s| s.to_string())
        .collect();

    if areas.is_empty() {
        None
    } else {
        Some(areas.join("."))
    }
}

fn touch_trailer(all_paths: &[String]) -> Option<String> {
    let areas: BTreeSet<String> = all_paths.iter().filter_map(|p| touch_area(p)).collect();
    if areas.is_empty() {
        None
    } else {
        Some(areas.into_iter().collect::<Vec<_>>().join(", "))
    }
}

/// Compose the single-line subject (spec.md §4.9 step 1).
pub fn subject_line(vendors: &[VendorCommitInfo], action: &str) -> String {
    match vendors {
        [single] => format!("chore(vendor): {action} {} to {}", single.name, single.r#ref),
        many => format!("chore(vendor): {action} {} vendors", many.len()),
    }
}

/// Build the ordered trailer block (spec.md §4.9 step 1).
pub fn trailers(vendors: &[VendorCommitInfo], diff: &DiffTrailers) -> Vec<String> {
    let mut lines = vec![
        format!("Commit-Schema: {COMMIT_SCHEMA}"),
        "Tags: vendor.update".to_string(),
    ];

    for vendor in vendors {
        lines.push(format!("Vendor-Name: {}", vendor.name));
        lines.push(format!("Vendor-Ref: {}", vendor.r#ref));
        lines.push(format!("Vendor-Commit: {}", vendor.commit_hash));
        if let Some(license) = &vendor.license_spdx {
            lines.push(format!("Vendor-License: {license}"));
        }
        if let Some(tag) = &vendor.source_version_tag {
            lines.push(format!("Vendor-Source-Tag: {tag}"));
        }
    }

    let all_paths: Vec<String> = vendors.iter().flat_map(|v| v.paths.iter().cloned()).collect();
    if let Some(touch) = touch_trailer(&all_paths) {
        lines.push(format!("Touch: {touch}"));
    }

    if let Some(additions) = diff.additions {
        lines.push(format!("Diff-Additions: {additions}"));
    }
    if let Some(deletions) = diff.deletions {
        lines.push(format!("Diff-Deletions: {deletions}"));
    }
    if let Some(files) = diff.files {
        lines.push(format!("Diff-Files: {files}"));
    }
    if let Some(surface) = &diff.surface {
        lines.push(format!("Diff-Surface: {surface}"));
    }

    lines
}

pub fn commit_message(vendors: &[VendorCommitInfo], action: &str, diff: &DiffTrailers) -> String {
    let subject = subject_line(vendors, action);
    let body = trailers(vendors, diff).join("\n");
    format!("{subject}\n\n{body}")
}

pub fn build_note(vendors: &[VendorCommitInfo]) -> CommitNote {
    CommitNote {
        schema: COMMIT_SCHEMA.to_string(),
        vendors: vendors
            .iter()
            .map(|v| NoteVendor {
                name: v.name.clone(),
                url: v.url.clone(),
                r#ref: v.r#ref.clone(),
                commit_hash: v.commit_hash.clone(),
                license_spdx: v.license_spdx.clone(),
                source_version_tag: v.source_version_tag.clone(),
                file_hashes: v.file_hashes.clone(),
                paths: v.paths.clone(),
            })
            .collect(),
    }
}

/// Aggregate every path that needs `git add`: per-vendor mapping
/// destinations, plus the lock path, config path, and any per-vendor
/// license path, deduplicated and forward-slash normalized across
/// vendors (spec.md §4.9 "Path aggregation").
pub fn aggregate_add_paths(vendors: &[VendorCommitInfo], lock_path: &str, config_path: &str) -> Vec<String> {
    let mut set: BTreeSet<String> = BTreeSet::new();
    set.insert(lock_path.replace('\\', "/"));
    set.insert(config_path.replace('\\', "/"));
    for vendor in vendors {
        for path in &vendor.paths {
            set.insert(path.replace('\\', "/"));
        }
    }
    set.into_iter().collect()
}

/// Stage paths, create one commit, and attach the JSON note under
/// [`NOTE_REF`]. Note attachment failure is logged and swallowed; commit
/// failure propagates (spec.md §4.9 step 2).
pub fn annotate_commit(
    git: &dyn GitClient,
    dir: &Path,
    vendors: &[VendorCommitInfo],
    action: &str,
    diff: &DiffTrailers,
    lock_path: &str,
    config_path: &str,
) -> Result<String, VendorError> {
    let paths = aggregate_add_paths(vendors, lock_path, config_path);
    let path_bufs: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
    git.add(dir, &path_bufs)?;

    let message = commit_message(vendors, action, diff);
    let commit_hash = git.commit(dir, &message)?;

    let note = build_note(vendors);
    match serde_json::to_string(&note) {
        Ok(payload) => {
            if let Err(e) = git.add_note(dir, &commit_hash, NOTE_REF, &payload) {
                log::warn!("failed to attach vendor note to {commit_hash}: {e}");
            }
        }
        Err(e) => log::warn!("failed to serialize vendor note: {e}"),
    }

    Ok(commit_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::MockGit;

    fn vendor(name: &str) -> VendorCommitInfo {
        VendorCommitInfo {
            name: name.to_string(),
            url: "https://example.com/x.git".to_string(),
            r#ref: "main".to_string(),
            commit_hash: "a".repeat(40),
            license_spdx: None,
            source_version_tag: None,
            file_hashes: vec![("vendor/lib.go".to_string(), "sha256:abc".to_string())],
            paths: vec!["vendor/lib.go".to_string()],
        }
    }

    #[test]
    fn single_vendor_subject_names_vendor_and_ref() {
        let vendors = vec![vendor("acme")];
        assert_eq!(subject_line(&vendors, "update"), "chore(vendor): update acme to main");
    }

    #[test]
    fn multi_vendor_subject_uses_count() {
        let vendors = vec![vendor("acme"), vendor("beta")];
        assert_eq!(subject_line(&vendors, "update"), "chore(vendor): update 2 vendors");
    }

    #[test]
    fn trailers_lead_with_schema_then_tags() {
        let vendors = vec![vendor("acme")];
        let lines = trailers(&vendors, &DiffTrailers::default());
        assert_eq!(lines[0], "Commit-Schema: vendor/v1");
        assert_eq!(lines[1], "Tags: vendor.update");
    }

    #[test]
    fn per_vendor_trailers_appear_in_fixed_order() {
        let mut v = vendor("acme");
        v.license_spdx = Some("MIT".to_string());
        v.source_version_tag = Some("v1.2.3".to_string());
        let lines = trailers(&[v], &DiffTrailers::default());

        let name_idx = lines.iter().position(|l| l == "Vendor-Name: acme").unwrap();
        let ref_idx = lines.iter().position(|l| l == "Vendor-Ref: main").unwrap();
        let commit_idx = lines.iter().position(|l| l.starts_with("Vendor-Commit:")).unwrap();
        let license_idx = lines.iter().position(|l| l == "Vendor-License: MIT").unwrap();
        let tag_idx = lines.iter().position(|l| l == "Vendor-Source-Tag: v1.2.3").unwrap();

        assert!(name_idx < ref_idx);
        assert!(ref_idx < commit_idx);
        assert!(commit_idx < license_idx);
        assert!(license_idx < tag_idx);
    }

    #[test]
    fn touch_area_derives_dotted_path_from_directories() {
        assert_eq!(touch_area("a/b/c/file.go"), Some("a.b.c".to_string()));
    }

    #[test]
    fn touch_area_is_none_for_root_level_file() {
        assert_eq!(touch_area("file.go"), None);
    }

    #[test]
    fn touch_area_drops_numeric_initial_segments() {
        assert_eq!(touch_area("a/2fast/file.go"), Some("a".to_string()));
    }

    #[test]
    fn touch_area_strips_leading_dots_and_normalizes_backslashes() {
        assert_eq!(touch_area("a\\.hidden\\file.go"), Some("a.hidden".to_string()));
    }

    #[test]
    fn touch_trailer_is_deduplicated_across_vendors() {
        let mut a = vendor("acme");
        a.paths = vec!["vendor/a/one.go".to_string(), "vendor/a/two.go".to_string()];
        let mut b = vendor("beta");
        b.paths = vec!["vendor/a/three.go".to_string()];
        let lines = trailers(&[a, b], &DiffTrailers::default());
        let touch = lines.iter().find(|l| l.starts_with("Touch:")).unwrap();
        assert_eq!(touch, "Touch: vendor.a");
    }

    #[test]
    fn diff_trailers_are_omitted_when_not_computable() {
        let vendors = vec![vendor("acme")];
        let lines = trailers(&vendors, &DiffTrailers::default());
        assert!(!lines.iter().any(|l| l.starts_with("Diff-")));
    }

    #[test]
    fn diff_trailers_appear_when_provided() {
        let vendors = vec![vendor("acme")];
        let diff = DiffTrailers {
            additions: Some(10),
            deletions: Some(2),
            files: Some(1),
            surface: Some("source".to_string()),
        };
        let lines = trailers(&vendors, &diff);
        assert!(lines.contains(&"Diff-Additions: 10".to_string()));
        assert!(lines.contains(&"Diff-Surface: source".to_string()));
    }

    #[test]
    fn aggregate_add_paths_dedupes_lock_config_and_license() {
        let mut v = vendor("acme");
        v.paths = vec!["vendor/lib.go".to_string(), "vendor.lock.yaml".to_string()];
        let paths = aggregate_add_paths(&[v], "vendor.lock.yaml", "vendor.yaml");
        assert_eq!(paths, vec!["vendor.lock.yaml".to_string(), "vendor.yaml".to_string(), "vendor/lib.go".to_string()]);
    }

    #[test]
    fn annotate_commit_stages_once_and_attaches_note() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vendor.lock.yaml"), "vendors: []\n").unwrap();
        let git = MockGit::new();

        let vendors = vec![vendor("acme")];
        let result = annotate_commit(
            &git,
            dir.path(),
            &vendors,
            "update",
            &DiffTrailers::default(),
            "vendor.lock.yaml",
            "vendor.yaml",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn build_note_schema_matches_constant() {
        let vendors = vec![vendor("acme")];
        let note = build_note(&vendors);
        assert_eq!(note.schema, "vendor/v1");
        assert_eq!(note.vendors.len(), 1);
    }
}
