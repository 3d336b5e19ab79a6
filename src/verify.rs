//! Verify Service: whole-file, range, coherence, and internal-direction
//! classification (spec.md §4.6).

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::config::{ComplianceMode, VendorConfig, VendorSource};
use crate::content::extract;
use crate::copy::{hash_destination, mapping_dest_path};
use crate::error::VendorError;
use crate::lock::LockFile;
use crate::path::parse_path_spec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Verified,
    Modified,
    Deleted,
    Added,
    Stale,
    Orphaned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Position,
    Coherence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDetail {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: String,
    pub status: Status,
    pub kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_detail: Option<PositionDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftDirection {
    Synced,
    SourceDrift,
    DestDrift,
    BothDrift,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalDrift {
    pub vendor_name: String,
    pub from: String,
    pub to: String,
    pub direction: DriftDirection,
    pub action_suggestion: String,
    pub compliance: ComplianceMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash_current: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_hash_current: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub verified: u64,
    pub modified: u64,
    pub deleted: u64,
    pub added: u64,
    pub stale: u64,
    pub orphaned: u64,
    pub total_files: u64,
    pub result: Option<OutcomeKind>,
}

impl Summary {
    pub fn from_files(files: &[FileStatus]) -> Self {
        let mut summary = Summary::default();
        for f in files {
            match f.status {
                Status::Verified => summary.verified += 1,
                Status::Modified => summary.modified += 1,
                Status::Deleted => summary.deleted += 1,
                Status::Added => summary.added += 1,
                Status::Stale => summary.stale += 1,
                Status::Orphaned => summary.orphaned += 1,
            }
        }
        summary.total_files = files.len() as u64;
        summary.result = Some(if summary.modified > 0 || summary.deleted > 0 {
            OutcomeKind::Fail
        } else if summary.added > 0 || summary.stale > 0 || summary.orphaned > 0 {
            OutcomeKind::Warn
        } else {
            OutcomeKind::Pass
        });
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResult {
    pub schema_version: u32,
    pub timestamp: DateTime<Utc>,
    pub summary: Summary,
    pub files: Vec<FileStatus>,
    pub internal_status: Vec<InternalDrift>,
}

pub fn verify(
    config: &VendorConfig,
    lock: &LockFile,
    cache_store: &CacheStore,
    consumer_root: &Path,
    now: DateTime<Utc>,
) -> Result<VerifyResult, VendorError> {
    let config_paths = collect_config_paths(config)?;

    let mut files = Vec::new();
    let mut internal_status = Vec::new();

    for entry in &lock.vendors {
        let vendor = config.vendor(&entry.name);

        let file_hashes = if entry.file_hashes.is_empty() {
            match backfill_from_cache(cache_store, entry) {
                Ok(hashes) => hashes,
                // An entry with recorded positions can still be classified
                // from those alone; only an entry with neither file_hashes
                // nor positions has genuinely nothing to verify against.
                Err(_) if !entry.positions.is_empty() => std::collections::BTreeMap::new(),
                Err(e) => return Err(e),
            }
        } else {
            entry.file_hashes.clone()
        };

        // A destination a PositionLock already covers is classified once,
        // below, via classify_position — recording its whole-file hash
        // (spec.md §3: positions-only mappings still record their
        // underlying whole-file hash) must not make it verify twice here.
        let position_dests: BTreeSet<String> = entry
            .positions
            .iter()
            .filter_map(|p| parse_path_spec(&p.to).ok().map(|(bare, _)| bare))
            .collect();

        // A destination the config no longer maps is reported purely as
        // `orphaned` below, not also as verified/modified/deleted here —
        // otherwise every dropped mapping would surface twice.
        for (dest_path, expected_hash) in &file_hashes {
            if !config_paths.contains(dest_path) || position_dests.contains(dest_path) {
                continue;
            }
            files.push(classify_whole_file(&entry.name, dest_path, expected_hash, consumer_root));
        }

        for position in &entry.positions {
            files.push(classify_position(&entry.name, position, consumer_root)?);
        }

        if entry.source == VendorSource::Internal {
            if let (Some(vendor), Some(source_hashes)) = (vendor, &entry.source_file_hashes) {
                internal_status.extend(classify_internal_direction(
                    vendor,
                    entry,
                    source_hashes,
                    consumer_root,
                ));
            }
        }
    }

    let lock_paths = lock.all_dest_paths();
    for stale in config_paths.difference(&lock_paths) {
        files.push(FileStatus {
            path: stale.clone(),
            status: Status::Stale,
            kind: FileKind::Coherence,
            vendor: None,
            expected_hash: None,
            actual_hash: None,
            position_detail: None,
        });
    }
    for orphaned in lock_paths.difference(&config_paths) {
        files.push(FileStatus {
            path: orphaned.clone(),
            status: Status::Orphaned,
            kind: FileKind::Coherence,
            vendor: None,
            expected_hash: None,
            actual_hash: None,
            position_detail: None,
        });
    }

    files.extend(detect_added_files(config, lock, consumer_root)?);

    let summary = Summary::from_files(&files);
    Ok(VerifyResult {
        schema_version: 1,
        timestamp: now,
        summary,
        files,
        internal_status,
    })
}

fn backfill_from_cache(
    cache_store: &CacheStore,
    entry: &crate::lock::LockEntry,
) -> Result<std::collections::BTreeMap<String, String>, VendorError> {
    let cache = cache_store.load(&entry.name, &entry.r#ref);
    if cache.commit_hash != entry.commit_hash || cache.files.is_empty() {
        return Err(VendorError::NoHashesAvailable {
            vendor: entry.name.clone(),
            r#ref: entry.r#ref.clone(),
        });
    }
    Ok(cache
        .files
        .iter()
        .map(|f| (f.path.clone(), format!("sha256:{}", f.hash)))
        .collect())
}

fn classify_whole_file(vendor: &str, dest_path: &str, expected_hash: &str, consumer_root: &Path) -> FileStatus {
    let abs = consumer_root.join(dest_path);
    if !abs.exists() {
        return FileStatus {
            path: dest_path.to_string(),
            status: Status::Deleted,
            kind: FileKind::File,
            vendor: Some(vendor.to_string()),
            expected_hash: Some(expected_hash.to_string()),
            actual_hash: None,
            position_detail: None,
        };
    }

    let actual = hash_destination(&abs).ok();
    let status = if actual.as_deref() == Some(expected_hash) {
        Status::Verified
    } else {
        Status::Modified
    };
    FileStatus {
        path: dest_path.to_string(),
        status,
        kind: FileKind::File,
        vendor: Some(vendor.to_string()),
        expected_hash: Some(expected_hash.to_string()),
        actual_hash: actual,
        position_detail: None,
    }
}

fn classify_position(
    vendor: &str,
    position: &crate::lock::PositionLock,
    consumer_root: &Path,
) -> Result<FileStatus, VendorError> {
    let (to_bare, to_pos) = parse_path_spec(&position.to)?;
    let abs = consumer_root.join(&to_bare);

    let detail = PositionDetail {
        from: position.from.clone(),
        to: position.to.clone(),
    };

    if !abs.exists() {
        return Ok(FileStatus {
            path: to_bare,
            status: Status::Deleted,
            kind: FileKind::Position,
            vendor: Some(vendor.to_string()),
            expected_hash: Some(position.source_hash.clone()),
            actual_hash: None,
            position_detail: Some(detail),
        });
    }

    match extract(&abs, to_pos) {
        Ok(extracted) => {
            let status = if extracted.source_hash == position.source_hash {
                Status::Verified
            } else {
                Status::Modified
            };
            Ok(FileStatus {
                path: to_bare,
                status,
                kind: FileKind::Position,
                vendor: Some(vendor.to_string()),
                expected_hash: Some(position.source_hash.clone()),
                actual_hash: Some(extracted.source_hash),
                position_detail: Some(detail),
            })
        }
        Err(e) => Ok(FileStatus {
            path: to_bare,
            status: Status::Modified,
            kind: FileKind::Position,
            vendor: Some(vendor.to_string()),
            expected_hash: Some(position.source_hash.clone()),
            actual_hash: Some(e.to_string()),
            position_detail: Some(detail),
        }),
    }
}

fn classify_internal_direction(
    vendor: &crate::config::Vendor,
    entry: &crate::lock::LockEntry,
    source_hashes_locked: &std::collections::BTreeMap<String, String>,
    consumer_root: &Path,
) -> Vec<InternalDrift> {
    let mut drifts = Vec::new();

    for (source_path, locked_source_hash) in source_hashes_locked {
        let source_abs = consumer_root.join(source_path);
        let current_source_hash = hash_destination(&source_abs).ok();
        let source_changed = current_source_hash.as_deref() != Some(locked_source_hash.as_str());

        for (dest_path, locked_dest_hash) in &entry.file_hashes {
            let dest_abs = consumer_root.join(dest_path);
            let current_dest_hash = hash_destination(&dest_abs).ok();
            let dest_changed = current_dest_hash.as_deref() != Some(locked_dest_hash.as_str());

            let direction = match (source_changed, dest_changed) {
                (false, false) => DriftDirection::Synced,
                (true, false) => DriftDirection::SourceDrift,
                (false, true) => DriftDirection::DestDrift,
                (true, true) => DriftDirection::BothDrift,
            };

            let action_suggestion = action_suggestion(vendor.compliance, direction);

            drifts.push(InternalDrift {
                vendor_name: entry.name.clone(),
                from: source_path.clone(),
                to: dest_path.clone(),
                direction,
                action_suggestion,
                compliance: vendor.compliance,
                source_hash_current: current_source_hash.clone(),
                dest_hash_current: current_dest_hash,
            });
        }
    }

    drifts
}

fn action_suggestion(compliance: ComplianceMode, direction: DriftDirection) -> String {
    match (compliance, direction) {
        (_, DriftDirection::Synced) => "none".to_string(),
        (ComplianceMode::SourceCanonical, DriftDirection::SourceDrift) => "propagate source -> dest".to_string(),
        (ComplianceMode::SourceCanonical, DriftDirection::DestDrift) => {
            "warning: dest modified (source-canonical)".to_string()
        }
        (ComplianceMode::Bidirectional, DriftDirection::DestDrift) => "propagate dest -> source".to_string(),
        (ComplianceMode::Bidirectional, DriftDirection::SourceDrift) => "propagate source -> dest".to_string(),
        (_, DriftDirection::BothDrift) => "conflict: both sides modified".to_string(),
    }
}

fn collect_config_paths(config: &VendorConfig) -> Result<BTreeSet<String>, VendorError> {
    let mut paths = BTreeSet::new();
    for vendor in &config.vendors {
        for spec in &vendor.specs {
            for mapping in &spec.mapping {
                paths.insert(mapping_dest_path(spec, mapping)?);
            }
        }
    }
    Ok(paths)
}

fn detect_added_files(
    config: &VendorConfig,
    lock: &LockFile,
    consumer_root: &Path,
) -> Result<Vec<FileStatus>, VendorError> {
    let known = lock.all_dest_paths();
    let mut added = Vec::new();

    let mut directory_dests: BTreeSet<String> = BTreeSet::new();
    for vendor in &config.vendors {
        for spec in &vendor.specs {
            for mapping in &spec.mapping {
                let dest = mapping_dest_path(spec, mapping)?;
                if consumer_root.join(&dest).is_dir() {
                    directory_dests.insert(dest);
                }
            }
        }
    }

    for dir_dest in &directory_dests {
        let abs_dir = consumer_root.join(dir_dest);
        let walker = WalkBuilder::new(&abs_dir).hidden(false).git_ignore(false).build();
        for entry in walker.flatten() {
            if entry.file_type().is_some_and(|t| t.is_dir()) {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(consumer_root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if !known.contains(&rel) {
                added.push(FileStatus {
                    path: rel,
                    status: Status::Added,
                    kind: FileKind::File,
                    vendor: None,
                    expected_hash: None,
                    actual_hash: None,
                    position_detail: None,
                });
            }
        }
    }

    Ok(added)
}
