//! Sync Service: per-vendor mirror-aware fetch, checkout, copy, and cache
//! update, plus the incremental cache fast-path (spec.md §4.5, §4.10).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::cache::{build_cache, compute_file_checksum, CacheStore};
use crate::commit_annotator::VendorCommitInfo;
use crate::config::{BranchSpec, Vendor};
use crate::copy::{copy_mappings, hash_destination, mapping_dest_path, CopyStats, PositionRecord};
use crate::error::VendorError;
use crate::git::GitClient;
use crate::hooks::{run_hooks, HookPhase};
use crate::license::{copy_license, LicenseDetector};
use crate::lock::{LockEntry, LockFile, PositionLock};
use crate::path::parse_path_spec;
use crate::url::{is_local_path, resolve_local_url, resolve_vendor_urls, sanitize_url};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
    pub force: bool,
    pub no_cache: bool,
    pub allow_local_urls: bool,
    pub commit_after: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefMetadata {
    pub commit_hash: String,
    pub version_tag: Option<String>,
    pub positions: Vec<PositionRecord>,
    pub source_url_used: Option<String>,
}

/// Resolve each of a vendor's candidate URLs, rejecting local paths up
/// front unless `allow_local_urls` is set (spec.md §4.5 "Clone URL
/// resolution").
fn resolve_clone_urls(vendor: &Vendor, project_root: &Path, allow_local_urls: bool) -> Result<Vec<String>, VendorError> {
    let mut resolved = Vec::new();
    for raw in resolve_vendor_urls(vendor) {
        if is_local_path(&raw) {
            if !allow_local_urls {
                return Err(VendorError::LocalPathDisallowed(sanitize_url(&raw)));
            }
            resolved.push(resolve_local_url(&raw, project_root)?);
        } else {
            resolved.push(raw);
        }
    }
    Ok(resolved)
}

fn fetch_with_fallback(
    git: &dyn GitClient,
    scratch_dir: &Path,
    urls: &[String],
    ref_name: &str,
    stats: &mut CopyStats,
) -> Result<String, VendorError> {
    git.add_remote(scratch_dir, "origin", &urls[0])?;
    let mut current_url = urls[0].clone();

    let mut last_err: Option<VendorError> = None;
    for depth in [Some(1u32), None] {
        for url in urls.iter() {
            if *url != current_url {
                git.set_remote_url(scratch_dir, "origin", url)?;
                current_url = url.clone();
            }
            match git.fetch(scratch_dir, "origin", ref_name, depth) {
                Ok(()) => return Ok(url.clone()),
                Err(e) => {
                    stats
                        .warnings
                        .push(format!("fetch from {} failed: {e}", sanitize_url(url)));
                    last_err = Some(e);
                }
            }
        }
    }

    Err(VendorError::FetchFailed {
        vendor: String::new(),
        r#ref: ref_name.to_string(),
        last_error: last_err.map(|e| e.to_string()).unwrap_or_default(),
    })
}

fn is_stale_commit_error(detail: &str) -> bool {
    detail.contains("reference is not a tree") || detail.contains("not a valid object")
}

fn checkout_ref(
    git: &dyn GitClient,
    scratch_dir: &Path,
    locked_commit: Option<&str>,
    ref_name: &str,
    vendor_name: &str,
) -> Result<(), VendorError> {
    match locked_commit {
        Some(commit) => git.checkout(scratch_dir, commit).map_err(|e| {
            let detail = e.to_string();
            if is_stale_commit_error(&detail) {
                VendorError::StaleCommit {
                    vendor: vendor_name.to_string(),
                    r#ref: ref_name.to_string(),
                    commit: commit.to_string(),
                }
            } else {
                VendorError::CheckoutFailed {
                    vendor: vendor_name.to_string(),
                    r#ref: ref_name.to_string(),
                    detail,
                }
            }
        }),
        None => git.checkout(scratch_dir, "FETCH_HEAD").or_else(|_| {
            git.checkout(scratch_dir, ref_name).map_err(|e| VendorError::CheckoutFailed {
                vendor: vendor_name.to_string(),
                r#ref: ref_name.to_string(),
                detail: e.to_string(),
            })
        }),
    }
}

/// Test the cache fast-path for one `(vendor, ref, locked_commit)`
/// (spec.md §4.5, §4.10 `check_cache` state). Returns `Some(metadata)` on
/// a confirmed hit.
fn try_cache_fast_path(
    cache_store: &CacheStore,
    vendor: &Vendor,
    spec: &BranchSpec,
    locked_commit: &str,
    consumer_root: &Path,
) -> Option<RefMetadata> {
    let cache = cache_store.load(&vendor.name, &spec.r#ref);
    if cache.commit_hash != locked_commit {
        return None;
    }

    for mapping in &spec.mapping {
        if mapping.is_auto_named() {
            return None;
        }
        let dest = match mapping_dest_path(spec, mapping) {
            Ok(d) => d,
            Err(_) => return None,
        };
        let abs = consumer_root.join(&dest);
        let Some(cached_hash) = cache.hash_for(&dest) else {
            return None;
        };
        match compute_file_checksum(&abs) {
            Ok(actual) if actual == cached_hash => {}
            _ => return None,
        }
    }

    Some(RefMetadata {
        commit_hash: locked_commit.to_string(),
        version_tag: None,
        positions: Vec::new(),
        source_url_used: None,
    })
}

#[allow(clippy::too_many_arguments)]
fn sync_one_ref(
    git: &dyn GitClient,
    detector: &dyn LicenseDetector,
    cache_store: &CacheStore,
    vendor: &Vendor,
    spec: &BranchSpec,
    locked_commit: Option<&str>,
    options: &SyncOptions,
    consumer_root: &Path,
    project_root: &Path,
    now: DateTime<Utc>,
) -> Result<(RefMetadata, CopyStats, Option<String>), VendorError> {
    if !options.no_cache && !options.force {
        if let Some(commit) = locked_commit {
            if let Some(metadata) = try_cache_fast_path(cache_store, vendor, spec, commit, consumer_root) {
                let mut stats = CopyStats::default();
                stats.file_count = spec.mapping.len() as u64;
                return Ok((metadata, stats, None));
            }
        }
    }

    let urls = resolve_clone_urls(vendor, project_root, options.allow_local_urls)?;
    let primary = urls[0].clone();

    let scratch = tempfile::tempdir().map_err(|e| VendorError::Io {
        path: std::env::temp_dir(),
        detail: e.to_string(),
    })?;
    git.init(scratch.path())?;

    let mut stats = CopyStats::default();
    let used_url = fetch_with_fallback(git, scratch.path(), &urls, &spec.r#ref, &mut stats).map_err(|e| {
        if let VendorError::FetchFailed { r#ref, last_error, .. } = e {
            VendorError::FetchFailed {
                vendor: vendor.name.clone(),
                r#ref,
                last_error,
            }
        } else {
            e
        }
    })?;

    checkout_ref(git, scratch.path(), locked_commit, &spec.r#ref, &vendor.name)?;

    let commit_hash = git.head_hash(scratch.path())?;
    let version_tag = git.tag_for_commit(scratch.path(), &commit_hash)?;

    let vendor_dir = spec.default_target.clone().unwrap_or_else(|| vendor.name.clone());
    let license_path = copy_license(detector, scratch.path(), consumer_root, &vendor_dir, &vendor.name);

    let copy_stats = copy_mappings(scratch.path(), consumer_root, vendor, spec)?;
    stats += copy_stats;

    if !options.no_cache {
        let pairs: Vec<(String, std::path::PathBuf)> = spec
            .mapping
            .iter()
            .filter_map(|m| mapping_dest_path(spec, m).ok())
            .filter(|dest| !stats.removed.contains(dest))
            .map(|dest| {
                let abs = consumer_root.join(&dest);
                (dest, abs)
            })
            .collect();
        let cache_entry = build_cache(&vendor.name, &spec.r#ref, &commit_hash, now, &pairs);
        if let Err(e) = cache_store.save(&cache_entry) {
            stats.warnings.push(format!("failed to update cache for {}@{}: {e}", vendor.name, spec.r#ref));
        }
    }

    let source_url_used = (used_url != primary).then_some(used_url);

    Ok((
        RefMetadata {
            commit_hash,
            version_tag,
            positions: stats.positions.clone(),
            source_url_used,
        },
        stats,
        license_path,
    ))
}

/// Drive a full vendor sync across every `BranchSpec` (spec.md §4.5
/// "Per-vendor protocol").
#[allow(clippy::too_many_arguments)]
pub fn sync_vendor(
    git: &dyn GitClient,
    detector: &dyn LicenseDetector,
    cache_store: &CacheStore,
    vendor: &Vendor,
    locked_refs: Option<&HashMap<String, String>>,
    options: &SyncOptions,
    consumer_root: &Path,
    project_root: &Path,
    now: DateTime<Utc>,
) -> Result<(HashMap<String, RefMetadata>, CopyStats, Option<String>), VendorError> {
    run_hooks(
        vendor.hooks.pre_sync.as_ref(),
        HookPhase::PreSync,
        consumer_root,
        &vendor.name,
    )?;

    let mut results = HashMap::new();
    let mut total_stats = CopyStats::default();
    let mut license_path = None;

    for spec in &vendor.specs {
        let locked_commit = locked_refs.and_then(|m| m.get(&spec.r#ref)).map(String::as_str);
        let (metadata, stats, license) = sync_one_ref(
            git,
            detector,
            cache_store,
            vendor,
            spec,
            locked_commit,
            options,
            consumer_root,
            project_root,
            now,
        )?;
        total_stats += stats;
        results.insert(spec.r#ref.clone(), metadata);
        if license.is_some() {
            license_path = license;
        }
    }

    run_hooks(
        vendor.hooks.post_sync.as_ref(),
        HookPhase::PostSync,
        consumer_root,
        &vendor.name,
    )?;

    Ok((results, total_stats, license_path))
}

/// Per-destination SHA-256 of every non-removed mapping a ref's spec names,
/// for the lockfile's `file_hashes` map. A position mapping's destination
/// still gets its whole-file hash recorded here (spec.md §3: positions-only
/// mappings still record their underlying whole-file hash); `verify` is
/// responsible for not double-classifying a path a `PositionLock` covers.
pub fn whole_file_hashes(spec: &BranchSpec, consumer_root: &Path, removed: &[String]) -> BTreeMap<String, String> {
    let mut hashes = BTreeMap::new();
    for mapping in &spec.mapping {
        let Ok(dest_spec) = mapping.resolve_destination(spec.default_target.as_deref()) else {
            continue;
        };
        let Ok((bare, _position)) = parse_path_spec(&dest_spec) else {
            continue;
        };
        if removed.contains(&bare) {
            continue;
        }
        if let Ok(hash) = hash_destination(&consumer_root.join(&bare)) {
            hashes.insert(bare, hash);
        }
    }
    hashes
}

/// Collect the `(ref -> commit_hash)` locked for a vendor's prior sync, so
/// this sync can resolve a specific commit instead of the ref's tip.
pub fn locked_refs_for(lock: &LockFile, vendor_name: &str) -> Option<HashMap<String, String>> {
    let refs: HashMap<String, String> = lock
        .vendors
        .iter()
        .filter(|e| e.name == vendor_name)
        .map(|e| (e.r#ref.clone(), e.commit_hash.clone()))
        .collect();
    (!refs.is_empty()).then_some(refs)
}

/// Fold a vendor's post-sync metadata into the lockfile, one [`LockEntry`]
/// per synced ref.
pub fn upsert_lock_entries(
    lock: &mut LockFile,
    vendor: &Vendor,
    metadata: &HashMap<String, RefMetadata>,
    stats: &CopyStats,
    license_path: &Option<String>,
    consumer_root: &Path,
    now: DateTime<Utc>,
) {
    for (ref_name, meta) in metadata {
        let spec = vendor.specs.iter().find(|s| &s.r#ref == ref_name);
        let file_hashes = spec.map(|s| whole_file_hashes(s, consumer_root, &stats.removed)).unwrap_or_default();
        let positions: Vec<PositionLock> = meta
            .positions
            .iter()
            .map(|p| PositionLock {
                from: p.from.clone(),
                to: p.to.clone(),
                source_hash: p.source_hash.clone(),
            })
            .collect();

        lock.upsert(LockEntry {
            name: vendor.name.clone(),
            r#ref: ref_name.clone(),
            commit_hash: meta.commit_hash.clone(),
            license_path: license_path.clone(),
            updated_at: now,
            source_version_tag: meta.version_tag.clone(),
            source: vendor.source,
            file_hashes,
            positions,
            source_url: meta.source_url_used.clone(),
            source_file_hashes: None,
        });
    }
}

/// Build the per-vendor commit/note payload for a just-synced ref (spec.md
/// §4.9). Picks an arbitrary synced ref when a vendor has more than one;
/// every ref's mappings still land in the shared commit via path
/// aggregation.
pub fn build_commit_info(vendor: &Vendor, metadata: &HashMap<String, RefMetadata>, stats: &CopyStats, consumer_root: &Path) -> VendorCommitInfo {
    let (ref_name, meta) = metadata.iter().next().expect("vendor synced at least one ref");
    let spec = vendor.specs.iter().find(|s| &s.r#ref == ref_name);
    let mut file_hashes: Vec<(String, String)> = spec
        .map(|s| whole_file_hashes(s, consumer_root, &stats.removed).into_iter().collect())
        .unwrap_or_default();
    file_hashes.extend(meta.positions.iter().map(|p| (p.to.clone(), p.source_hash.clone())));
    let paths = file_hashes.iter().map(|(p, _)| p.clone()).collect();

    VendorCommitInfo {
        name: vendor.name.clone(),
        url: vendor.url.clone(),
        r#ref: ref_name.clone(),
        commit_hash: meta.commit_hash.clone(),
        license_spdx: vendor.license.clone(),
        source_version_tag: meta.version_tag.clone(),
        file_hashes,
        paths,
    }
}
