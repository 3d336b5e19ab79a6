//! End-to-end coverage wiring the sync, lock, and verify services together
//! the way the binary does, using `MockGit` in place of a real git checkout
//! (spec.md §8 scenarios S1-S6).

use std::collections::{BTreeMap, HashMap};
use std::fs;

use chrono::Utc;
use rstest::rstest;

use vendorsync::cache::CacheStore;
use vendorsync::config::{BranchSpec, HookCommands, PathMapping, Vendor, VendorConfig, VendorPolicy, VendorSource};
use vendorsync::copy::hash_destination;
use vendorsync::git::MockGit;
use vendorsync::license::LocalLicenseDetector;
use vendorsync::lock::{LockEntry, LockFile, PositionLock};
use vendorsync::policy::exit_code;
use vendorsync::sync::{sync_vendor, SyncOptions};
use vendorsync::verify::{verify, OutcomeKind};

fn acme_vendor(url: &str, mapping: Vec<PathMapping>) -> Vendor {
    Vendor {
        name: "acme".to_string(),
        url: url.to_string(),
        mirrors: vec![],
        license: None,
        source: VendorSource::External,
        compliance: Default::default(),
        groups: Default::default(),
        hooks: HookCommands::default(),
        enforcement: Default::default(),
        policy: VendorPolicy::default(),
        specs: vec![BranchSpec {
            r#ref: "main".to_string(),
            default_target: Some("vendor/acme".to_string()),
            mapping,
        }],
    }
}

/// Mirrors the lockfile-building logic the binary performs after a sync:
/// every destination gets its whole-file hash recorded (positions-only
/// mappings too, per the underlying-whole-file-hash invariant), and
/// position mappings additionally get a `PositionLock` off the sync
/// metadata; `verify` classifies a position-covered destination only once.
fn upsert_from_sync(lock: &mut LockFile, vendor: &Vendor, meta: &vendorsync::sync::RefMetadata, consumer_root: &std::path::Path) {
    let spec = &vendor.specs[0];
    let mut file_hashes = BTreeMap::new();
    for mapping in &spec.mapping {
        let dest = mapping.resolve_destination(spec.default_target.as_deref()).unwrap();
        let (bare, _position) = vendorsync::path::parse_path_spec(&dest).unwrap();
        if let Ok(hash) = hash_destination(&consumer_root.join(&bare)) {
            file_hashes.insert(bare, hash);
        }
    }
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
        r#ref: spec.r#ref.clone(),
        commit_hash: meta.commit_hash.clone(),
        license_path: None,
        updated_at: Utc::now(),
        source_version_tag: meta.version_tag.clone(),
        source: vendor.source,
        file_hashes,
        positions,
        source_url: meta.source_url_used.clone(),
        source_file_hashes: None,
    });
}

/// S1: a clean whole-file sync followed by verify reports everything
/// verified, and doing it a second time (idempotence) changes nothing.
#[rstest]
fn whole_file_sync_then_verify_is_idempotent() {
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("lib.go"), "package main\n").unwrap();
    let consumer = tempfile::tempdir().unwrap();

    let vendor = acme_vendor(
        &format!("file://{}", source.path().display()),
        vec![PathMapping {
            from: "lib.go".to_string(),
            to: "vendor/acme/lib.go".to_string(),
        }],
    );
    let config = VendorConfig {
        vendors: vec![vendor.clone()],
        ..Default::default()
    };

    let git = MockGit::new();
    let cache_store = CacheStore::new(consumer.path().join(".vendor-cache"));
    let options = SyncOptions {
        allow_local_urls: true,
        ..Default::default()
    };
    let mut lock = LockFile::default();

    for _ in 0..2 {
        let (metadata, _stats, _license) = sync_vendor(
            &git,
            &LocalLicenseDetector,
            &cache_store,
            &vendor,
            None,
            &options,
            consumer.path(),
            consumer.path(),
            Utc::now(),
        )
        .unwrap();
        upsert_from_sync(&mut lock, &vendor, &metadata["main"], consumer.path());
    }

    assert_eq!(lock.vendors.len(), 1, "resync must update, not duplicate, the lock entry");

    let result = verify(&config, &lock, &cache_store, consumer.path(), Utc::now()).unwrap();
    assert_eq!(result.summary.verified, 1);
    assert_eq!(result.summary.modified, 0);
    assert!(matches!(result.summary.result, Some(OutcomeKind::Pass)));
    assert_eq!(exit_code(&config, &result), 0);
}

/// S2: a locally edited destination file is reported as modified, and a
/// strict-enforcement vendor with actionable drift fails the run (exit 1).
#[rstest]
fn local_edit_is_reported_as_modified_and_fails_strict_enforcement() {
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("lib.go"), "package main\n").unwrap();
    let consumer = tempfile::tempdir().unwrap();

    let mut vendor = acme_vendor(
        &format!("file://{}", source.path().display()),
        vec![PathMapping {
            from: "lib.go".to_string(),
            to: "vendor/acme/lib.go".to_string(),
        }],
    );
    vendor.enforcement = vendorsync::config::Enforcement::Strict;
    let config = VendorConfig {
        vendors: vec![vendor.clone()],
        ..Default::default()
    };

    let git = MockGit::new();
    let cache_store = CacheStore::new(consumer.path().join(".vendor-cache"));
    let options = SyncOptions {
        allow_local_urls: true,
        ..Default::default()
    };
    let mut lock = LockFile::default();

    let (metadata, _stats, _license) = sync_vendor(
        &git,
        &LocalLicenseDetector,
        &cache_store,
        &vendor,
        None,
        &options,
        consumer.path(),
        consumer.path(),
        Utc::now(),
    )
    .unwrap();
    upsert_from_sync(&mut lock, &vendor, &metadata["main"], consumer.path());

    fs::write(consumer.path().join("vendor/acme/lib.go"), "package main\n\n// edited locally\n").unwrap();

    let result = verify(&config, &lock, &cache_store, consumer.path(), Utc::now()).unwrap();
    assert_eq!(result.summary.modified, 1);
    assert_eq!(exit_code(&config, &result), 1);
}

/// S3: the primary URL is unreachable but a mirror succeeds; the sync
/// still completes and records which URL it actually used.
#[rstest]
fn mirror_fallback_completes_the_sync() {
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("lib.go"), "package main\n").unwrap();
    let consumer = tempfile::tempdir().unwrap();

    let vendor = Vendor {
        mirrors: vec![format!("file://{}", source.path().display())],
        ..acme_vendor(
            "bad://unreachable",
            vec![PathMapping {
                from: "lib.go".to_string(),
                to: "vendor/acme/lib.go".to_string(),
            }],
        )
    };

    let git = MockGit::new();
    git.fail_url("bad://unreachable");
    let cache_store = CacheStore::new(consumer.path().join(".vendor-cache"));
    let options = SyncOptions {
        allow_local_urls: true,
        ..Default::default()
    };

    let (metadata, _stats, _license) = sync_vendor(
        &git,
        &LocalLicenseDetector,
        &cache_store,
        &vendor,
        None,
        &options,
        consumer.path(),
        consumer.path(),
        Utc::now(),
    )
    .unwrap();

    assert!(consumer.path().join("vendor/acme/lib.go").exists());
    assert!(metadata["main"].source_url_used.is_some());
}

/// S6: a destination still on disk but no longer referenced by config is
/// reported as orphaned, not also as deleted/verified; one config still
/// maps a path the lock has never recorded, which is stale. Coherence
/// warnings alone (no modified/deleted) never move the exit code off 0.
#[rstest]
fn coherence_mismatch_between_config_and_lock_is_warn_only() {
    let consumer = tempfile::tempdir().unwrap();
    fs::create_dir_all(consumer.path().join("vendor/acme")).unwrap();
    fs::write(consumer.path().join("vendor/acme/new.go"), "package main\n").unwrap();

    let vendor = acme_vendor(
        "https://example.com/org/acme.git",
        vec![PathMapping {
            from: "new.go".to_string(),
            to: "vendor/acme/new.go".to_string(),
        }],
    );
    let config = VendorConfig {
        vendors: vec![vendor],
        ..Default::default()
    };

    // Lock references a destination the config no longer maps (orphaned)
    // and omits the one the config does map (stale).
    let mut lock = LockFile::default();
    lock.upsert(LockEntry {
        name: "acme".to_string(),
        r#ref: "main".to_string(),
        commit_hash: "a".repeat(40),
        license_path: None,
        updated_at: Utc::now(),
        source_version_tag: None,
        source: VendorSource::External,
        file_hashes: BTreeMap::from([("vendor/acme/removed.go".to_string(), "sha256:deadbeef".to_string())]),
        positions: vec![],
        source_url: None,
        source_file_hashes: None,
    });

    let cache_store = CacheStore::new(consumer.path().join(".vendor-cache"));
    let result = verify(&config, &lock, &cache_store, consumer.path(), Utc::now()).unwrap();

    assert_eq!(result.summary.stale, 1);
    assert_eq!(result.summary.orphaned, 1);
    assert_eq!(result.summary.modified, 0);
    assert_eq!(result.summary.deleted, 0, "a dropped mapping must not also surface as deleted");
    assert!(matches!(result.summary.result, Some(OutcomeKind::Warn)));
    assert_eq!(exit_code(&config, &result), 0, "coherence-only drift is never actionable");
}

/// A position-range mapping that never drifts verifies clean end to end,
/// exercising the splice-extraction path rather than the whole-file path.
#[rstest]
fn position_range_sync_then_verify_is_clean() {
    let source = tempfile::tempdir().unwrap();
    let upstream: String = (1..=20).map(|n| format!("line {n}\n")).collect();
    fs::write(source.path().join("src.go"), &upstream).unwrap();
    let consumer = tempfile::tempdir().unwrap();
    let preexisting: String = (1..=15).map(|n| format!("// dest {n}\n")).collect();
    fs::create_dir_all(consumer.path().join("vendor/acme")).unwrap();
    fs::write(consumer.path().join("vendor/acme/config.ts"), preexisting).unwrap();

    let vendor = acme_vendor(
        &format!("file://{}", source.path().display()),
        vec![PathMapping {
            from: "src.go:L4-L6".to_string(),
            to: "vendor/acme/config.ts:L10-L12".to_string(),
        }],
    );
    let config = VendorConfig {
        vendors: vec![vendor.clone()],
        ..Default::default()
    };

    let git = MockGit::new();
    let cache_store = CacheStore::new(consumer.path().join(".vendor-cache"));
    let options = SyncOptions {
        allow_local_urls: true,
        ..Default::default()
    };
    let mut lock = LockFile::default();

    let (metadata, _stats, _license) = sync_vendor(
        &git,
        &LocalLicenseDetector,
        &cache_store,
        &vendor,
        None,
        &options,
        consumer.path(),
        consumer.path(),
        Utc::now(),
    )
    .unwrap();
    upsert_from_sync(&mut lock, &vendor, &metadata["main"], consumer.path());

    let result = verify(&config, &lock, &cache_store, consumer.path(), Utc::now()).unwrap();
    assert_eq!(result.summary.verified, 1);
    assert_eq!(result.summary.modified, 0);

    let body = fs::read_to_string(consumer.path().join("vendor/acme/config.ts")).unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(&lines[9..12], ["line 4", "line 5", "line 6"]);
}

/// `HashMap<String, String>` of locked ref -> commit hash round-trips
/// through the sync cache fast-path without a second fetch when the
/// destination is untouched (spec.md §4.5, §4.10).
#[rstest]
fn cache_fast_path_is_observed_on_unmodified_resync() {
    let source = tempfile::tempdir().unwrap();
    fs::write(source.path().join("lib.go"), "package main\n").unwrap();
    let consumer = tempfile::tempdir().unwrap();

    let vendor = acme_vendor(
        &format!("file://{}", source.path().display()),
        vec![PathMapping {
            from: "lib.go".to_string(),
            to: "vendor/acme/lib.go".to_string(),
        }],
    );

    let git = MockGit::new();
    let cache_store = CacheStore::new(consumer.path().join(".vendor-cache"));
    let options = SyncOptions {
        allow_local_urls: true,
        ..Default::default()
    };

    let (metadata, _stats, _license) = sync_vendor(
        &git,
        &LocalLicenseDetector,
        &cache_store,
        &vendor,
        None,
        &options,
        consumer.path(),
        consumer.path(),
        Utc::now(),
    )
    .unwrap();
    let commit = metadata["main"].commit_hash.clone();
    let locked = HashMap::from([("main".to_string(), commit)]);

    let calls_before = git.calls().len();
    let (_metadata2, stats2, _license2) = sync_vendor(
        &git,
        &LocalLicenseDetector,
        &cache_store,
        &vendor,
        Some(&locked),
        &options,
        consumer.path(),
        consumer.path(),
        Utc::now(),
    )
    .unwrap();

    assert_eq!(git.calls().len(), calls_before, "unmodified resync must skip git entirely");
    assert_eq!(stats2.file_count, 1);
}
