use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

mod cli;

use cli::{Cli, Commands};
use vendorsync::cache::CacheStore;
use vendorsync::commit_annotator::{self, DiffTrailers, VendorCommitInfo};
use vendorsync::concurrency::{run_external_phase, Cancellation};
use vendorsync::config::{load_config, Vendor, VendorConfig, VendorSource};
use vendorsync::git::{GitClient, SystemGit};
use vendorsync::license::LocalLicenseDetector;
use vendorsync::lock::LockStore;
use vendorsync::policy::exit_code;
use vendorsync::sync::{build_commit_info, locked_refs_for, sync_vendor, upsert_lock_entries, SyncOptions};
use vendorsync::verify::verify;

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "off" }),
    )
    .init();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config_path = cli.config.clone().unwrap_or_else(|| project_root.join("vendor.yaml"));

    match run(&cli, &project_root, &config_path) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

fn run(cli: &Cli, project_root: &Path, config_path: &Path) -> Result<i32> {
    let config = load_config(config_path).context("failed to load vendor config")?;

    match &cli.command {
        Commands::Sync(args) | Commands::Update(args) => run_sync(&config, args, project_root),
        Commands::Verify(args) => run_verify(&config, args, project_root),
        Commands::Cascade(args) => run_cascade(args, project_root),
        Commands::CommitAnnotate(args) => run_commit_annotate(&config, args, project_root),
    }
}

fn select_vendors<'a>(config: &'a VendorConfig, vendor: Option<&str>, group: Option<&str>) -> Vec<&'a Vendor> {
    config
        .vendors
        .iter()
        .filter(|v| vendor.is_none_or(|name| v.name == name))
        .filter(|v| group.is_none_or(|g| v.groups.contains(g)))
        .collect()
}

fn run_sync(config: &VendorConfig, args: &cli::SyncArgs, project_root: &Path) -> Result<i32> {
    let lock_path = project_root.join("vendor.lock.yaml");
    let lock_store = LockStore::new(&lock_path);
    let mut lock = lock_store.load().context("failed to load lockfile")?;
    let cache_store = CacheStore::new(project_root.join(".vendor-cache"));
    let git = SystemGit::default();
    let detector = LocalLicenseDetector;
    let now = Utc::now();

    let selected = select_vendors(config, args.vendor.as_deref(), args.group.as_deref());
    let internal: Vec<&Vendor> = selected.iter().copied().filter(|v| v.source == VendorSource::Internal).collect();
    let external: Vec<&Vendor> = selected.iter().copied().filter(|v| v.source == VendorSource::External).collect();

    let options = SyncOptions {
        dry_run: args.dry_run,
        force: args.force,
        no_cache: args.no_cache,
        allow_local_urls: args.local,
        commit_after: args.commit,
    };

    let mut commit_infos = Vec::new();

    for vendor in internal {
        let locked = locked_refs_for(&lock, &vendor.name);
        let (metadata, stats, license_path) =
            sync_vendor(&git, &detector, &cache_store, vendor, locked.as_ref(), &options, project_root, project_root, now)
                .with_context(|| format!("sync failed for internal vendor {}", vendor.name))?;
        upsert_lock_entries(&mut lock, vendor, &metadata, &stats, &license_path, project_root, now);
        commit_infos.push(build_commit_info(vendor, &metadata, &stats, project_root));
    }

    if !external.is_empty() {
        let cancellation = Cancellation::new();
        let outcomes = run_external_phase(&external, args.parallel, &cancellation, |vendor| {
            let locked = locked_refs_for(&lock, &vendor.name);
            sync_vendor(&git, &detector, &cache_store, vendor, locked.as_ref(), &options, project_root, project_root, now)
        })?;

        for (name, outcome) in outcomes {
            let (metadata, stats, license_path) = outcome.with_context(|| format!("sync failed for vendor {name}"))?;
            let vendor = config.vendor(&name).expect("vendor disappeared mid-sync");
            upsert_lock_entries(&mut lock, vendor, &metadata, &stats, &license_path, project_root, now);
            commit_infos.push(build_commit_info(vendor, &metadata, &stats, project_root));
        }
    }

    if !args.dry_run {
        lock_store.save(&lock).context("failed to save lockfile")?;
    }

    if args.commit && !commit_infos.is_empty() {
        let git: &dyn GitClient = &git;
        commit_annotator::annotate_commit(
            git,
            project_root,
            &commit_infos,
            "update",
            &DiffTrailers::default(),
            &lock_path.to_string_lossy(),
            &project_root.join("vendor.yaml").to_string_lossy(),
        )
        .context("failed to create annotated commit")?;
    }

    Ok(0)
}

fn run_verify(config: &VendorConfig, args: &cli::VerifyArgs, project_root: &Path) -> Result<i32> {
    let lock_store = LockStore::new(project_root.join("vendor.lock.yaml"));
    let lock = lock_store.load().context("failed to load lockfile")?;
    let cache_store = CacheStore::new(project_root.join(".vendor-cache"));

    let scoped = if args.vendor.is_some() || args.group.is_some() || args.internal_only {
        let selected = select_vendors(config, args.vendor.as_deref(), args.group.as_deref());
        VendorConfig {
            vendors: selected
                .into_iter()
                .filter(|v| !args.internal_only || v.source == VendorSource::Internal)
                .cloned()
                .collect(),
            ..config.clone()
        }
    } else {
        config.clone()
    };

    let result = verify(&scoped, &lock, &cache_store, project_root, Utc::now()).context("verify failed")?;
    let json = serde_json::to_string_pretty(&result).context("failed to serialize verify result")?;
    println!("{json}");

    Ok(exit_code(&scoped, &result))
}

fn run_cascade(args: &cli::CascadeArgs, project_root: &Path) -> Result<i32> {
    let options = vendorsync::cascade::CascadeOptions {
        dry_run: args.dry_run,
        commit: args.commit,
        pr: args.pr,
        push: args.push,
        internal_only: args.internal_only,
        reverse: args.reverse,
    };

    let git = SystemGit::default();
    let result = vendorsync::cascade::run_cascade(&git, &LocalLicenseDetector, project_root, &options, Utc::now())
        .context("cascade failed")?;

    for name in &result.order {
        let status = if result.updated.contains(name) {
            "updated"
        } else if result.current.contains(name) {
            "current"
        } else if result.failed.iter().any(|f| &f.project == name) {
            "failed"
        } else {
            "planned"
        };
        println!("{name}: {status}");
    }
    for failure in &result.failed {
        eprintln!("{}: {} failed: {}", failure.project, failure.phase, failure.error);
    }

    Ok(if result.failed.is_empty() { 0 } else { 1 })
}

fn run_commit_annotate(config: &VendorConfig, args: &cli::CommitAnnotateArgs, project_root: &Path) -> Result<i32> {
    let lock_path = project_root.join("vendor.lock.yaml");
    let lock_store = LockStore::new(&lock_path);
    let lock = lock_store.load().context("failed to load lockfile")?;

    let infos: Vec<VendorCommitInfo> = lock
        .vendors
        .iter()
        .filter_map(|entry| {
            let vendor = config.vendor(&entry.name)?;
            let mut file_hashes: Vec<(String, String)> = entry.file_hashes.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            file_hashes.extend(entry.positions.iter().map(|p| (p.to.clone(), p.source_hash.clone())));
            let paths = file_hashes.iter().map(|(p, _)| p.clone()).collect();

            Some(VendorCommitInfo {
                name: entry.name.clone(),
                url: vendor.url.clone(),
                r#ref: entry.r#ref.clone(),
                commit_hash: entry.commit_hash.clone(),
                license_spdx: vendor.license.clone(),
                source_version_tag: entry.source_version_tag.clone(),
                file_hashes,
                paths,
            })
        })
        .collect();

    if infos.is_empty() {
        anyhow::bail!("nothing to annotate: lockfile has no entries matching the current config");
    }

    let git = SystemGit::default();
    let git: &dyn GitClient = &git;
    commit_annotator::annotate_commit(
        git,
        project_root,
        &infos,
        &args.action,
        &DiffTrailers::default(),
        &lock_path.to_string_lossy(),
        &project_root.join("vendor.yaml").to_string_lossy(),
    )
    .context("failed to create annotated commit")?;

    Ok(0)
}
