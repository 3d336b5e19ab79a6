//! Cascade Service: builds a dependency DAG from sibling project config
//! files and drives pulls (and optionally commits) in topological order
//! (spec.md §4.8).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::cache::CacheStore;
use crate::commit_annotator::{self, DiffTrailers};
use crate::config::{load_config, Vendor, VendorConfig, VendorSource};
use crate::error::VendorError;
use crate::git::GitClient;
use crate::license::LicenseDetector;
use crate::lock::LockStore;
use crate::sync::{build_commit_info, locked_refs_for, sync_vendor, upsert_lock_entries, SyncOptions};
use crate::url::{match_sibling_by_url, resolve_vendor_urls};

pub const CONFIG_FILE_NAME: &str = "vendor.yaml";

#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
    pub config: VendorConfig,
}

#[derive(Debug, Clone, Default)]
pub struct CascadeOptions {
    pub dry_run: bool,
    pub commit: bool,
    pub pr: bool,
    pub push: bool,
    pub internal_only: bool,
    pub reverse: bool,
}

impl CascadeOptions {
    /// `--pr`/`--push` are mutually exclusive; `--push` requires `--commit`
    /// (spec.md §4.8 "Option validation").
    pub fn validate(&self) -> Result<(), VendorError> {
        if self.pr && self.push {
            return Err(VendorError::ConfigInvalid("--pr and --push are mutually exclusive".to_string()));
        }
        if self.push && !self.commit {
            return Err(VendorError::ConfigInvalid("--push requires --commit".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ProjectFailure {
    pub project: String,
    pub phase: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct CascadeResult {
    pub order: Vec<String>,
    pub updated: Vec<String>,
    pub current: Vec<String>,
    pub failed: Vec<ProjectFailure>,
}

/// Enumerate direct subdirectories of `root` containing a vendor-config
/// file as sibling projects (spec.md §4.8 step 1).
pub fn discover_projects(root: &Path) -> Result<Vec<Project>, VendorError> {
    let mut projects = Vec::new();
    let entries = std::fs::read_dir(root).map_err(|e| VendorError::Io {
        path: root.to_path_buf(),
        detail: e.to_string(),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| VendorError::Io {
            path: root.to_path_buf(),
            detail: e.to_string(),
        })?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let config_path = path.join(CONFIG_FILE_NAME);
        if !config_path.is_file() {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let config = load_config(&config_path)?;
        projects.push(Project { name, root: path, config });
    }

    projects.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(projects)
}

/// Build the `project -> sibling` adjacency list by matching every
/// vendor's URL candidates against known sibling names (spec.md §4.8
/// step 2).
pub fn build_dependency_graph(projects: &[Project]) -> Result<BTreeMap<String, BTreeSet<String>>, VendorError> {
    let names: Vec<String> = projects.iter().map(|p| p.name.clone()).collect();
    let mut graph: BTreeMap<String, BTreeSet<String>> = names.iter().map(|n| (n.clone(), BTreeSet::new())).collect();

    for project in projects {
        for vendor in &project.config.vendors {
            for url in resolve_vendor_urls(vendor) {
                if let Some(sibling) = match_sibling_by_url(&url, &names) {
                    if sibling == project.name {
                        return Err(VendorError::ConfigInvalid(format!(
                            "project {} vendors from itself via {url}",
                            project.name
                        )));
                    }
                    graph.get_mut(&project.name).unwrap().insert(sibling.to_string());
                }
            }
        }
    }

    Ok(graph)
}

/// Kahn's algorithm with lexicographic tie-breaking (spec.md §4.8 step 3,
/// §8 "Quantified invariants").
pub fn topological_sort(graph: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, VendorError> {
    let mut in_degree: BTreeMap<String, usize> = graph.keys().map(|k| (k.clone(), 0)).collect();
    for deps in graph.values() {
        for dep in deps {
            *in_degree.entry(dep.clone()).or_insert(0) += 0; // ensure key exists
        }
    }
    // An edge project -> sibling means project depends on sibling, so
    // sibling must come first: sibling has no incoming edge from this,
    // project has an incoming edge from sibling in the "run order" sense.
    // We invert: treat `dep` as a prerequisite of `project`.
    for (project, deps) in graph {
        for _dep in deps {
            *in_degree.get_mut(project).unwrap() += 1;
        }
    }

    let mut reverse: BTreeMap<String, BTreeSet<String>> = graph.keys().map(|k| (k.clone(), BTreeSet::new())).collect();
    for (project, deps) in graph {
        for dep in deps {
            reverse.get_mut(dep).unwrap().insert(project.clone());
        }
    }

    let mut ready: VecDeque<String> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| name.clone())
        .collect::<Vec<_>>()
        .into_iter()
        .collect();
    let mut ready_sorted: Vec<String> = ready.drain(..).collect();
    ready_sorted.sort();
    let mut queue: VecDeque<String> = ready_sorted.into();

    let mut order = Vec::new();
    while let Some(name) = queue.pop_front() {
        order.push(name.clone());
        if let Some(dependents) = reverse.get(&name) {
            let mut newly_ready = Vec::new();
            for dependent in dependents {
                let deg = in_degree.get_mut(dependent).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(dependent.clone());
                }
            }
            newly_ready.sort();
            let mut merged: Vec<String> = queue.iter().cloned().collect();
            merged.extend(newly_ready);
            merged.sort();
            queue = merged.into();
        }
    }

    if order.len() != graph.len() {
        let participants: Vec<String> = graph.keys().filter(|k| !order.contains(k)).cloned().collect();
        return Err(VendorError::Cycle { participants });
    }

    Ok(order)
}

/// Discover sibling projects, build the dependency graph, and sort it into
/// run order (spec.md §4.8 steps 1-3). Shared by the dry-run and executing
/// paths of [`run_cascade`].
fn plan_order(root: &Path, options: &CascadeOptions) -> Result<(Vec<Project>, Vec<String>), VendorError> {
    let projects = discover_projects(root)?;
    let graph = build_dependency_graph(&projects)?;
    let mut order = topological_sort(&graph)?;
    if options.reverse {
        order.reverse();
    }
    Ok((projects, order))
}

/// Dry-run cascade planning: discover projects, build the graph, and sort
/// it, without touching git or the filesystem of any sibling project.
pub fn plan_cascade(root: &Path, options: &CascadeOptions) -> Result<CascadeResult, VendorError> {
    options.validate()?;
    let (_projects, order) = plan_order(root, options)?;

    Ok(CascadeResult {
        order,
        updated: Vec::new(),
        current: Vec::new(),
        failed: Vec::new(),
    })
}

/// Drive the full cascade: plan the run order, then for each project pull
/// its vendors, classify it `updated`/`current`, and (if `commit` is set)
/// create one annotated commit per project, optionally pushing a
/// `vendor-cascade/<date>` branch (spec.md §4.8 steps 4-5).
///
/// Opening the actual pull request on a forge (GitHub/GitLab) is left to an
/// HTTP collaborator, the same way license detection's HTTP adapters are:
/// this function pushes the branch `--pr`/`--push` ask for, but does not
/// call out to a forge API.
pub fn run_cascade(
    git: &dyn GitClient,
    detector: &dyn LicenseDetector,
    root: &Path,
    options: &CascadeOptions,
    now: DateTime<Utc>,
) -> Result<CascadeResult, VendorError> {
    options.validate()?;
    let (projects, order) = plan_order(root, options)?;

    let mut result = CascadeResult {
        order: order.clone(),
        updated: Vec::new(),
        current: Vec::new(),
        failed: Vec::new(),
    };

    if options.dry_run {
        return Ok(result);
    }

    let by_name: BTreeMap<&str, &Project> = projects.iter().map(|p| (p.name.as_str(), p)).collect();

    for name in &order {
        let Some(project) = by_name.get(name.as_str()) else {
            continue;
        };
        match sync_project(git, detector, project, options, now) {
            Ok(true) => result.updated.push(name.clone()),
            Ok(false) => result.current.push(name.clone()),
            Err(e) => result.failed.push(ProjectFailure {
                project: name.clone(),
                phase: "pull".to_string(),
                error: e.to_string(),
            }),
        }
    }

    Ok(result)
}

/// Pull every (optionally internal-only) vendor in `project`, fold the
/// results into its lockfile, and commit/push if asked. Returns whether
/// any ref actually moved.
fn sync_project(
    git: &dyn GitClient,
    detector: &dyn LicenseDetector,
    project: &Project,
    options: &CascadeOptions,
    now: DateTime<Utc>,
) -> Result<bool, VendorError> {
    let lock_path = project.root.join("vendor.lock.yaml");
    let lock_store = LockStore::new(&lock_path);
    let mut lock = lock_store.load()?;
    let cache_store = CacheStore::new(project.root.join(".vendor-cache"));

    let vendors: Vec<&Vendor> = project
        .config
        .vendors
        .iter()
        .filter(|v| !options.internal_only || v.source == VendorSource::Internal)
        .collect();

    let sync_options = SyncOptions {
        dry_run: false,
        force: false,
        no_cache: false,
        allow_local_urls: true,
        commit_after: options.commit,
    };

    let mut moved = false;
    let mut commit_infos = Vec::new();

    for vendor in vendors {
        let locked = locked_refs_for(&lock, &vendor.name);
        let (metadata, stats, license_path) = sync_vendor(
            git,
            detector,
            &cache_store,
            vendor,
            locked.as_ref(),
            &sync_options,
            &project.root,
            &project.root,
            now,
        )?;

        for (ref_name, meta) in &metadata {
            let previous = locked.as_ref().and_then(|m| m.get(ref_name));
            if previous != Some(&meta.commit_hash) {
                moved = true;
            }
        }

        upsert_lock_entries(&mut lock, vendor, &metadata, &stats, &license_path, &project.root, now);
        commit_infos.push(build_commit_info(vendor, &metadata, &stats, &project.root));
    }

    lock_store.save(&lock)?;

    if options.commit && !commit_infos.is_empty() {
        let branch = (options.pr || options.push).then(|| format!("vendor-cascade/{}", now.format("%Y-%m-%d")));
        if let Some(branch) = &branch {
            git.create_branch(&project.root, branch)?;
        }

        commit_annotator::annotate_commit(
            git,
            &project.root,
            &commit_infos,
            "cascade",
            &DiffTrailers::default(),
            &lock_path.to_string_lossy(),
            &project.root.join(CONFIG_FILE_NAME).to_string_lossy(),
        )?;

        if options.push {
            let branch = branch.expect("push implies a cascade branch was created");
            git.push(&project.root, "origin", &branch)?;
        }
    }

    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{save_config, BranchSpec, HookCommands, PathMapping, Vendor, VendorPolicy, VendorSource};
    use crate::git::{MockCall, MockGit};
    use crate::license::LocalLicenseDetector;

    fn write_project(root: &Path, name: &str, vendor_url: Option<&str>) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();

        let vendors = match vendor_url {
            Some(url) => vec![Vendor {
                name: "dep".to_string(),
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
                    default_target: None,
                    mapping: vec![PathMapping {
                        from: "a.go".to_string(),
                        to: "vendor/a.go".to_string(),
                    }],
                }],
            }],
            None => vec![],
        };

        save_config(&dir.join(CONFIG_FILE_NAME), &VendorConfig { vendors, ..Default::default() }).unwrap();
    }

    #[test]
    fn topology_orders_dependencies_before_dependents() {
        let root = tempfile::tempdir().unwrap();
        write_project(root.path(), "alpha", None);
        write_project(root.path(), "beta", Some("https://example.com/org/alpha.git"));
        write_project(root.path(), "gamma", Some("https://example.com/org/beta.git"));

        let result = plan_cascade(root.path(), &CascadeOptions { dry_run: true, ..Default::default() }).unwrap();
        assert_eq!(result.order, vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()]);
    }

    #[test]
    fn cycle_is_detected_and_names_participants() {
        let root = tempfile::tempdir().unwrap();
        write_project(root.path(), "alpha", Some("https://example.com/org/gamma.git"));
        write_project(root.path(), "beta", Some("https://example.com/org/alpha.git"));
        write_project(root.path(), "gamma", Some("https://example.com/org/beta.git"));

        let result = plan_cascade(root.path(), &CascadeOptions { dry_run: true, ..Default::default() });
        assert!(matches!(result, Err(VendorError::Cycle { .. })));
    }

    #[test]
    fn self_reference_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        write_project(root.path(), "alpha", Some("https://example.com/org/alpha.git"));

        let result = plan_cascade(root.path(), &CascadeOptions { dry_run: true, ..Default::default() });
        assert!(result.is_err());
    }

    #[test]
    fn pr_and_push_are_mutually_exclusive() {
        let options = CascadeOptions {
            pr: true,
            push: true,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn push_requires_commit() {
        let options = CascadeOptions {
            push: true,
            commit: false,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn push_with_commit_is_valid() {
        let options = CascadeOptions {
            push: true,
            commit: true,
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn unrelated_projects_sort_lexicographically() {
        let root = tempfile::tempdir().unwrap();
        write_project(root.path(), "zeta", None);
        write_project(root.path(), "alpha", None);
        write_project(root.path(), "mu", None);

        let result = plan_cascade(root.path(), &CascadeOptions { dry_run: true, ..Default::default() }).unwrap();
        assert_eq!(result.order, vec!["alpha".to_string(), "mu".to_string(), "zeta".to_string()]);
    }

    /// Writes a sibling project whose single vendor pulls from `source_url`
    /// into `vendor/acme/lib.go`, for the execution tests below.
    fn write_vendoring_project(root: &Path, name: &str, source_url: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let vendor = Vendor {
            name: "acme".to_string(),
            url: source_url.to_string(),
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
                default_target: None,
                mapping: vec![PathMapping {
                    from: "lib.go".to_string(),
                    to: "vendor/acme/lib.go".to_string(),
                }],
            }],
        };
        save_config(&dir.join(CONFIG_FILE_NAME), &VendorConfig { vendors: vec![vendor], ..Default::default() }).unwrap();
        dir
    }

    #[test]
    fn execution_reports_updated_and_creates_commit() {
        let root = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("lib.go"), "package main\n").unwrap();
        let project_dir = write_vendoring_project(root.path(), "downstream", &format!("file://{}", source.path().display()));

        let git = MockGit::new();
        let options = CascadeOptions {
            commit: true,
            ..Default::default()
        };
        let result = run_cascade(&git, &LocalLicenseDetector, root.path(), &options, Utc::now()).unwrap();

        assert_eq!(result.order, vec!["downstream".to_string()]);
        assert_eq!(result.updated, vec!["downstream".to_string()]);
        assert!(result.current.is_empty());
        assert!(result.failed.is_empty());
        assert!(project_dir.join("vendor/acme/lib.go").exists());
        assert!(git.calls().iter().any(|c| matches!(c, MockCall::Commit(dir, _) if dir == &project_dir)));
    }

    #[test]
    fn rerun_with_no_upstream_change_reports_current() {
        let root = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("lib.go"), "package main\n").unwrap();
        write_vendoring_project(root.path(), "downstream", &format!("file://{}", source.path().display()));

        let git = MockGit::new();
        let options = CascadeOptions::default();
        run_cascade(&git, &LocalLicenseDetector, root.path(), &options, Utc::now()).unwrap();
        let result = run_cascade(&git, &LocalLicenseDetector, root.path(), &options, Utc::now()).unwrap();

        assert_eq!(result.current, vec!["downstream".to_string()]);
        assert!(result.updated.is_empty());
    }

    #[test]
    fn per_project_failure_is_recorded_and_does_not_abort_the_run() {
        let root = tempfile::tempdir().unwrap();
        write_vendoring_project(root.path(), "broken", "bad://unreachable");
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("lib.go"), "package main\n").unwrap();
        write_vendoring_project(root.path(), "fine", &format!("file://{}", source.path().display()));

        let git = MockGit::new();
        git.fail_url("bad://unreachable");
        let options = CascadeOptions::default();
        let result = run_cascade(&git, &LocalLicenseDetector, root.path(), &options, Utc::now()).unwrap();

        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].project, "broken");
        assert_eq!(result.failed[0].phase, "pull");
        assert_eq!(result.updated, vec!["fine".to_string()]);
    }

    #[test]
    fn dry_run_does_not_sync_any_project() {
        let root = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("lib.go"), "package main\n").unwrap();
        let project_dir = write_vendoring_project(root.path(), "downstream", &format!("file://{}", source.path().display()));

        let git = MockGit::new();
        let options = CascadeOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = run_cascade(&git, &LocalLicenseDetector, root.path(), &options, Utc::now()).unwrap();

        assert_eq!(result.order, vec!["downstream".to_string()]);
        assert!(result.updated.is_empty());
        assert!(!project_dir.join("vendor/acme/lib.go").exists());
    }

    #[test]
    fn push_creates_a_dated_cascade_branch_before_committing() {
        let root = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("lib.go"), "package main\n").unwrap();
        let project_dir = write_vendoring_project(root.path(), "downstream", &format!("file://{}", source.path().display()));

        let git = MockGit::new();
        let options = CascadeOptions {
            commit: true,
            push: true,
            ..Default::default()
        };
        let now = Utc::now();
        run_cascade(&git, &LocalLicenseDetector, root.path(), &options, now).unwrap();

        let branch = format!("vendor-cascade/{}", now.format("%Y-%m-%d"));
        assert!(git
            .calls()
            .iter()
            .any(|c| matches!(c, MockCall::CreateBranch(dir, b) if dir == &project_dir && b == &branch)));
        assert!(git
            .calls()
            .iter()
            .any(|c| matches!(c, MockCall::Push(dir, remote, refspec) if dir == &project_dir && remote == "origin" && refspec == &branch)));
    }
}
