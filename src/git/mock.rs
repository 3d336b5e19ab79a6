//! In-memory fake [`GitClient`] for tests: simulates clone/fetch/checkout
//! against plain directories (typically `file://`-style local fixtures)
//! without shelling out to a real `git` binary.
//!
//! Remote URLs recognized as local paths are "fetched" by copying their
//! tree into a staging area and "checked out" by copying that staging
//! area into the working directory, matching the observable behavior the
//! Sync Service depends on (fetch, then checkout, then read HEAD) without
//! needing an actual `.git` database.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::error::VendorError;

use super::GitClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Init(PathBuf),
    AddRemote(PathBuf, String, String),
    SetRemoteUrl(PathBuf, String, String),
    Fetch(PathBuf, String, String, Option<u32>),
    Checkout(PathBuf, String),
    Commit(PathBuf, String),
    CreateBranch(PathBuf, String),
    Push(PathBuf, String, String),
}

#[derive(Default)]
struct DirState {
    remotes: HashMap<String, String>,
    fetched_from: Option<String>,
    head: Option<String>,
}

pub struct MockGit {
    calls: Mutex<Vec<MockCall>>,
    state: Mutex<HashMap<PathBuf, DirState>>,
    fail_urls: Mutex<std::collections::HashSet<String>>,
    stale_commits: Mutex<std::collections::HashSet<String>>,
    tags: Mutex<HashMap<String, String>>,
    commit_counter: AtomicU64,
}

impl Default for MockGit {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            state: Mutex::new(HashMap::new()),
            fail_urls: Mutex::new(std::collections::HashSet::new()),
            stale_commits: Mutex::new(std::collections::HashSet::new()),
            tags: Mutex::new(HashMap::new()),
            commit_counter: AtomicU64::new(0),
        }
    }
}

impl MockGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure `url` to fail every fetch attempt (simulating an
    /// unreachable mirror, spec.md §4.5 mirror fallback).
    pub fn fail_url(&self, url: impl Into<String>) {
        self.fail_urls.lock().unwrap().insert(url.into());
    }

    /// Configure `commit` to be reported unreachable at checkout time
    /// (spec.md §4.5/§8 S4 stale-commit scenario).
    pub fn mark_stale(&self, commit: impl Into<String>) {
        self.stale_commits.lock().unwrap().insert(commit.into());
    }

    pub fn set_tag(&self, commit: impl Into<String>, tag: impl Into<String>) {
        self.tags.lock().unwrap().insert(commit.into(), tag.into());
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn local_source(url: &str) -> Option<PathBuf> {
        let stripped = url.strip_prefix("file://").unwrap_or(url);
        let path = PathBuf::from(stripped);
        path.is_dir().then_some(path)
    }

    fn tree_fingerprint(dir: &Path) -> String {
        let mut entries: Vec<PathBuf> = Vec::new();
        collect_files(dir, dir, &mut entries);
        entries.sort();

        let mut hasher = Sha256::new();
        for rel in &entries {
            hasher.update(rel.to_string_lossy().as_bytes());
            if let Ok(bytes) = fs::read(dir.join(rel)) {
                hasher.update(&bytes);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(read_dir) = fs::read_dir(dir) else { return };
    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.file_name().is_some_and(|n| n == ".git") {
            continue;
        }
        if path.is_dir() {
            collect_files(root, &path, out);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_path_buf());
        }
    }
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)?.flatten() {
        let path = entry.path();
        if path.file_name().is_some_and(|n| n == ".git") {
            continue;
        }
        let dest = dst.join(entry.file_name());
        if path.is_dir() {
            copy_tree(&path, &dest)?;
        } else {
            fs::copy(&path, &dest)?;
        }
    }
    Ok(())
}

impl GitClient for MockGit {
    fn init(&self, dir: &Path) -> Result<(), VendorError> {
        self.record(MockCall::Init(dir.to_path_buf()));
        fs::create_dir_all(dir).map_err(|e| VendorError::Io {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })?;
        self.state.lock().unwrap().entry(dir.to_path_buf()).or_default();
        Ok(())
    }

    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<(), VendorError> {
        self.record(MockCall::AddRemote(dir.to_path_buf(), name.to_string(), url.to_string()));
        self.state
            .lock()
            .unwrap()
            .entry(dir.to_path_buf())
            .or_default()
            .remotes
            .insert(name.to_string(), url.to_string());
        Ok(())
    }

    fn set_remote_url(&self, dir: &Path, name: &str, url: &str) -> Result<(), VendorError> {
        self.record(MockCall::SetRemoteUrl(dir.to_path_buf(), name.to_string(), url.to_string()));
        self.state
            .lock()
            .unwrap()
            .entry(dir.to_path_buf())
            .or_default()
            .remotes
            .insert(name.to_string(), url.to_string());
        Ok(())
    }

    fn fetch(&self, dir: &Path, remote: &str, refspec: &str, depth: Option<u32>) -> Result<(), VendorError> {
        self.record(MockCall::Fetch(
            dir.to_path_buf(),
            remote.to_string(),
            refspec.to_string(),
            depth,
        ));

        let url = {
            let state = self.state.lock().unwrap();
            state
                .get(dir)
                .and_then(|s| s.remotes.get(remote))
                .cloned()
                .ok_or_else(|| VendorError::GitCommandFailed {
                    command: "fetch".to_string(),
                    detail: format!("no remote named {remote}"),
                })?
        };

        if self.fail_urls.lock().unwrap().contains(&url) {
            return Err(VendorError::GitCommandFailed {
                command: "fetch".to_string(),
                detail: format!("unable to access '{url}': could not resolve host"),
            });
        }

        let Some(source) = Self::local_source(&url) else {
            return Err(VendorError::GitCommandFailed {
                command: "fetch".to_string(),
                detail: format!("not a recognized mock source: {url}"),
            });
        };

        let mut state = self.state.lock().unwrap();
        let entry = state.entry(dir.to_path_buf()).or_default();
        entry.fetched_from = Some(url);
        entry.head = Some(Self::tree_fingerprint(&source));
        Ok(())
    }

    fn checkout(&self, dir: &Path, target: &str) -> Result<(), VendorError> {
        self.record(MockCall::Checkout(dir.to_path_buf(), target.to_string()));

        if self.stale_commits.lock().unwrap().contains(target) {
            return Err(VendorError::GitCommandFailed {
                command: "checkout".to_string(),
                detail: format!("fatal: reference is not a tree: {target}"),
            });
        }

        let source_url = {
            let state = self.state.lock().unwrap();
            state.get(dir).and_then(|s| s.fetched_from.clone())
        };
        let Some(url) = source_url else {
            return Err(VendorError::GitCommandFailed {
                command: "checkout".to_string(),
                detail: "nothing fetched yet".to_string(),
            });
        };
        let source = Self::local_source(&url).ok_or_else(|| VendorError::GitCommandFailed {
            command: "checkout".to_string(),
            detail: format!("lost source for {url}"),
        })?;

        copy_tree(&source, dir).map_err(|e| VendorError::Io {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })?;

        let mut state = self.state.lock().unwrap();
        let entry = state.entry(dir.to_path_buf()).or_default();
        entry.head = Some(Self::tree_fingerprint(&source));
        Ok(())
    }

    fn head_hash(&self, dir: &Path) -> Result<String, VendorError> {
        self.state
            .lock()
            .unwrap()
            .get(dir)
            .and_then(|s| s.head.clone())
            .ok_or_else(|| VendorError::GitCommandFailed {
                command: "rev-parse HEAD".to_string(),
                detail: "no commit checked out".to_string(),
            })
    }

    fn tag_for_commit(&self, _dir: &Path, commit: &str) -> Result<Option<String>, VendorError> {
        Ok(self.tags.lock().unwrap().get(commit).cloned())
    }

    fn list_tree(&self, dir: &Path, _ref: &str) -> Result<Vec<String>, VendorError> {
        let mut entries = Vec::new();
        collect_files(dir, dir, &mut entries);
        entries.sort();
        Ok(entries.into_iter().map(|p| p.to_string_lossy().into_owned()).collect())
    }

    fn add(&self, _dir: &Path, _paths: &[PathBuf]) -> Result<(), VendorError> {
        Ok(())
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<String, VendorError> {
        self.record(MockCall::Commit(dir.to_path_buf(), message.to_string()));
        let n = self.commit_counter.fetch_add(1, Ordering::SeqCst);
        let hash = format!("{:040x}", n + 1);
        self.state.lock().unwrap().entry(dir.to_path_buf()).or_default().head = Some(hash.clone());
        Ok(hash)
    }

    fn add_note(&self, _dir: &Path, _commit: &str, _note_ref: &str, _content: &str) -> Result<(), VendorError> {
        Ok(())
    }

    fn create_branch(&self, dir: &Path, name: &str) -> Result<(), VendorError> {
        self.record(MockCall::CreateBranch(dir.to_path_buf(), name.to_string()));
        Ok(())
    }

    fn push(&self, dir: &Path, remote: &str, refspec: &str) -> Result<(), VendorError> {
        self.record(MockCall::Push(dir.to_path_buf(), remote.to_string(), refspec.to_string()));
        Ok(())
    }
}
