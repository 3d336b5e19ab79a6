//! Lockfile: per-(vendor, ref) provenance and content-hash records.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::VendorSource;
use crate::error::VendorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PositionLock {
    pub from: String,
    pub to: String,
    pub source_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LockEntry {
    pub name: String,
    pub r#ref: String,
    pub commit_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_path: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_version_tag: Option<String>,
    #[serde(default)]
    pub source: VendorSource,
    #[serde(default)]
    pub file_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub positions: Vec<PositionLock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_hashes: Option<BTreeMap<String, String>>,
}

impl LockEntry {
    /// Validate the full-commit-hash invariant (spec.md §3, §8): truncation
    /// is forbidden, so this only checks length and hex-ness, never shortens.
    pub fn has_full_commit_hash(&self) -> bool {
        self.commit_hash.len() == 40 && self.commit_hash.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LockFile {
    #[serde(default)]
    pub vendors: Vec<LockEntry>,
}

impl LockFile {
    pub fn entry(&self, name: &str, r#ref: &str) -> Option<&LockEntry> {
        self.vendors
            .iter()
            .find(|e| e.name == name && e.r#ref == r#ref)
    }

    pub fn entry_mut(&mut self, name: &str, r#ref: &str) -> Option<&mut LockEntry> {
        self.vendors
            .iter_mut()
            .find(|e| e.name == name && e.r#ref == r#ref)
    }

    /// Insert or replace the entry for `(name, ref)`, preserving the
    /// position of an existing entry rather than moving it to the end.
    pub fn upsert(&mut self, entry: LockEntry) {
        if let Some(existing) = self.entry_mut(&entry.name, &entry.r#ref) {
            *existing = entry;
        } else {
            self.vendors.push(entry);
        }
    }

    pub fn remove_vendor(&mut self, name: &str) {
        self.vendors.retain(|e| e.name != name);
    }

    /// Union of every destination path (across all entries) currently
    /// recorded in the lockfile, used by coherence detection (spec.md §4.6).
    pub fn all_dest_paths(&self) -> std::collections::BTreeSet<String> {
        self.vendors
            .iter()
            .flat_map(|e| e.file_hashes.keys().cloned())
            .collect()
    }
}

pub struct LockStore {
    path: PathBuf,
}

impl LockStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<LockFile, VendorError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_yaml::from_str(&raw).map_err(|e| {
                VendorError::ConfigInvalid(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LockFile::default()),
            Err(e) => Err(VendorError::Io {
                path: self.path.clone(),
                detail: e.to_string(),
            }),
        }
    }

    /// Atomic replace: written exactly once per sync run, after all
    /// vendors finish (spec.md §5 "Shared resources").
    pub fn save(&self, lock: &LockFile) -> Result<(), VendorError> {
        let yaml = serde_yaml::to_string(lock).map_err(|e| {
            VendorError::ConfigInvalid(format!("failed to serialize lockfile: {e}"))
        })?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| VendorError::Io {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| VendorError::Io {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })?;
        tmp.write_all(yaml.as_bytes()).map_err(|e| VendorError::Io {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;
        tmp.persist(&self.path).map_err(|e| VendorError::Io {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
