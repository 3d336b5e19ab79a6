//! Incremental Sync Cache: per-(vendor, ref) JSON checksum snapshots that
//! let the Sync Service skip git network operations entirely (spec.md §4.7).

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::VendorError;

const MAX_CACHE_FILES: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub path: String,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub vendor_name: String,
    pub r#ref: String,
    pub commit_hash: String,
    pub cached_at: DateTime<Utc>,
    pub files: Vec<CachedFile>,
}

impl CacheEntry {
    fn empty() -> Self {
        Self {
            vendor_name: String::new(),
            r#ref: String::new(),
            commit_hash: String::new(),
            cached_at: DateTime::UNIX_EPOCH,
            files: Vec::new(),
        }
    }

    pub fn hash_for(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.hash.as_str())
    }
}

/// Raw hex SHA-256 of a file's bytes, no `sha256:` prefix (spec.md §4.7 —
/// callers comparing against lock-format hashes strip the prefix there).
pub fn compute_file_checksum(path: &Path) -> Result<String, VendorError> {
    let bytes = fs::read(path).map_err(|e| VendorError::Io {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Build a [`CacheEntry`] from a set of destination paths, deduplicating
/// and then truncating to the 1 000-entry cap.
pub fn build_cache(
    vendor_name: &str,
    r#ref: &str,
    commit_hash: &str,
    now: DateTime<Utc>,
    paths: &[(String, PathBuf)],
) -> CacheEntry {
    let mut seen = std::collections::HashSet::new();
    let mut files = Vec::new();

    for (dest_path, abs_path) in paths {
        if !seen.insert(dest_path.clone()) {
            continue;
        }
        let Ok(hash) = compute_file_checksum(abs_path) else {
            continue;
        };
        files.push(CachedFile {
            path: dest_path.clone(),
            hash,
        });
        if files.len() >= MAX_CACHE_FILES {
            break;
        }
    }

    CacheEntry {
        vendor_name: vendor_name.to_string(),
        r#ref: r#ref.to_string(),
        commit_hash: commit_hash.to_string(),
        cached_at: now,
        files,
    }
}

pub struct CacheStore {
    cache_dir: PathBuf,
}

impl CacheStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    fn entry_path(&self, vendor_name: &str, r#ref: &str) -> PathBuf {
        let sanitized = r#ref.replace('/', "_");
        self.cache_dir.join(vendor_name).join(format!("{sanitized}.json"))
    }

    /// A missing or corrupt cache file is not an error: it loads as an
    /// empty entry with `commit_hash == ""`, which never matches a real
    /// locked commit and so is always treated as a cache miss (spec.md
    /// §4.7, §9 "Cache poisoning defense").
    pub fn load(&self, vendor_name: &str, r#ref: &str) -> CacheEntry {
        let path = self.entry_path(vendor_name, r#ref);
        match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("cache file {} is corrupt, treating as miss: {e}", path.display());
                CacheEntry::empty()
            }),
            Err(_) => CacheEntry::empty(),
        }
    }

    pub fn save(&self, entry: &CacheEntry) -> Result<(), VendorError> {
        let path = self.entry_path(&entry.vendor_name, &entry.r#ref);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| VendorError::Io {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })?;

        let json = serde_json::to_string_pretty(entry).map_err(|e| {
            VendorError::ConfigInvalid(format!("failed to serialize cache entry: {e}"))
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| VendorError::Io {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })?;
        tmp.write_all(json.as_bytes()).map_err(|e| VendorError::Io {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        tmp.persist(&path).map_err(|e| VendorError::Io {
            path,
            detail: e.to_string(),
        })?;

        Ok(())
    }

    pub fn delete(&self, vendor_name: &str, r#ref: &str) {
        let path = self.entry_path(vendor_name, r#ref);
        let _ = fs::remove_file(path);
    }
}
