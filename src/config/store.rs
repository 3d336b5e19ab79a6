//! Atomic load/save of the vendor configuration file.
//!
//! Loads are schema-tolerant: unknown top-level keys are logged as
//! warnings rather than rejected, so a consumer project can carry
//! forward-looking config fields without breaking older binaries.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::error::VendorError;

use super::VendorConfig;

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &["vendors", "policy", "compliance", "parallel"];

/// Load a [`VendorConfig`] from `path`, warning on unrecognized top-level
/// keys instead of failing.
pub fn load_config(path: &Path) -> Result<VendorConfig, VendorError> {
    let raw = fs::read_to_string(path).map_err(|e| VendorError::Io {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    warn_on_unknown_keys(&raw, path);

    let config: VendorConfig = serde_yaml::from_str(&raw).map_err(|e| {
        VendorError::ConfigInvalid(format!("{}: {e}", path.display()))
    })?;

    config.validate()?;
    Ok(config)
}

fn warn_on_unknown_keys(raw: &str, path: &Path) {
    let Ok(Value::Mapping(map)) = serde_yaml::from_str::<Value>(raw) else {
        return;
    };
    for key in map.keys() {
        let Some(key) = key.as_str() else { continue };
        if !KNOWN_TOP_LEVEL_KEYS.contains(&key) {
            log::warn!("{}: unrecognized top-level key `{key}`, ignoring", path.display());
        }
    }
}

/// Write `config` to `path` atomically: serialize to a sibling temp file,
/// then rename over the destination so a crash mid-write never leaves a
/// truncated config behind.
pub fn save_config(path: &Path, config: &VendorConfig) -> Result<(), VendorError> {
    let yaml = serde_yaml::to_string(config).map_err(|e| {
        VendorError::ConfigInvalid(format!("failed to serialize config: {e}"))
    })?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| VendorError::Io {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| VendorError::Io {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;
    tmp.write_all(yaml.as_bytes()).map_err(|e| VendorError::Io {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    tmp.persist(path).map_err(|e| VendorError::Io {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    Ok(())
}

/// Thin handle bundling a config's on-disk location with its parsed form,
/// so callers needing both (e.g. to resolve local vendor URLs against the
/// project root) don't have to re-derive the directory.
pub struct ConfigStore {
    path: PathBuf,
    pub config: VendorConfig,
}

impl ConfigStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, VendorError> {
        let path = path.into();
        let config = load_config(&path)?;
        Ok(Self { path, config })
    }

    pub fn save(&self) -> Result<(), VendorError> {
        save_config(&self.path, &self.config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the config file, used as the base for
    /// resolving relative local vendor URLs and destination mappings.
    pub fn project_root(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}
