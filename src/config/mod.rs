//! Vendor configuration: the YAML file a consumer project checks in to
//! declare what it vendors and from where (spec.md §3, §6).

mod commands;
mod store;

pub use commands::{Command, CommandConfig};
pub use store::{ConfigStore, load_config, save_config};

use std::collections::{BTreeSet, HashSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::VendorError;
use crate::path::{Position, parse_path_spec, validate_dest_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VendorSource {
    External,
    Internal,
}

impl Default for VendorSource {
    fn default() -> Self {
        VendorSource::External
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceMode {
    SourceCanonical,
    Bidirectional,
}

impl Default for ComplianceMode {
    fn default() -> Self {
        ComplianceMode::SourceCanonical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    Strict,
    Lenient,
    Info,
}

impl Default for Enforcement {
    fn default() -> Self {
        Enforcement::Lenient
    }
}

/// A (source, destination) pair, each optionally carrying a position spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PathMapping {
    pub from: String,
    #[serde(default)]
    pub to: String,
}

impl PathMapping {
    /// Parse `from`/`to` into (bare path, position) pairs.
    pub fn parse_from(&self) -> Result<(String, Option<Position>), VendorError> {
        parse_path_spec(&self.from)
    }

    pub fn parse_to(&self) -> Result<(String, Option<Position>), VendorError> {
        parse_path_spec(&self.to)
    }

    /// Resolve the destination bare path, auto-naming from `from`'s
    /// basename under `default_target` when `to` is empty or `.`
    /// (spec.md §3 PathMapping, §4.4 step 2).
    pub fn resolve_destination(&self, default_target: Option<&str>) -> Result<String, VendorError> {
        let (to_bare, to_pos) = self.parse_to()?;
        let resolved = if to_bare.is_empty() || to_bare == "." {
            let (from_bare, _) = self.parse_from()?;
            let basename = from_bare.rsplit('/').next().unwrap_or(&from_bare);
            match default_target {
                Some(prefix) if !prefix.is_empty() => format!("{prefix}/{basename}"),
                _ => basename.to_string(),
            }
        } else {
            to_bare
        };

        validate_dest_path(&resolved)?;

        // Re-attach the position suffix so downstream copy code can parse it
        // back out uniformly via `parse_to`-style calls on the resolved path.
        if let Some(pos) = to_pos {
            Ok(format!("{resolved}:{pos}"))
        } else {
            Ok(resolved)
        }
    }

    /// Whether this mapping used auto-naming (empty/`.` `to`), which
    /// forces the sync cache fast-path to fail conservatively (spec.md
    /// §4.5 cache fast-path).
    pub fn is_auto_named(&self) -> bool {
        self.to.is_empty() || self.to == "."
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BranchSpec {
    pub r#ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,
    pub mapping: Vec<PathMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HookCommands {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_sync: Option<CommandConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_sync: Option<CommandConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VendorPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement: Option<Enforcement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Vendor {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default)]
    pub source: VendorSource,
    #[serde(default)]
    pub compliance: ComplianceMode,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub groups: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "HookCommands::is_empty_hooks")]
    pub hooks: HookCommands,
    #[serde(default)]
    pub enforcement: Enforcement,
    #[serde(default, skip_serializing_if = "VendorPolicy::is_default")]
    pub policy: VendorPolicy,
    pub specs: Vec<BranchSpec>,
}

impl HookCommands {
    fn is_empty_hooks(&self) -> bool {
        self.pre_sync.is_none() && self.post_sync.is_none()
    }
}

impl VendorPolicy {
    fn is_default(&self) -> bool {
        self.enforcement.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GlobalEnforcementMode {
    Default,
    Override,
}

impl Default for GlobalEnforcementMode {
    fn default() -> Self {
        GlobalEnforcementMode::Default
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompliancePolicy {
    #[serde(default)]
    pub mode: GlobalEnforcementMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement: Option<Enforcement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParallelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
}

/// Top-level vendor configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VendorConfig {
    #[serde(default)]
    pub vendors: Vec<Vendor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<VendorPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<CompliancePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<ParallelConfig>,
}

impl VendorConfig {
    /// Validate structural invariants (spec.md §3, §7 ConfigInvalid):
    /// unique vendor names, non-empty specs/mappings, mappings resolve to
    /// safe destinations.
    pub fn validate(&self) -> Result<(), VendorError> {
        let mut seen = HashSet::new();
        for vendor in &self.vendors {
            if vendor.name.is_empty() {
                return Err(VendorError::ConfigInvalid(
                    "vendor name must not be empty".to_string(),
                ));
            }
            if !seen.insert(vendor.name.clone()) {
                return Err(VendorError::ConfigInvalid(format!(
                    "duplicate vendor name: {}",
                    vendor.name
                )));
            }
            if vendor.specs.is_empty() {
                return Err(VendorError::ConfigInvalid(format!(
                    "vendor {} has no specs",
                    vendor.name
                )));
            }
            if vendor.source == VendorSource::Internal && !is_local_looking(&vendor.url) {
                return Err(VendorError::ConfigInvalid(format!(
                    "vendor {} is internal but its url {} doesn't look like a path inside this repository",
                    vendor.name, vendor.url
                )));
            }
            for spec in &vendor.specs {
                if spec.mapping.is_empty() {
                    return Err(VendorError::ConfigInvalid(format!(
                        "vendor {} ref {} has no mappings",
                        vendor.name, spec.r#ref
                    )));
                }
                for mapping in &spec.mapping {
                    mapping.resolve_destination(spec.default_target.as_deref())?;
                }
            }
        }
        conflict_check(&self.vendors)?;
        Ok(())
    }

    pub fn vendor(&self, name: &str) -> Option<&Vendor> {
        self.vendors.iter().find(|v| v.name == name)
    }

    pub fn vendors_in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Vendor> {
        self.vendors.iter().filter(move |v| v.groups.contains(group))
    }
}

fn is_local_looking(url: &str) -> bool {
    crate::url::is_local_path(url)
}

/// Conflict detection run before any parallel sync (spec.md §5):
/// two mappings cannot target the same destination, and one destination
/// cannot be a lexical ancestor of another owned by a different vendor.
fn conflict_check(vendors: &[Vendor]) -> Result<(), VendorError> {
    let mut destinations: Vec<(String, String)> = Vec::new(); // (vendor, dest)

    for vendor in vendors {
        for spec in &vendor.specs {
            for mapping in &spec.mapping {
                let dest = mapping.resolve_destination(spec.default_target.as_deref())?;
                let (bare, _) = parse_path_spec(&dest)?;
                destinations.push((vendor.name.clone(), bare));
            }
        }
    }

    for i in 0..destinations.len() {
        for j in (i + 1)..destinations.len() {
            let (v1, d1) = &destinations[i];
            let (v2, d2) = &destinations[j];
            if d1 == d2 {
                return Err(VendorError::ConfigInvalid(format!(
                    "mapping conflict: {v1} and {v2} both target {d1}"
                )));
            }
            if v1 != v2 && (is_ancestor(d1, d2) || is_ancestor(d2, d1)) {
                return Err(VendorError::ConfigInvalid(format!(
                    "mapping conflict: {v1}'s {d1} overlaps {v2}'s {d2}"
                )));
            }
        }
    }

    Ok(())
}

fn is_ancestor(maybe_ancestor: &str, path: &str) -> bool {
    path.starts_with(maybe_ancestor) && path[maybe_ancestor.len()..].starts_with('/')
}
