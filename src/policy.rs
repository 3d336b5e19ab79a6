//! Enforcement: maps observed drift classification + per-vendor
//! enforcement mode to a process exit code (spec.md §6 "Exit codes").

use crate::config::{Enforcement, GlobalEnforcementMode, Vendor, VendorConfig};
use crate::verify::{FileStatus, Status, VerifyResult};

/// Resolve the effective enforcement for `vendor` given the config's
/// global policy. `override` forces the global default onto every vendor
/// regardless of its own setting.
pub fn resolve_enforcement(config: &VendorConfig, vendor: &Vendor) -> Enforcement {
    let global = config.policy.as_ref().and_then(|p| p.enforcement);
    let compliance_override = config.compliance.as_ref();

    if let Some(compliance) = compliance_override {
        if compliance.mode == GlobalEnforcementMode::Override {
            if let Some(mode) = compliance.enforcement {
                return mode;
            }
        }
    }

    vendor
        .policy
        .enforcement
        .or(Some(vendor.enforcement))
        .or(global)
        .unwrap_or_default()
}

/// Drift that counts toward enforcement: modifications and deletions,
/// never additions alone (spec.md §6).
fn has_actionable_drift(statuses: &[FileStatus]) -> bool {
    statuses
        .iter()
        .any(|f| matches!(f.status, Status::Modified | Status::Deleted))
}

/// Map a [`VerifyResult`] to the 0/1/2 exit code table in spec.md §6.
pub fn exit_code(config: &VendorConfig, result: &VerifyResult) -> i32 {
    let mut any_strict = false;
    let mut any_lenient = false;

    for vendor_name in distinct_vendors(result) {
        let Some(vendor) = config.vendor(&vendor_name) else { continue };
        let vendor_statuses: Vec<&FileStatus> = result
            .files
            .iter()
            .filter(|f| f.vendor.as_deref() == Some(vendor_name.as_str()))
            .collect();
        let owned: Vec<FileStatus> = vendor_statuses.into_iter().cloned().collect();

        if !has_actionable_drift(&owned) {
            continue;
        }

        match resolve_enforcement(config, vendor) {
            Enforcement::Strict => any_strict = true,
            Enforcement::Lenient => any_lenient = true,
            Enforcement::Info => {}
        }
    }

    if any_strict {
        1
    } else if any_lenient {
        2
    } else {
        0
    }
}

fn distinct_vendors(result: &VerifyResult) -> Vec<String> {
    let mut names: Vec<String> = result.files.iter().filter_map(|f| f.vendor.clone()).collect();
    names.sort();
    names.dedup();
    names
}
