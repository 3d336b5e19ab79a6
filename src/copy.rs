//! File Copy Service: drives a single `PathMapping` through extract/place,
//! and `CopyMappings` drives a `BranchSpec`'s whole mapping list in order
//! (spec.md §4.4).

use std::fs;
use std::ops::{Add, AddAssign};
use std::path::Path;

use ignore::WalkBuilder;

use crate::config::{BranchSpec, PathMapping, Vendor};
use crate::content::{extract, hash_bytes, place};
use crate::error::VendorError;
use crate::path::{parse_path_spec, validate_dest_path, Position};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRecord {
    pub from: String,
    pub to: String,
    pub source_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub file_count: u64,
    pub byte_count: u64,
    pub positions: Vec<PositionRecord>,
    pub warnings: Vec<String>,
    pub removed: Vec<String>,
}

impl Add for CopyStats {
    type Output = CopyStats;

    fn add(mut self, rhs: CopyStats) -> CopyStats {
        self += rhs;
        self
    }
}

impl AddAssign for CopyStats {
    fn add_assign(&mut self, rhs: CopyStats) {
        self.file_count += rhs.file_count;
        self.byte_count += rhs.byte_count;
        self.positions.extend(rhs.positions);
        self.warnings.extend(rhs.warnings);
        self.removed.extend(rhs.removed);
    }
}

/// Strip a `blob/<ref>/` or `tree/<ref>/` prefix some configs carry over
/// from pasting a web UI URL (spec.md §4.4 step 1).
fn strip_web_prefix(from: &str) -> &str {
    for marker in ["blob/", "tree/"] {
        if let Some(idx) = from.find(marker) {
            let after_marker = &from[idx + marker.len()..];
            if let Some(slash) = after_marker.find('/') {
                return &after_marker[slash + 1..];
            }
        }
    }
    from
}

/// Apply one `PathMapping` under `scratch_root` (the fetched upstream
/// tree), writing into the consumer tree rooted at `consumer_root`.
pub fn copy_mapping(
    scratch_root: &Path,
    consumer_root: &Path,
    vendor: &Vendor,
    spec: &BranchSpec,
    mapping: &PathMapping,
) -> Result<CopyStats, VendorError> {
    let raw_from = strip_web_prefix(&mapping.from);
    let (from_bare, from_pos) = parse_path_spec(raw_from)?;

    let dest_spec = mapping.resolve_destination(spec.default_target.as_deref())?;
    let (to_bare, to_pos) = parse_path_spec(&dest_spec)?;
    validate_dest_path(&to_bare)?;

    let source_abs = scratch_root.join(&from_bare);
    let dest_abs = consumer_root.join(&to_bare);

    if !source_abs.exists() {
        return Ok(missing_source(&to_bare, &dest_abs, vendor, &spec.r#ref, &from_bare));
    }

    if let Some(pos) = from_pos {
        return copy_position(&source_abs, &dest_abs, &from_bare, &to_bare, pos, to_pos);
    }

    if source_abs.is_dir() {
        copy_directory(&source_abs, &dest_abs)
    } else {
        copy_whole_file(&source_abs, &dest_abs)
    }
}

fn missing_source(
    to_bare: &str,
    dest_abs: &Path,
    vendor: &Vendor,
    r#ref: &str,
    from_bare: &str,
) -> CopyStats {
    let mut stats = CopyStats::default();
    if dest_abs.exists() {
        let removal = if dest_abs.is_dir() {
            fs::remove_dir_all(dest_abs)
        } else {
            fs::remove_file(dest_abs)
        };
        if let Err(e) = removal {
            if e.kind() != std::io::ErrorKind::NotFound {
                stats.warnings.push(format!(
                    "upstream file {from_bare} removed from {}@{ref} (local delete also failed: {e})",
                    vendor.name
                ));
                return stats;
            }
        }
    }
    stats
        .warnings
        .push(format!("upstream file {from_bare} removed from {}@{ref}", vendor.name));
    stats.removed.push(to_bare.to_string());
    stats
}

fn copy_position(
    source_abs: &Path,
    dest_abs: &Path,
    from_bare: &str,
    to_bare: &str,
    from_pos: Position,
    to_pos: Option<Position>,
) -> Result<CopyStats, VendorError> {
    let extracted = extract(source_abs, Some(from_pos))?;
    let mut stats = CopyStats::default();

    if extracted.looks_binary {
        stats.warnings.push(format!("binary content detected in {from_bare}"));
    }

    if let Some(warning) = local_modification_warning(dest_abs, &extracted.bytes, to_pos) {
        stats.warnings.push(warning);
    }

    place(dest_abs, &extracted.bytes, to_pos)?;

    stats.file_count = 1;
    stats.byte_count = extracted.bytes.len() as u64;
    stats.positions.push(PositionRecord {
        from: from_bare.to_string(),
        to: to_bare.to_string(),
        source_hash: extracted.source_hash,
    });
    Ok(stats)
}

fn local_modification_warning(dest_abs: &Path, new_bytes: &[u8], to_pos: Option<Position>) -> Option<String> {
    let existing = extract(dest_abs, to_pos).ok()?;
    if existing.bytes != new_bytes {
        Some(format!(
            "local modification at {} will be overwritten",
            dest_abs.display()
        ))
    } else {
        None
    }
}

fn copy_whole_file(source_abs: &Path, dest_abs: &Path) -> Result<CopyStats, VendorError> {
    let extracted = extract(source_abs, None)?;
    let mut stats = CopyStats::default();

    if extracted.looks_binary {
        stats.warnings.push(format!("binary content detected in {}", source_abs.display()));
    }

    if let Some(warning) = local_modification_warning(dest_abs, &extracted.bytes, None) {
        stats.warnings.push(warning);
    }

    place(dest_abs, &extracted.bytes, None)?;
    stats.file_count = 1;
    stats.byte_count = extracted.bytes.len() as u64;
    Ok(stats)
}

fn copy_directory(source_abs: &Path, dest_abs: &Path) -> Result<CopyStats, VendorError> {
    fs::create_dir_all(dest_abs).map_err(|e| VendorError::Io {
        path: dest_abs.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut stats = CopyStats::default();
    let walker = WalkBuilder::new(source_abs)
        .hidden(false)
        .git_ignore(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    for entry in walker {
        let entry = entry.map_err(|e| VendorError::Io {
            path: source_abs.to_path_buf(),
            detail: e.to_string(),
        })?;
        if entry.file_type().is_some_and(|t| t.is_dir()) {
            continue;
        }
        let rel = entry.path().strip_prefix(source_abs).unwrap_or(entry.path());
        let dest_file = dest_abs.join(rel);

        let extracted = extract(entry.path(), None)?;
        if extracted.looks_binary {
            stats
                .warnings
                .push(format!("binary content detected in {}", entry.path().display()));
        }
        place(&dest_file, &extracted.bytes, None)?;
        stats.file_count += 1;
        stats.byte_count += extracted.bytes.len() as u64;
    }

    Ok(stats)
}

/// Apply every mapping in `spec` in order, field-wise summing stats.
pub fn copy_mappings(
    scratch_root: &Path,
    consumer_root: &Path,
    vendor: &Vendor,
    spec: &BranchSpec,
) -> Result<CopyStats, VendorError> {
    let mut total = CopyStats::default();
    for mapping in &spec.mapping {
        total += copy_mapping(scratch_root, consumer_root, vendor, spec, mapping)?;
    }
    Ok(total)
}

/// Destination paths (position-stripped) a `PathMapping` names, used by
/// the Verify Service to assemble `ConfigPaths`.
pub fn mapping_dest_path(spec: &BranchSpec, mapping: &PathMapping) -> Result<String, VendorError> {
    let dest_spec = mapping.resolve_destination(spec.default_target.as_deref())?;
    let (bare, _) = parse_path_spec(&dest_spec)?;
    Ok(bare)
}

pub fn hash_destination(path: &Path) -> Result<String, VendorError> {
    let extracted = extract(path, None)?;
    Ok(hash_bytes(&extracted.bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BranchSpec, HookCommands, PathMapping, Vendor, VendorPolicy, VendorSource};

    fn vendor() -> Vendor {
        Vendor {
            name: "acme".to_string(),
            url: "file:///dev/null".to_string(),
            mirrors: vec![],
            license: None,
            source: VendorSource::External,
            compliance: Default::default(),
            groups: Default::default(),
            hooks: HookCommands::default(),
            enforcement: Default::default(),
            policy: VendorPolicy::default(),
            specs: vec![],
        }
    }

    fn spec(default_target: Option<&str>, mapping: Vec<PathMapping>) -> BranchSpec {
        BranchSpec {
            r#ref: "main".to_string(),
            default_target: default_target.map(String::from),
            mapping,
        }
    }

    #[test]
    fn copies_whole_file() {
        let scratch = tempfile::tempdir().unwrap();
        let consumer = tempfile::tempdir().unwrap();
        fs::write(scratch.path().join("lib.go"), "package main\n").unwrap();

        let mapping = PathMapping {
            from: "lib.go".to_string(),
            to: "vendor/lib.go".to_string(),
        };
        let s = spec(None, vec![mapping.clone()]);
        let stats = copy_mapping(scratch.path(), consumer.path(), &vendor(), &s, &mapping).unwrap();

        assert_eq!(stats.file_count, 1);
        assert_eq!(
            fs::read_to_string(consumer.path().join("vendor/lib.go")).unwrap(),
            "package main\n"
        );
    }

    #[test]
    fn missing_source_removes_destination_and_warns() {
        let scratch = tempfile::tempdir().unwrap();
        let consumer = tempfile::tempdir().unwrap();
        fs::create_dir_all(consumer.path().join("vendor")).unwrap();
        fs::write(consumer.path().join("vendor/lib.go"), "stale").unwrap();

        let mapping = PathMapping {
            from: "lib.go".to_string(),
            to: "vendor/lib.go".to_string(),
        };
        let s = spec(None, vec![mapping.clone()]);
        let stats = copy_mapping(scratch.path(), consumer.path(), &vendor(), &s, &mapping).unwrap();

        assert!(!consumer.path().join("vendor/lib.go").exists());
        assert_eq!(stats.removed, vec!["vendor/lib.go".to_string()]);
        assert_eq!(stats.warnings.len(), 1);
    }

    #[test]
    fn missing_source_with_no_destination_warns_without_removal() {
        let scratch = tempfile::tempdir().unwrap();
        let consumer = tempfile::tempdir().unwrap();

        let mapping = PathMapping {
            from: "gone.go".to_string(),
            to: "vendor/gone.go".to_string(),
        };
        let s = spec(None, vec![mapping.clone()]);
        let stats = copy_mapping(scratch.path(), consumer.path(), &vendor(), &s, &mapping).unwrap();

        assert_eq!(stats.removed, vec!["vendor/gone.go".to_string()]);
    }

    #[test]
    fn strips_blob_ref_prefix() {
        assert_eq!(strip_web_prefix("blob/main/src/lib.go"), "src/lib.go");
        assert_eq!(strip_web_prefix("tree/v1.0/pkg/a.go"), "pkg/a.go");
        assert_eq!(strip_web_prefix("src/lib.go"), "src/lib.go");
    }

    #[test]
    fn copies_position_range_into_destination_range() {
        let scratch = tempfile::tempdir().unwrap();
        let consumer = tempfile::tempdir().unwrap();
        fs::write(scratch.path().join("src.go"), "one\ntwo\nA\nB\nC\nsix\n").unwrap();
        let preexisting: String = (1..=15).map(|n| format!("// line {n}\n")).collect();
        fs::create_dir_all(consumer.path().join("dest")).unwrap();
        fs::write(consumer.path().join("dest/config.ts"), preexisting).unwrap();

        let mapping = PathMapping {
            from: "src.go:L3-L5".to_string(),
            to: "dest/config.ts:L10-L12".to_string(),
        };
        let s = spec(None, vec![mapping.clone()]);
        let stats = copy_mapping(scratch.path(), consumer.path(), &vendor(), &s, &mapping).unwrap();

        assert_eq!(stats.positions.len(), 1);
        let content = fs::read_to_string(consumer.path().join("dest/config.ts")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[9], "A");
        assert_eq!(lines[10], "B");
        assert_eq!(lines[11], "C");
        assert_eq!(lines[12], "// line 13");
    }

    #[test]
    fn copies_directory_recursively_skipping_git() {
        let scratch = tempfile::tempdir().unwrap();
        let consumer = tempfile::tempdir().unwrap();
        fs::create_dir_all(scratch.path().join("pkg/.git")).unwrap();
        fs::write(scratch.path().join("pkg/.git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(scratch.path().join("pkg/a.go"), "package pkg\n").unwrap();

        let mapping = PathMapping {
            from: "pkg".to_string(),
            to: "vendor/pkg".to_string(),
        };
        let s = spec(None, vec![mapping.clone()]);
        let stats = copy_mapping(scratch.path(), consumer.path(), &vendor(), &s, &mapping).unwrap();

        assert_eq!(stats.file_count, 1);
        assert!(!consumer.path().join("vendor/pkg/.git").exists());
        assert!(consumer.path().join("vendor/pkg/a.go").exists());
    }

    #[test]
    fn copy_stats_add_assign_sums_fields() {
        let mut total = CopyStats::default();
        total += CopyStats {
            file_count: 1,
            byte_count: 10,
            positions: vec![],
            warnings: vec!["w1".to_string()],
            removed: vec![],
        };
        total += CopyStats {
            file_count: 2,
            byte_count: 20,
            positions: vec![],
            warnings: vec!["w2".to_string()],
            removed: vec!["r1".to_string()],
        };
        assert_eq!(total.file_count, 3);
        assert_eq!(total.byte_count, 30);
        assert_eq!(total.warnings, vec!["w1".to_string(), "w2".to_string()]);
        assert_eq!(total.removed, vec!["r1".to_string()]);
    }
}
