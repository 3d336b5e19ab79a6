//! Byte-range extraction and placement, the primitive underneath the File
//! Copy Service and the Verify Service's range hashing.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::VendorError;
use crate::path::{Position, PositionUnit};

const BINARY_SNIFF_WINDOW: usize = 8_000;

/// Result of [`extract`]: the extracted (and, for whole-file reads,
/// normalized) bytes plus their prefixed SHA-256 hash.
pub struct Extracted {
    pub bytes: Vec<u8>,
    pub source_hash: String,
    pub looks_binary: bool,
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

/// Read `path`, normalize CRLF to LF, and return either the whole content
/// or the slice named by `position` (spec.md §4.3).
pub fn extract(path: &Path, position: Option<Position>) -> Result<Extracted, VendorError> {
    let raw = fs::read(path).map_err(|e| VendorError::Io {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let looks_binary = raw[..raw.len().min(BINARY_SNIFF_WINDOW)].contains(&0u8);
    let normalized = normalize_newlines(&raw);

    let bytes = match position {
        None => normalized,
        Some(pos) => match pos.unit {
            PositionUnit::Line => extract_lines(&normalized, pos, path)?,
            PositionUnit::Column => extract_columns(&normalized, pos)?,
        },
    };

    let source_hash = hash_bytes(&bytes);
    Ok(Extracted {
        bytes,
        source_hash,
        looks_binary,
    })
}

fn normalize_newlines(raw: &[u8]) -> Vec<u8> {
    if !raw.contains(&b'\r') {
        return raw.to_vec();
    }
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\r' && i + 1 < raw.len() && raw[i + 1] == b'\n' {
            out.push(b'\n');
            i += 2;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    out
}

fn extract_lines(content: &[u8], pos: Position, path: &Path) -> Result<Vec<u8>, VendorError> {
    let text = String::from_utf8_lossy(content);
    let lines: Vec<&str> = text.split('\n').collect();
    // Trailing empty element from a final newline doesn't count as a line.
    let line_count = if lines.last().is_some_and(|l| l.is_empty()) {
        lines.len() - 1
    } else {
        lines.len()
    };

    let start = pos.start as usize;
    if start > line_count {
        return Err(VendorError::PositionOutOfRange {
            path: path.display().to_string(),
            detail: format!("start line {start} exceeds {line_count} lines"),
        });
    }
    let end = (pos.end as usize).min(line_count);

    let selected = &lines[start - 1..end];
    Ok(selected.join("\n").into_bytes())
}

fn extract_columns(content: &[u8], pos: Position) -> Result<Vec<u8>, VendorError> {
    let start = (pos.start as usize).saturating_sub(1);
    let end = (pos.end as usize).min(content.len());
    if start > content.len() || start > end {
        return Err(VendorError::PositionOutOfRange {
            path: String::new(),
            detail: format!("column range {start}..{end} exceeds {} bytes", content.len()),
        });
    }
    Ok(content[start..end].to_vec())
}

/// Write `bytes` to `dest_path`, either wholesale or spliced into an
/// existing line range (spec.md §4.3). Parent directories are created
/// with mode `0755`.
pub fn place(dest_path: &Path, bytes: &[u8], position: Option<Position>) -> Result<(), VendorError> {
    if let Some(parent) = dest_path.parent() {
        create_dir_all_0755(parent)?;
    }

    let output = match position {
        None => ensure_trailing_newline(bytes),
        Some(pos) => splice_lines(dest_path, bytes, pos)?,
    };

    fs::write(dest_path, output).map_err(|e| VendorError::Io {
        path: dest_path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn splice_lines(dest_path: &Path, bytes: &[u8], pos: Position) -> Result<Vec<u8>, VendorError> {
    let existing = match fs::read(dest_path) {
        Ok(raw) => normalize_newlines(&raw),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            return Err(VendorError::Io {
                path: dest_path.to_path_buf(),
                detail: e.to_string(),
            });
        }
    };

    let text = String::from_utf8_lossy(&existing);
    let mut lines: Vec<String> = if existing.is_empty() {
        Vec::new()
    } else {
        text.split('\n')
            .collect::<Vec<_>>()
            .into_iter()
            .map(String::from)
            .collect()
    };
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    let start = pos.start as usize;
    let end = pos.end as usize;
    if start > lines.len() + 1 {
        return Err(VendorError::PositionOutOfRange {
            path: dest_path.display().to_string(),
            detail: format!("start line {start} exceeds {} existing lines + 1", lines.len()),
        });
    }

    let replacement: Vec<String> = String::from_utf8_lossy(bytes)
        .split('\n')
        .map(String::from)
        .collect();

    let end = end.min(lines.len().max(start));
    let removable_end = end.min(lines.len());
    let tail: Vec<String> = if start - 1 < lines.len() {
        lines.split_off(removable_end.max(start - 1))
    } else {
        Vec::new()
    };
    lines.truncate(start - 1);
    lines.extend(replacement);
    lines.extend(tail);

    let mut joined = lines.join("\n").into_bytes();
    joined.push(b'\n');
    Ok(joined)
}

fn ensure_trailing_newline(bytes: &[u8]) -> Vec<u8> {
    if bytes.last() == Some(&b'\n') {
        bytes.to_vec()
    } else {
        let mut out = bytes.to_vec();
        out.push(b'\n');
        out
    }
}

#[cfg(unix)]
fn create_dir_all_0755(dir: &Path) -> Result<(), VendorError> {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir).map_err(|e| VendorError::Io {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;
    let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o755));
    Ok(())
}

#[cfg(not(unix))]
fn create_dir_all_0755(dir: &Path) -> Result<(), VendorError> {
    fs::create_dir_all(dir).map_err(|e| VendorError::Io {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })
}
