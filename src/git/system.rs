//! Subprocess-backed [`GitClient`], modeled on shelling out to a real
//! `git` binary: stdout/stderr captured, non-zero exit mapped to a
//! structured `GitCommandFailed`.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::VendorError;

use super::GitClient;

pub struct SystemGit {
    binary: String,
}

impl Default for SystemGit {
    fn default() -> Self {
        Self {
            binary: "git".to_string(),
        }
    }
}

impl SystemGit {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<Output, VendorError> {
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|e| VendorError::GitCommandFailed {
                command: format!("git {}", args.join(" ")),
                detail: e.to_string(),
            })?;
        Ok(output)
    }

    fn run_ok(&self, dir: &Path, args: &[&str]) -> Result<String, VendorError> {
        let output = self.run(dir, args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(VendorError::GitCommandFailed {
                command: format!("git {}", args.join(" ")),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl GitClient for SystemGit {
    fn init(&self, dir: &Path) -> Result<(), VendorError> {
        std::fs::create_dir_all(dir).map_err(|e| VendorError::Io {
            path: dir.to_path_buf(),
            detail: e.to_string(),
        })?;
        self.run_ok(dir, &["init", "--quiet"]).map(|_| ())
    }

    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<(), VendorError> {
        self.run_ok(dir, &["remote", "add", name, url]).map(|_| ())
    }

    fn set_remote_url(&self, dir: &Path, name: &str, url: &str) -> Result<(), VendorError> {
        self.run_ok(dir, &["remote", "set-url", name, url]).map(|_| ())
    }

    fn fetch(&self, dir: &Path, remote: &str, refspec: &str, depth: Option<u32>) -> Result<(), VendorError> {
        let depth_str;
        let mut args = vec!["fetch", "--quiet", remote, refspec];
        if let Some(d) = depth {
            if d > 0 {
                depth_str = d.to_string();
                args.push("--depth");
                args.push(&depth_str);
            }
        }
        self.run_ok(dir, &args).map(|_| ())
    }

    fn checkout(&self, dir: &Path, target: &str) -> Result<(), VendorError> {
        self.run_ok(dir, &["checkout", "--quiet", "--force", target]).map(|_| ())
    }

    fn head_hash(&self, dir: &Path) -> Result<String, VendorError> {
        self.run_ok(dir, &["rev-parse", "HEAD"])
    }

    fn tag_for_commit(&self, dir: &Path, commit: &str) -> Result<Option<String>, VendorError> {
        match self.run_ok(dir, &["describe", "--tags", "--exact-match", commit]) {
            Ok(tag) if !tag.is_empty() => Ok(Some(tag)),
            Ok(_) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    fn list_tree(&self, dir: &Path, r#ref: &str) -> Result<Vec<String>, VendorError> {
        let out = self.run_ok(dir, &["ls-tree", "-r", "--name-only", r#ref])?;
        Ok(out.lines().map(String::from).collect())
    }

    fn add(&self, dir: &Path, paths: &[PathBuf]) -> Result<(), VendorError> {
        let mut args = vec!["add".to_string()];
        for p in paths {
            args.push(p.to_string_lossy().into_owned());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_ok(dir, &arg_refs).map(|_| ())
    }

    fn commit(&self, dir: &Path, message: &str) -> Result<String, VendorError> {
        self.run_ok(dir, &["commit", "--quiet", "-m", message])?;
        self.head_hash(dir)
    }

    fn add_note(&self, dir: &Path, commit: &str, note_ref: &str, content: &str) -> Result<(), VendorError> {
        self.run_ok(
            dir,
            &["notes", "--ref", note_ref, "add", "-f", "-m", content, commit],
        )
        .map(|_| ())
    }

    fn create_branch(&self, dir: &Path, name: &str) -> Result<(), VendorError> {
        self.run_ok(dir, &["checkout", "--quiet", "-b", name]).map(|_| ())
    }

    fn push(&self, dir: &Path, remote: &str, refspec: &str) -> Result<(), VendorError> {
        self.run_ok(dir, &["push", "--quiet", remote, refspec]).map(|_| ())
    }
}
