//! Git client abstraction (spec.md §9 "Polymorphism points"): a narrow
//! capability trait with two implementers, a real subprocess-backed one
//! and a scripted in-memory fake for tests.

mod mock;
mod system;

pub use mock::{MockCall, MockGit};
pub use system::SystemGit;

use std::path::{Path, PathBuf};

use crate::error::VendorError;

pub trait GitClient: Send + Sync {
    fn init(&self, dir: &Path) -> Result<(), VendorError>;
    fn add_remote(&self, dir: &Path, name: &str, url: &str) -> Result<(), VendorError>;
    fn set_remote_url(&self, dir: &Path, name: &str, url: &str) -> Result<(), VendorError>;
    fn fetch(&self, dir: &Path, remote: &str, refspec: &str, depth: Option<u32>) -> Result<(), VendorError>;
    fn checkout(&self, dir: &Path, target: &str) -> Result<(), VendorError>;
    fn head_hash(&self, dir: &Path) -> Result<String, VendorError>;
    fn tag_for_commit(&self, dir: &Path, commit: &str) -> Result<Option<String>, VendorError>;
    fn list_tree(&self, dir: &Path, r#ref: &str) -> Result<Vec<String>, VendorError>;
    fn add(&self, dir: &Path, paths: &[PathBuf]) -> Result<(), VendorError>;
    fn commit(&self, dir: &Path, message: &str) -> Result<String, VendorError>;
    fn add_note(&self, dir: &Path, commit: &str, note_ref: &str, content: &str) -> Result<(), VendorError>;
    fn create_branch(&self, dir: &Path, name: &str) -> Result<(), VendorError>;
    fn push(&self, dir: &Path, remote: &str, refspec: &str) -> Result<(), VendorError>;
}
