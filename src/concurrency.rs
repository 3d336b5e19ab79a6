//! Concurrency Layer: a bounded worker pool over `rayon`, a cooperative
//! cancellation token, and the two-phase ordered split spec.md §5
//! mandates (internal vendors sequential, external vendors fanned out).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::{Vendor, VendorSource};
use crate::error::VendorError;

/// Thin `Arc<AtomicBool>` wrapper, checked at every vendor boundary
/// (sequential phase) and before every blocking call (parallel phase).
#[derive(Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Convenience for call sites that need to bail with the right error
    /// kind at a checkpoint.
    pub fn check(&self) -> Result<(), VendorError> {
        if self.is_cancelled() {
            Err(VendorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Split `vendors` into the internal (sequential) and external (pooled)
/// phases, preserving configured order within each group.
pub fn split_phases(vendors: &[Vendor]) -> (Vec<&Vendor>, Vec<&Vendor>) {
    let internal = vendors.iter().filter(|v| v.source == VendorSource::Internal).collect();
    let external = vendors.iter().filter(|v| v.source == VendorSource::External).collect();
    (internal, external)
}

pub fn worker_pool(max_workers: Option<usize>, vendor_count: usize) -> Result<ThreadPool, VendorError> {
    let size = max_workers.unwrap_or(vendor_count.max(1)).min(vendor_count.max(1)).max(1);
    ThreadPoolBuilder::new()
        .num_threads(size)
        .build()
        .map_err(|e| VendorError::ConfigInvalid(format!("failed to build worker pool: {e}")))
}

/// Run `per_vendor` for every external vendor in `vendors` inside the
/// bounded pool, checking cancellation before starting each one. Internal
/// vendors are expected to have already been driven sequentially by the
/// caller before this is invoked (spec.md §5 "Internal vendors complete
/// before any external vendor starts").
pub fn run_external_phase<T, F>(
    vendors: &[&Vendor],
    max_workers: Option<usize>,
    cancellation: &Cancellation,
    per_vendor: F,
) -> Result<Vec<(String, Result<T, VendorError>)>, VendorError>
where
    T: Send,
    F: Fn(&Vendor) -> Result<T, VendorError> + Sync,
{
    if vendors.is_empty() {
        return Ok(Vec::new());
    }

    let pool = worker_pool(max_workers, vendors.len())?;
    let results: Vec<(String, Result<T, VendorError>)> = pool.install(|| {
        use rayon::prelude::*;
        vendors
            .par_iter()
            .map(|vendor| {
                let outcome = if cancellation.is_cancelled() {
                    Err(VendorError::Cancelled)
                } else {
                    per_vendor(vendor)
                };
                (vendor.name.clone(), outcome)
            })
            .collect()
    });

    Ok(results)
}
