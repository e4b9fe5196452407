// Track-work notification synchronization
//
// Each cycle diffs remote latest versions against stored versions and fetches
// only what is missing. Stored versions are never rewritten.

mod plan;
mod reconcile;

pub use plan::{plan_fetches, DeferredVersions, FetchPlan, InteriorGap, VersionRegression};
pub use reconcile::{SyncReport, VersionReconciler};

use crate::remote::RemoteError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that abort a whole reconciliation cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to poll document statuses: {0}")]
    Status(#[source] RemoteError),

    #[error("document store failed: {0}")]
    Store(#[source] StoreError),
}
