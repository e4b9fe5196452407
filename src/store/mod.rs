// Local persistence for track-work notifications and train locations
//
// Both stores sit on an OpenDAL operator so the same code writes to a local
// directory in development and to S3 in deployment.

use crate::config::{StorageBackend, StorageConfig};
use crate::model::{TrackWorkNotification, TrainLocation};
use async_trait::async_trait;
use std::collections::HashMap;

mod documents;
mod error;
mod positions;

pub use documents::OperatorDocumentStore;
pub use error::StoreError;
pub use positions::OperatorPositionStore;

/// Append-only store of document versions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stored version numbers per requested id. Ids with nothing stored are absent.
    async fn find_versions(&self, ids: &[u64]) -> Result<HashMap<u64, Vec<u32>>, StoreError>;

    /// Persist documents. Versions already stored are left untouched.
    /// Returns how many were newly written.
    async fn save_all(&self, documents: &[TrackWorkNotification]) -> Result<usize, StoreError>;
}

/// Batch sink for accepted train locations.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Persist the whole batch or nothing.
    async fn persist(&self, locations: &[TrainLocation]) -> Result<(), StoreError>;
}

/// Build an OpenDAL operator from the storage configuration.
pub fn build_operator(config: &StorageConfig) -> Result<opendal::Operator, StoreError> {
    let operator = match config.backend {
        StorageBackend::Fs => {
            let fs = config.fs.as_ref().ok_or_else(|| {
                StoreError::InvalidConfig("fs config required for filesystem backend".into())
            })?;

            let builder = opendal::services::Fs::default().root(&fs.path);
            opendal::Operator::new(builder)
                .map_err(|e| {
                    StoreError::InvalidConfig(format!("Failed to create filesystem operator: {}", e))
                })?
                .finish()
        }
        StorageBackend::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                StoreError::InvalidConfig("s3 config required for S3 backend".into())
            })?;

            let mut builder = opendal::services::S3::default()
                .bucket(&s3.bucket)
                .region(&s3.region);

            if let Some(endpoint) = &s3.endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(prefix) = &s3.prefix {
                builder = builder.root(prefix);
            }

            opendal::Operator::new(builder)
                .map_err(|e| {
                    StoreError::InvalidConfig(format!("Failed to create S3 operator: {}", e))
                })?
                .finish()
        }
    };

    tracing::debug!(backend = %config.backend, "Storage operator initialized");
    Ok(operator)
}
