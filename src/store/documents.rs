//! Track-work notification versions stored as one JSON object per version.
//!
//! Layout: `track-work-notifications/{id}/{version}.json`. The object key is
//! the dedup key, so a version is written at most once.

use super::{DocumentStore, StoreError};
use crate::model::{TrackWorkNotification, VersionedDocumentId};
use async_trait::async_trait;
use opendal::{ErrorKind, Operator};
use std::collections::{HashMap, HashSet};
use tracing::debug;

const ROOT: &str = "track-work-notifications/";

#[derive(Clone)]
pub struct OperatorDocumentStore {
    op: Operator,
}

impl OperatorDocumentStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn path_for(id: VersionedDocumentId) -> String {
        format!("{}{}/{}.json", ROOT, id.id, id.version)
    }

    /// Parse `track-work-notifications/{id}/{version}.json` back into its parts.
    fn parse_path(path: &str) -> Option<VersionedDocumentId> {
        let rest = path.strip_prefix(ROOT)?;
        let (id, file) = rest.split_once('/')?;
        let version = file.strip_suffix(".json")?;
        Some(VersionedDocumentId::new(id.parse().ok()?, version.parse().ok()?))
    }

    /// Read back one stored version.
    pub async fn get(
        &self,
        id: VersionedDocumentId,
    ) -> Result<Option<TrackWorkNotification>, StoreError> {
        let path = Self::path_for(id);
        match self.op.read(&path).await {
            Ok(buf) => serde_json::from_slice(&buf.to_vec())
                .map(Some)
                .map_err(|e| StoreError::backend("decode", &path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::backend("read", &path, e)),
        }
    }
}

#[async_trait]
impl DocumentStore for OperatorDocumentStore {
    async fn find_versions(&self, ids: &[u64]) -> Result<HashMap<u64, Vec<u32>>, StoreError> {
        let wanted: HashSet<u64> = ids.iter().copied().collect();
        let entries = match self.op.list_with(ROOT).recursive(true).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::backend("list", ROOT, e)),
        };

        let mut versions: HashMap<u64, Vec<u32>> = HashMap::new();
        for entry in entries {
            if !entry.metadata().is_file() {
                continue;
            }
            if let Some(vid) = Self::parse_path(entry.path()) {
                if wanted.contains(&vid.id) {
                    versions.entry(vid.id).or_default().push(vid.version);
                }
            }
        }

        Ok(versions)
    }

    async fn save_all(&self, documents: &[TrackWorkNotification]) -> Result<usize, StoreError> {
        let mut written = 0;

        for document in documents {
            let path = Self::path_for(document.versioned_id());

            let exists = self
                .op
                .exists(&path)
                .await
                .map_err(|e| StoreError::backend("stat", &path, e))?;
            if exists {
                debug!(document = %document.versioned_id(), "Version already stored, skipping");
                continue;
            }

            let bytes = serde_json::to_vec(document).map_err(|e| StoreError::encode(&path, e))?;
            self.op
                .write(&path, bytes)
                .await
                .map_err(|e| StoreError::backend("write", &path, e))?;
            written += 1;
        }

        Ok(written)
    }
}
