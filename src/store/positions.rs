//! Accepted train locations written as one JSON-lines object per tick.
//!
//! A single object write per batch keeps persistence all-or-nothing.

use super::{PositionStore, StoreError};
use crate::model::TrainLocation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opendal::Operator;
use tracing::debug;
use uuid::Uuid;

const ROOT: &str = "train-locations/";

#[derive(Clone)]
pub struct OperatorPositionStore {
    op: Operator,
}

impl OperatorPositionStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    /// `train-locations/{yyyy-mm-dd}/{HHMMSS.mmm}-{uuid}.jsonl`
    pub fn batch_path(written_at: DateTime<Utc>) -> String {
        format!(
            "{}{}/{}-{}.jsonl",
            ROOT,
            written_at.format("%Y-%m-%d"),
            written_at.format("%H%M%S%.3f"),
            Uuid::new_v4().simple()
        )
    }

    fn encode(path: &str, locations: &[TrainLocation]) -> Result<Vec<u8>, StoreError> {
        let mut out = Vec::with_capacity(locations.len() * 256);
        for location in locations {
            serde_json::to_writer(&mut out, location).map_err(|e| StoreError::encode(path, e))?;
            out.push(b'\n');
        }
        Ok(out)
    }
}

#[async_trait]
impl PositionStore for OperatorPositionStore {
    async fn persist(&self, locations: &[TrainLocation]) -> Result<(), StoreError> {
        if locations.is_empty() {
            return Ok(());
        }

        let path = Self::batch_path(Utc::now());
        let bytes = Self::encode(&path, locations)?;
        let size = bytes.len();

        self.op
            .write(&path, bytes)
            .await
            .map_err(|e| StoreError::backend("write", &path, e))?;

        debug!(path = %path, rows = locations.len(), bytes = size, "Persisted train locations");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinate, TrainLocationId};
    use chrono::{NaiveDate, TimeZone};
    use opendal::services;

    fn location(train_number: u32) -> TrainLocation {
        TrainLocation {
            train_location_id: TrainLocationId {
                train_number,
                departure_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            },
            timestamp: Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap(),
            location: Coordinate::new(60.2, 24.9),
            liike_location: None,
            speed: Some(50),
            accuracy: None,
        }
    }

    #[test]
    fn test_batch_path_layout() {
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 8, 15, 30).unwrap();
        let path = OperatorPositionStore::batch_path(at);
        assert!(path.starts_with("train-locations/2024-05-02/081530.000-"));
        assert!(path.ends_with(".jsonl"));
    }

    #[tokio::test]
    async fn test_persist_writes_one_object_per_batch() {
        let op = Operator::new(services::Memory::default())
            .expect("memory operator")
            .finish();
        let store = OperatorPositionStore::new(op.clone());

        store.persist(&[location(1), location(2)]).await.unwrap();
        store.persist(&[]).await.unwrap();

        let entries: Vec<_> = op
            .list_with(ROOT)
            .recursive(true)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.metadata().is_file())
            .collect();
        assert_eq!(entries.len(), 1);

        let body = op.read(entries[0].path()).await.unwrap().to_vec();
        let lines: Vec<TrainLocation> = body
            .split(|b| *b == b'\n')
            .filter(|l| !l.is_empty())
            .map(|l| serde_json::from_slice(l).unwrap())
            .collect();
        assert_eq!(lines, vec![location(1), location(2)]);
    }
}
