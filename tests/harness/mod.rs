//! Shared fakes for integration tests
//!
//! In-memory stand-ins for the live interface, the stores and the publish
//! sink, with failure injection and call recording so tests can assert on
//! exactly which remote calls a cycle made.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use railsync::model::{
    Coordinate, RemoteDocumentStatus, TrackWorkNotification, TrainLocation, TrainLocationId,
    VersionedDocumentId,
};
use railsync::remote::{PositionSource, RemoteDocumentSource, RemoteError};
use railsync::store::{DocumentStore, OperatorDocumentStore, PositionStore, StoreError};
use railsync::trainlocation::{PublishError, PublishSink};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

pub fn memory_operator() -> opendal::Operator {
    opendal::Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

pub fn memory_document_store() -> OperatorDocumentStore {
    OperatorDocumentStore::new(memory_operator())
}

pub fn notification(id: u64, version: u32) -> TrackWorkNotification {
    let mut content = serde_json::Map::new();
    content.insert(
        "state".into(),
        serde_json::Value::String(format!("v{}", version)),
    );
    TrackWorkNotification {
        id,
        version,
        content,
    }
}

/// Live interface fake for track-work notifications.
///
/// Every document has versions `1..=latest`. Individual versions can be made
/// to fail; every fetch is recorded.
#[derive(Default)]
pub struct FakeDocumentSource {
    latest: Mutex<Vec<RemoteDocumentStatus>>,
    failing: Mutex<HashSet<VersionedDocumentId>>,
    fetches: Mutex<Vec<VersionedDocumentId>>,
    statuses_unavailable: AtomicBool,
}

impl FakeDocumentSource {
    pub fn new(documents: &[(u64, u32)]) -> Self {
        let source = Self::default();
        source.set_latest(documents);
        source
    }

    pub fn set_latest(&self, documents: &[(u64, u32)]) {
        *self.latest.lock() = documents
            .iter()
            .map(|(id, version)| RemoteDocumentStatus {
                id: *id,
                version: Some(*version),
            })
            .collect();
    }

    pub fn fail_version(&self, id: u64, version: u32) {
        self.failing.lock().insert(VersionedDocumentId::new(id, version));
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn set_statuses_unavailable(&self, unavailable: bool) {
        self.statuses_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> Vec<VersionedDocumentId> {
        let mut fetches = self.fetches.lock().clone();
        fetches.sort_unstable();
        fetches
    }

    pub fn fetched_versions(&self, id: u64) -> Vec<u32> {
        self.fetches()
            .into_iter()
            .filter(|f| f.id == id)
            .map(|f| f.version)
            .collect()
    }

    pub fn reset_fetches(&self) {
        self.fetches.lock().clear();
    }
}

#[async_trait]
impl RemoteDocumentSource for FakeDocumentSource {
    async fn statuses(&self) -> Result<Vec<RemoteDocumentStatus>, RemoteError> {
        if self.statuses_unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::transport("fake://ruma/rti", "unavailable"));
        }
        Ok(self.latest.lock().clone())
    }

    async fn fetch_version(
        &self,
        id: u64,
        version: u32,
    ) -> Result<TrackWorkNotification, RemoteError> {
        let vid = VersionedDocumentId::new(id, version);
        self.fetches.lock().push(vid);
        if self.failing.lock().contains(&vid) {
            return Err(RemoteError::from_status(
                &format!("fake://ruma/rti/{}/{}", id, version),
                503,
            ));
        }
        Ok(notification(id, version))
    }
}

/// Document store whose writes can be switched off.
pub struct FlakyDocumentStore {
    inner: OperatorDocumentStore,
    fail_writes: AtomicBool,
}

impl FlakyDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: memory_document_store(),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FlakyDocumentStore {
    async fn find_versions(&self, ids: &[u64]) -> Result<HashMap<u64, Vec<u32>>, StoreError> {
        self.inner.find_versions(ids).await
    }

    async fn save_all(&self, documents: &[TrackWorkNotification]) -> Result<usize, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend(
                "write",
                "track-work-notifications/",
                "disk full",
            ));
        }
        self.inner.save_all(documents).await
    }
}

pub fn train(train_number: u32, lat: f64, lon: f64) -> TrainLocation {
    TrainLocation {
        train_location_id: TrainLocationId {
            train_number,
            departure_date: NaiveDate::from_ymd_opt(2024, 9, 2).expect("date"),
        },
        timestamp: Utc
            .with_ymd_and_hms(2024, 9, 2, 6, 0, 0)
            .single()
            .expect("timestamp"),
        location: Coordinate::new(lat, lon),
        liike_location: Some(Coordinate::new(lat, lon)),
        speed: Some(60),
        accuracy: Some(10),
    }
}

/// Live interface fake for train locations: serves whatever batch is set.
#[derive(Default)]
pub struct FakePositionSource {
    batch: Mutex<Vec<TrainLocation>>,
    unavailable: AtomicBool,
}

impl FakePositionSource {
    pub fn set_batch(&self, batch: Vec<TrainLocation>) {
        *self.batch.lock() = batch;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl PositionSource for FakePositionSource {
    async fn fetch_locations(&self) -> Result<Vec<TrainLocation>, RemoteError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::malformed("fake://kuplas", "truncated body"));
        }
        Ok(self.batch.lock().clone())
    }
}

/// Position store that records batches in memory and can be made to fail.
#[derive(Default)]
pub struct RecordingPositionStore {
    batches: Mutex<Vec<Vec<TrainLocation>>>,
    fail: AtomicBool,
}

impl RecordingPositionStore {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<TrainLocation>> {
        self.batches.lock().clone()
    }

    pub fn persisted(&self) -> Vec<TrainLocation> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl PositionStore for RecordingPositionStore {
    async fn persist(&self, locations: &[TrainLocation]) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::backend("write", "train-locations/", "bucket gone"));
        }
        if !locations.is_empty() {
            self.batches.lock().push(locations.to_vec());
        }
        Ok(())
    }
}

/// Publish sink that records topics and can reject every message.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(String, serde_json::Value)>>,
    reject: AtomicBool,
}

impl RecordingSink {
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn topics(&self) -> Vec<String> {
        self.messages.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn messages(&self) -> Vec<(String, serde_json::Value)> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl PublishSink for RecordingSink {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(PublishError::Transport {
                topic: topic.to_string(),
                source: RemoteError::from_status("fake://bridge", 502),
            });
        }
        let value = serde_json::from_slice(payload).map_err(|e| PublishError::Encode {
            topic: topic.to_string(),
            message: e.to_string(),
        })?;
        self.messages.lock().push((topic.to_string(), value));
        Ok(())
    }
}
