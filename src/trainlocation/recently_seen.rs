//! Suppression of reports that have not changed since they were last accepted.

use crate::model::{TrainLocation, TrainLocationId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// What makes two reports for the same train "the same".
///
/// Coordinates compare at 6-decimal granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Fingerprint {
    timestamp: DateTime<Utc>,
    lat_micro: i64,
    lon_micro: i64,
    speed: Option<i32>,
    accuracy: Option<i32>,
}

impl Fingerprint {
    fn of(location: &TrainLocation) -> Self {
        Self {
            timestamp: location.timestamp,
            lat_micro: to_micro(location.location.lat),
            lon_micro: to_micro(location.location.lon),
            speed: location.speed,
            accuracy: location.accuracy,
        }
    }
}

fn to_micro(degrees: f64) -> i64 {
    (degrees * 1_000_000.0).round() as i64
}

/// Process-lifetime memory of the last accepted report per train.
#[derive(Debug, Default)]
pub struct RecentlySeenFilter {
    seen: Mutex<HashMap<TrainLocationId, Fingerprint>>,
}

impl RecentlySeenFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports that differ from the last accepted one for their train.
    ///
    /// Does not touch the state. Inside the batch each report is compared with
    /// the previous one accepted for the same train.
    pub fn fresh(&self, batch: Vec<TrainLocation>) -> Vec<TrainLocation> {
        let seen = self.seen.lock();
        let mut in_batch: HashMap<TrainLocationId, Fingerprint> = HashMap::new();

        batch
            .into_iter()
            .filter(|location| {
                let id = &location.train_location_id;
                let fingerprint = Fingerprint::of(location);
                let last = in_batch.get(id).or_else(|| seen.get(id));
                if last == Some(&fingerprint) {
                    return false;
                }
                in_batch.insert(id.clone(), fingerprint);
                true
            })
            .collect()
    }

    /// Record reports as accepted.
    pub fn remember(&self, accepted: &[TrainLocation]) {
        let mut seen = self.seen.lock();
        for location in accepted {
            seen.insert(location.train_location_id.clone(), Fingerprint::of(location));
        }
    }

    /// Accept-and-record in one step.
    pub fn filter(&self, batch: Vec<TrainLocation>) -> Vec<TrainLocation> {
        let accepted = self.fresh(batch);
        self.remember(&accepted);
        accepted
    }

    /// Number of trains with a remembered report.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
