// Domain types shared by the track-work sync and the train-location pipeline
//
// Wire shapes follow the live interface JSON (camelCase field names).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one immutable version of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionedDocumentId {
    pub id: u64,
    pub version: u32,
}

impl VersionedDocumentId {
    pub fn new(id: u64, version: u32) -> Self {
        Self { id, version }
    }
}

impl fmt::Display for VersionedDocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.id, self.version)
    }
}

/// One version of a track-work notification.
///
/// Only `id` and `version` are interpreted; every other field is kept verbatim
/// so the stored document equals what the live interface served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackWorkNotification {
    pub id: u64,
    pub version: u32,
    #[serde(flatten)]
    pub content: serde_json::Map<String, serde_json::Value>,
}

impl TrackWorkNotification {
    pub fn versioned_id(&self) -> VersionedDocumentId {
        VersionedDocumentId::new(self.id, self.version)
    }
}

/// Latest version of a document as reported by one status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocumentStatus {
    pub id: u64,
    /// Missing or `null` on the wire means nothing has been published yet.
    #[serde(default)]
    pub version: Option<u32>,
}

impl RemoteDocumentStatus {
    /// Latest published version, treating a missing value as zero.
    pub fn latest_version(&self) -> u32 {
        self.version.unwrap_or(0)
    }
}

/// Locally stored versions of a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVersionRange {
    pub id: u64,
    pub min_version: u32,
    pub max_version: u32,
    versions: Vec<u32>,
}

impl LocalVersionRange {
    /// Build from the stored version numbers. Returns `None` for an empty list.
    pub fn from_versions(id: u64, mut versions: Vec<u32>) -> Option<Self> {
        versions.sort_unstable();
        versions.dedup();
        let min_version = *versions.first()?;
        let max_version = *versions.last()?;
        Some(Self {
            id,
            min_version,
            max_version,
            versions,
        })
    }

    pub fn versions(&self) -> &[u32] {
        &self.versions
    }

    pub fn contains(&self, version: u32) -> bool {
        self.versions.binary_search(&version).is_ok()
    }

    /// True when every version between min and max is stored.
    pub fn is_contiguous(&self) -> bool {
        (self.max_version - self.min_version) as usize + 1 == self.versions.len()
    }

    /// Versions strictly between min and max that are not stored.
    pub fn interior_gaps(&self) -> Vec<u32> {
        if self.is_contiguous() {
            return Vec::new();
        }
        (self.min_version + 1..self.max_version)
            .filter(|v| !self.contains(*v))
            .collect()
    }
}

/// A (latitude, longitude) pair in WGS84 degrees.
///
/// Serialized as a point with `x` = longitude and `y` = latitude, which is how
/// the live interface encodes locations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "PointXY", into = "PointXY")]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PointXY {
    x: f64,
    y: f64,
}

impl From<PointXY> for Coordinate {
    fn from(p: PointXY) -> Self {
        Coordinate { lat: p.y, lon: p.x }
    }
}

impl From<Coordinate> for PointXY {
    fn from(c: Coordinate) -> Self {
        PointXY { x: c.lon, y: c.lat }
    }
}

/// Identity of a train run: the train number on a given departure date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainLocationId {
    pub train_number: u32,
    pub departure_date: NaiveDate,
}

impl fmt::Display for TrainLocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.departure_date, self.train_number)
    }
}

/// A positional report for one train.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainLocation {
    pub train_location_id: TrainLocationId,
    pub timestamp: DateTime<Utc>,
    pub location: Coordinate,
    /// Coordinate exactly as the live interface resolved it, before any correction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liike_location: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<i32>,
}

impl fmt::Display for TrainLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "train {} at {} ({})",
            self.train_location_id, self.location, self.timestamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_range_bounds_and_gaps() {
        let range = LocalVersionRange::from_versions(7, vec![5, 2, 3, 5]).unwrap();
        assert_eq!(range.min_version, 2);
        assert_eq!(range.max_version, 5);
        assert!(!range.is_contiguous());
        assert_eq!(range.interior_gaps(), vec![4]);

        let contiguous = LocalVersionRange::from_versions(7, vec![1, 2, 3]).unwrap();
        assert!(contiguous.is_contiguous());
        assert!(contiguous.interior_gaps().is_empty());

        assert!(LocalVersionRange::from_versions(7, vec![]).is_none());
    }

    #[test]
    fn test_remote_status_missing_version_is_zero() {
        let status: RemoteDocumentStatus = serde_json::from_str(r#"{"id": 4}"#).unwrap();
        assert_eq!(status.latest_version(), 0);

        let status: RemoteDocumentStatus =
            serde_json::from_str(r#"{"id": 4, "version": 3}"#).unwrap();
        assert_eq!(status.latest_version(), 3);
    }

    #[test]
    fn test_notification_keeps_unknown_fields() {
        let json = r#"{"id": 10, "version": 2, "state": "ACTIVE", "organization": "X"}"#;
        let twn: TrackWorkNotification = serde_json::from_str(json).unwrap();
        assert_eq!(twn.versioned_id(), VersionedDocumentId::new(10, 2));
        assert_eq!(twn.content["state"], "ACTIVE");

        let back = serde_json::to_value(&twn).unwrap();
        assert_eq!(back["organization"], "X");
        assert_eq!(back["version"], 2);
    }

    #[test]
    fn test_train_location_wire_shape() {
        let json = r#"{
            "trainLocationId": {"trainNumber": 8765, "departureDate": "2024-05-02"},
            "timestamp": "2024-05-02T08:15:00Z",
            "location": {"x": 24.941, "y": 60.172},
            "speed": 42
        }"#;
        let loc: TrainLocation = serde_json::from_str(json).unwrap();
        assert_eq!(loc.train_location_id.train_number, 8765);
        assert_eq!(loc.location.lat, 60.172);
        assert_eq!(loc.location.lon, 24.941);
        assert_eq!(loc.speed, Some(42));
        assert!(loc.liike_location.is_none());

        let back = serde_json::to_value(&loc).unwrap();
        assert_eq!(back["location"]["x"], 24.941);
        assert_eq!(back["trainLocationId"]["departureDate"], "2024-05-02");
    }
}
