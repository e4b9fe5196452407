//! Rail network geometry and the proximity check against it.
//!
//! Track geometry is loaded once from GeoJSON (`LineString` or
//! `MultiLineString`, bare or wrapped in features) and bucketed into a
//! fixed-size lat/lon grid so a lookup only visits nearby segments.

use crate::model::{Coordinate, TrainLocation};
use serde_json::Value;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

const DEG_TO_RAD: f64 = PI / 180.0;

/// Grid cell edge in degrees (about 5.5 km north-south).
const CELL_DEGREES: f64 = 0.05;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to read track geometry '{path}': {message}")]
    Io { path: String, message: String },

    #[error("invalid track geometry: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    a: Coordinate,
    b: Coordinate,
}

type Cell = (i32, i32);

fn cell_of(lat: f64, lon: f64) -> Cell {
    (
        (lat / CELL_DEGREES).floor() as i32,
        (lon / CELL_DEGREES).floor() as i32,
    )
}

/// Grid-bucketed index of track segments.
#[derive(Debug, Default)]
pub struct TrackIndex {
    segments: Vec<Segment>,
    cells: HashMap<Cell, Vec<usize>>,
}

impl TrackIndex {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TrackError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| TrackError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let index = Self::from_geojson_str(&content)?;
        info!(
            path = %path.display(),
            segments = index.segment_count(),
            cells = index.cells.len(),
            "Loaded track geometry"
        );
        Ok(index)
    }

    pub fn from_geojson_str(content: &str) -> Result<Self, TrackError> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| TrackError::Invalid(format!("not JSON: {}", e)))?;

        let mut lines = Vec::new();
        collect_lines(&value, &mut lines)?;

        let mut index = Self::default();
        for line in lines {
            index.add_line(&line);
        }

        if index.segments.is_empty() {
            return Err(TrackError::Invalid(
                "no LineString or MultiLineString segments found".into(),
            ));
        }
        Ok(index)
    }

    /// Build directly from polylines.
    pub fn from_lines<I, L>(lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[Coordinate]>,
    {
        let mut index = Self::default();
        for line in lines {
            index.add_line(line.as_ref());
        }
        index
    }

    fn add_line(&mut self, points: &[Coordinate]) {
        for pair in points.windows(2) {
            self.add_segment(Segment {
                a: pair[0],
                b: pair[1],
            });
        }
    }

    fn add_segment(&mut self, segment: Segment) {
        let id = self.segments.len();
        self.segments.push(segment);

        let (lat_lo, lat_hi) = min_max(segment.a.lat, segment.b.lat);
        let (lon_lo, lon_hi) = min_max(segment.a.lon, segment.b.lon);
        let (row_lo, col_lo) = cell_of(lat_lo, lon_lo);
        let (row_hi, col_hi) = cell_of(lat_hi, lon_hi);

        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                self.cells.entry((row, col)).or_default().push(id);
            }
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Distance in meters to the nearest segment within `search_radius_m`,
    /// or `None` when nothing is that close.
    pub fn nearest_distance_m(&self, point: &Coordinate, search_radius_m: f64) -> Option<f64> {
        let lat_span = search_radius_m / (EARTH_RADIUS_M * DEG_TO_RAD);
        let cos_lat = (point.lat * DEG_TO_RAD).cos().abs().max(1e-6);
        let lon_span = lat_span / cos_lat;

        let (row_lo, col_lo) = cell_of(point.lat - lat_span, point.lon - lon_span);
        let (row_hi, col_hi) = cell_of(point.lat + lat_span, point.lon + lon_span);

        let mut best: Option<f64> = None;
        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                let Some(ids) = self.cells.get(&(row, col)) else {
                    continue;
                };
                for &id in ids {
                    let d = distance_to_segment_m(point, &self.segments[id]);
                    if d <= search_radius_m && best.map_or(true, |b| d < b) {
                        best = Some(d);
                    }
                }
            }
        }
        best
    }
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Point-to-segment distance on a local equirectangular projection centered
/// on `point`. Accurate to well under a meter at rail-network scales.
fn distance_to_segment_m(point: &Coordinate, segment: &Segment) -> f64 {
    let cos_lat = (point.lat * DEG_TO_RAD).cos();
    let project = |c: &Coordinate| {
        (
            (c.lon - point.lon) * DEG_TO_RAD * cos_lat * EARTH_RADIUS_M,
            (c.lat - point.lat) * DEG_TO_RAD * EARTH_RADIUS_M,
        )
    };
    let (ax, ay) = project(&segment.a);
    let (bx, by) = project(&segment.b);

    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;
    // Degenerate segment
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (cx * cx + cy * cy).sqrt()
}

fn collect_lines(value: &Value, out: &mut Vec<Vec<Coordinate>>) -> Result<(), TrackError> {
    match value.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| TrackError::Invalid("FeatureCollection without features".into()))?;
            for feature in features {
                collect_lines(feature, out)?;
            }
        }
        Some("Feature") => {
            if let Some(geometry) = value.get("geometry").filter(|g| !g.is_null()) {
                collect_lines(geometry, out)?;
            }
        }
        Some("GeometryCollection") => {
            if let Some(geometries) = value.get("geometries").and_then(Value::as_array) {
                for geometry in geometries {
                    collect_lines(geometry, out)?;
                }
            }
        }
        Some("LineString") => {
            out.push(parse_positions(coordinates_of(value)?)?);
        }
        Some("MultiLineString") => {
            let lines = coordinates_of(value)?
                .as_array()
                .ok_or_else(|| TrackError::Invalid("MultiLineString coordinates".into()))?;
            for line in lines {
                out.push(parse_positions(line)?);
            }
        }
        Some(other) => {
            debug!(geometry = other, "Skipping non-line geometry");
        }
        None => return Err(TrackError::Invalid("missing GeoJSON type".into())),
    }
    Ok(())
}

fn coordinates_of(value: &Value) -> Result<&Value, TrackError> {
    value
        .get("coordinates")
        .ok_or_else(|| TrackError::Invalid("geometry without coordinates".into()))
}

/// GeoJSON positions are `[lon, lat, ...]`.
fn parse_positions(value: &Value) -> Result<Vec<Coordinate>, TrackError> {
    let positions = value
        .as_array()
        .ok_or_else(|| TrackError::Invalid("positions must be an array".into()))?;
    positions
        .iter()
        .map(|p| {
            let lon = p.get(0).and_then(Value::as_f64);
            let lat = p.get(1).and_then(Value::as_f64);
            match (lat, lon) {
                (Some(lat), Some(lon)) => Ok(Coordinate::new(lat, lon)),
                _ => Err(TrackError::Invalid(format!("bad position {}", p))),
            }
        })
        .collect()
}

/// Accepts reports within `max_distance_m` of the rail network.
///
/// Without an index every report is accepted.
#[derive(Debug, Clone)]
pub struct TrackProximityFilter {
    index: Option<Arc<TrackIndex>>,
    max_distance_m: f64,
}

impl TrackProximityFilter {
    pub fn new(index: Arc<TrackIndex>, max_distance_m: f64) -> Self {
        Self {
            index: Some(index),
            max_distance_m,
        }
    }

    /// A filter with no geometry. Logs a warning once, at construction.
    pub fn disabled() -> Self {
        warn!("No track geometry configured; train locations are not checked against the rail network");
        Self {
            index: None,
            max_distance_m: 0.0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.index.is_some()
    }

    pub fn is_near_track(&self, coordinate: &Coordinate) -> bool {
        match &self.index {
            Some(index) => index
                .nearest_distance_m(coordinate, self.max_distance_m)
                .is_some(),
            None => true,
        }
    }

    pub fn filter(&self, batch: Vec<TrainLocation>) -> Vec<TrainLocation> {
        if self.index.is_none() {
            return batch;
        }
        batch
            .into_iter()
            .filter(|location| {
                let near = self.is_near_track(&location.location);
                if !near {
                    debug!(
                        train = %location.train_location_id,
                        location = %location.location,
                        "Train location is too far from any track"
                    );
                }
                near
            })
            .collect()
    }
}
