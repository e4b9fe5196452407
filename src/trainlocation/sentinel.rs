//! Placeholder coordinates the live interface emits for unresolved positions.

use crate::model::{Coordinate, TrainLocation};
use tracing::info;

/// Rejects reports sitting exactly on a known placeholder coordinate.
///
/// Matching is string equality at six decimals, so only the exact placeholder
/// is dropped and a genuine position nearby is kept.
#[derive(Debug, Clone)]
pub struct SentinelFilter {
    sentinels: Vec<(String, String)>,
}

impl Default for SentinelFilter {
    fn default() -> Self {
        Self::new([
            Coordinate::new(60.170799, 24.9375),
            Coordinate::new(60.1708, 24.9375),
        ])
    }
}

fn format_degrees(value: f64) -> String {
    format!("{:.6}", value)
}

impl SentinelFilter {
    pub fn new(sentinels: impl IntoIterator<Item = Coordinate>) -> Self {
        Self {
            sentinels: sentinels
                .into_iter()
                .map(|c| (format_degrees(c.lat), format_degrees(c.lon)))
                .collect(),
        }
    }

    pub fn is_sentinel(&self, coordinate: &Coordinate) -> bool {
        if self.sentinels.is_empty() {
            return false;
        }
        let lat = format_degrees(coordinate.lat);
        let lon = format_degrees(coordinate.lon);
        self.sentinels.iter().any(|(s_lat, s_lon)| *s_lat == lat && *s_lon == lon)
    }

    /// Keep reports that are not on a sentinel. Each rejection is logged.
    pub fn filter(&self, batch: Vec<TrainLocation>) -> Vec<TrainLocation> {
        batch
            .into_iter()
            .filter(|location| {
                if self.is_sentinel(&location.location) {
                    info!(
                        train = %location.train_location_id,
                        location = %location.location,
                        "Filtered train location on placeholder coordinate"
                    );
                    false
                } else {
                    true
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sentinels_match_exactly() {
        let filter = SentinelFilter::default();
        assert!(filter.is_sentinel(&Coordinate::new(60.170799, 24.9375)));
        assert!(filter.is_sentinel(&Coordinate::new(60.1708, 24.937500)));
        // Rounds to the same six decimals
        assert!(filter.is_sentinel(&Coordinate::new(60.1707994, 24.9375001)));
    }

    #[test]
    fn test_nearby_position_is_kept() {
        let filter = SentinelFilter::default();
        assert!(!filter.is_sentinel(&Coordinate::new(60.170801, 24.9375)));
        assert!(!filter.is_sentinel(&Coordinate::new(60.1708, 24.937501)));
    }

    #[test]
    fn test_empty_sentinel_list_accepts_everything() {
        let filter = SentinelFilter::new([]);
        assert!(!filter.is_sentinel(&Coordinate::new(60.1708, 24.9375)));
    }
}
