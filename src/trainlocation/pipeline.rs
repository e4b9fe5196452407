use super::publish::{topic_for, PublishSink};
use super::{RecentlySeenFilter, SentinelFilter, TickError, TrackProximityFilter};
use crate::model::TrainLocation;
use crate::remote::PositionSource;
use crate::store::PositionStore;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one pipeline tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub received: usize,
    pub duplicates: usize,
    pub sentinel_rejected: usize,
    pub off_track_rejected: usize,
    pub accepted: usize,
    pub published: usize,
    pub publish_failures: usize,
}

/// Fetch, filter, persist and publish train locations, one batch per tick.
pub struct PositionPipeline {
    source: Arc<dyn PositionSource>,
    store: Arc<dyn PositionStore>,
    sink: Option<Arc<dyn PublishSink>>,
    recently_seen: Arc<RecentlySeenFilter>,
    sentinels: SentinelFilter,
    proximity: TrackProximityFilter,
    topic_prefix: String,
}

impl PositionPipeline {
    pub fn new(
        source: Arc<dyn PositionSource>,
        store: Arc<dyn PositionStore>,
        proximity: TrackProximityFilter,
    ) -> Self {
        Self {
            source,
            store,
            sink: None,
            recently_seen: Arc::new(RecentlySeenFilter::new()),
            sentinels: SentinelFilter::default(),
            proximity,
            topic_prefix: String::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PublishSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_sentinels(mut self, sentinels: SentinelFilter) -> Self {
        self.sentinels = sentinels;
        self
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn with_recently_seen(mut self, recently_seen: Arc<RecentlySeenFilter>) -> Self {
        self.recently_seen = recently_seen;
        self
    }

    pub fn recently_seen(&self) -> &Arc<RecentlySeenFilter> {
        &self.recently_seen
    }

    /// Run one tick.
    ///
    /// A fetch or storage failure aborts the tick before anything is
    /// published and leaves the dedup state untouched. Publish failures are
    /// counted but do not fail the tick.
    pub async fn tick(&self) -> Result<TickReport, TickError> {
        let start = Instant::now();
        let started_at = Utc::now();

        let batch = self.source.fetch_locations().await.map_err(|e| {
            counter!("railsync.trainlocation.tick_failures", "stage" => "fetch").increment(1);
            TickError::Fetch(e)
        })?;
        let received = batch.len();

        let fresh = self.recently_seen.fresh(batch);
        let after_dedup = fresh.len();

        let on_real_position = self.sentinels.filter(fresh.clone());
        let after_sentinel = on_real_position.len();

        let accepted = self.proximity.filter(on_real_position);

        self.store.persist(&accepted).await.map_err(|e| {
            counter!("railsync.trainlocation.tick_failures", "stage" => "persist").increment(1);
            TickError::Store(e)
        })?;
        // Rejected reports are remembered too, so a stuck or off-track train
        // is not re-checked until its report changes
        self.recently_seen.remember(&fresh);

        let (published, publish_failures) = self.publish_all(&accepted).await;

        let report = TickReport {
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            received,
            duplicates: received - after_dedup,
            sentinel_rejected: after_dedup - after_sentinel,
            off_track_rejected: after_sentinel - accepted.len(),
            accepted: accepted.len(),
            published,
            publish_failures,
        };
        record_metrics(&report);

        if report.accepted > 0 || report.sentinel_rejected > 0 {
            info!(
                received = report.received,
                accepted = report.accepted,
                duplicates = report.duplicates,
                sentinel_rejected = report.sentinel_rejected,
                off_track_rejected = report.off_track_rejected,
                elapsed_ms = report.duration_ms,
                "Train locations processed"
            );
        } else {
            debug!(
                received = report.received,
                elapsed_ms = report.duration_ms,
                "No new train locations"
            );
        }

        Ok(report)
    }

    async fn publish_all(&self, accepted: &[TrainLocation]) -> (usize, usize) {
        let Some(sink) = self.sink.as_ref() else {
            return (0, 0);
        };

        let mut published = 0;
        let mut failures = 0;
        for location in accepted {
            let topic = topic_for(&self.topic_prefix, location);
            let payload = match serde_json::to_vec(location) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Failed to encode train location");
                    failures += 1;
                    continue;
                }
            };
            match sink.publish(&topic, &payload).await {
                Ok(()) => published += 1,
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Failed to publish train location");
                    failures += 1;
                }
            }
        }
        (published, failures)
    }
}

fn record_metrics(report: &TickReport) {
    counter!("railsync.trainlocation.received").increment(report.received as u64);
    counter!("railsync.trainlocation.rejected", "reason" => "duplicate")
        .increment(report.duplicates as u64);
    counter!("railsync.trainlocation.rejected", "reason" => "sentinel")
        .increment(report.sentinel_rejected as u64);
    counter!("railsync.trainlocation.rejected", "reason" => "off_track")
        .increment(report.off_track_rejected as u64);
    counter!("railsync.trainlocation.accepted").increment(report.accepted as u64);
    counter!("railsync.trainlocation.published").increment(report.published as u64);
    counter!("railsync.trainlocation.publish_failures").increment(report.publish_failures as u64);
    histogram!("railsync.trainlocation.tick_ms").record(report.duration_ms as f64);
}
