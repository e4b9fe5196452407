use super::plan::{plan_fetches, InteriorGap};
use super::SyncError;
use crate::config::{GapStrategy, TrackWorkConfig};
use crate::model::{LocalVersionRange, TrackWorkNotification, VersionedDocumentId};
use crate::remote::RemoteDocumentSource;
use crate::store::DocumentStore;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub remote_documents: usize,
    pub new_documents: usize,
    pub updated_documents: usize,
    pub fetched: usize,
    pub persisted: usize,
    /// Versions whose fetch failed; they stay missing until the next cycle.
    pub failed: Vec<VersionedDocumentId>,
    pub interior_gaps: Vec<InteriorGap>,
    /// Missing versions held back by the per-document cap; fetched on later cycles.
    pub deferred_versions: u64,
}

impl SyncReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            remote_documents: 0,
            new_documents: 0,
            updated_documents: 0,
            fetched: 0,
            persisted: 0,
            failed: Vec::new(),
            interior_gaps: Vec::new(),
            deferred_versions: 0,
        }
    }
}

/// Brings local track-work notification versions in line with the live interface.
pub struct VersionReconciler {
    source: Arc<dyn RemoteDocumentSource>,
    store: Arc<dyn DocumentStore>,
    max_concurrent_fetches: usize,
    max_versions_per_document: usize,
    gap_strategy: GapStrategy,
}

impl VersionReconciler {
    pub fn new(source: Arc<dyn RemoteDocumentSource>, store: Arc<dyn DocumentStore>) -> Self {
        let defaults = TrackWorkConfig::default();
        Self {
            source,
            store,
            max_concurrent_fetches: defaults.max_concurrent_fetches,
            max_versions_per_document: defaults.max_versions_per_document,
            gap_strategy: defaults.gap_strategy,
        }
    }

    pub fn from_config(
        source: Arc<dyn RemoteDocumentSource>,
        store: Arc<dyn DocumentStore>,
        config: &TrackWorkConfig,
    ) -> Self {
        Self::new(source, store)
            .with_max_concurrent_fetches(config.max_concurrent_fetches)
            .with_max_versions_per_document(config.max_versions_per_document)
            .with_gap_strategy(config.gap_strategy)
    }

    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit.max(1);
        self
    }

    pub fn with_max_versions_per_document(mut self, limit: usize) -> Self {
        self.max_versions_per_document = limit.max(1);
        self
    }

    pub fn with_gap_strategy(mut self, strategy: GapStrategy) -> Self {
        self.gap_strategy = strategy;
        self
    }

    /// Run one cycle: poll statuses, compute gaps, fetch and persist.
    ///
    /// A failed status poll or a storage failure aborts the cycle. Failed
    /// version fetches are reported and retried on the next cycle.
    #[tracing::instrument(
        name = "trackwork.sync",
        skip(self),
        fields(
            remote_documents = tracing::field::Empty,
            fetches = tracing::field::Empty,
        )
    )]
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let mut report = SyncReport::new(Utc::now());
        counter!("railsync.trackwork.cycles").increment(1);

        let statuses = self.source.statuses().await.map_err(|e| {
            counter!("railsync.trackwork.cycle_failures").increment(1);
            SyncError::Status(e)
        })?;
        report.remote_documents = statuses.len();
        tracing::Span::current().record("remote_documents", statuses.len());

        if statuses.is_empty() {
            debug!("No track-work notifications reported by the live interface");
            report.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let ids: Vec<u64> = statuses.iter().map(|s| s.id).collect();
        let stored = self.store.find_versions(&ids).await.map_err(|e| {
            counter!("railsync.trackwork.cycle_failures").increment(1);
            SyncError::Store(e)
        })?;
        let local: HashMap<u64, LocalVersionRange> = stored
            .into_iter()
            .filter_map(|(id, versions)| {
                LocalVersionRange::from_versions(id, versions).map(|range| (id, range))
            })
            .collect();

        let plan = plan_fetches(
            &statuses,
            &local,
            self.gap_strategy,
            self.max_versions_per_document,
        );
        tracing::Span::current().record("fetches", plan.fetches.len());

        for regression in &plan.regressions {
            warn!(
                document_id = regression.id,
                remote_latest = regression.remote_latest,
                local_max = regression.local_max,
                "Remote latest version is below the stored maximum"
            );
        }
        for gap in &plan.interior_gaps {
            warn!(
                document_id = gap.id,
                missing = ?gap.missing,
                "Stored versions have interior gaps that bounds reconciliation will not fill"
            );
        }

        for deferred in &plan.deferred {
            warn!(
                document_id = deferred.id,
                deferred = deferred.deferred,
                limit = self.max_versions_per_document,
                "Too many missing versions for one cycle; the rest follow in later cycles"
            );
        }

        report.new_documents = plan.new_documents;
        report.deferred_versions = plan.deferred.iter().map(|d| d.deferred).sum();
        report.updated_documents = plan.updated_documents;
        report.interior_gaps = plan.interior_gaps;

        if plan.fetches.is_empty() {
            debug!(documents = statuses.len(), "Track-work notifications up to date");
            report.duration_ms = start.elapsed().as_millis() as u64;
            histogram!("railsync.trackwork.cycle_ms").record(report.duration_ms as f64);
            return Ok(report);
        }

        let results = stream::iter(plan.fetches.into_iter().map(|vid| async move {
            (vid, self.source.fetch_version(vid.id, vid.version).await)
        }))
        .buffer_unordered(self.max_concurrent_fetches)
        .collect::<Vec<_>>()
        .await;

        let mut documents: Vec<TrackWorkNotification> = Vec::with_capacity(results.len());
        for (vid, result) in results {
            match result {
                Ok(document) => documents.push(document),
                Err(e) => {
                    error!(document = %vid, error = %e, "Failed to fetch track-work notification version");
                    report.failed.push(vid);
                }
            }
        }
        documents.sort_by_key(|d| d.versioned_id());
        report.failed.sort_unstable();
        report.fetched = documents.len();

        counter!("railsync.trackwork.fetched").increment(report.fetched as u64);
        counter!("railsync.trackwork.fetch_failures").increment(report.failed.len() as u64);

        report.persisted = self.store.save_all(&documents).await.map_err(|e| {
            counter!("railsync.trackwork.cycle_failures").increment(1);
            SyncError::Store(e)
        })?;
        counter!("railsync.trackwork.persisted").increment(report.persisted as u64);

        report.duration_ms = start.elapsed().as_millis() as u64;
        histogram!("railsync.trackwork.cycle_ms").record(report.duration_ms as f64);

        info!(
            remote_documents = report.remote_documents,
            new_documents = report.new_documents,
            updated_documents = report.updated_documents,
            fetched = report.fetched,
            persisted = report.persisted,
            failed = report.failed.len(),
            elapsed_ms = report.duration_ms,
            "Track-work notifications synchronized"
        );

        Ok(report)
    }
}
