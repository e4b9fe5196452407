// railsync - track-work notification sync and train location streaming
//
// Two independent workloads run against the rail live interface:
// - track-work notifications: periodic version reconciliation into an
//   append-only document store
// - train locations: a ~1 s tick that fetches, filters, persists and
//   republishes positions
//
// Both run as tokio tasks under a fixed-interval, single-flight scheduler,
// with a small axum status server alongside.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub mod config;
mod init;
pub mod model;
pub mod remote;
pub mod retry;
pub mod schedule;
pub mod status;
pub mod store;
pub mod trackwork;
pub mod trainlocation;

use config::{PublishBackend, RuntimeConfig};
use remote::{HttpClient, LiveInterfaceClient, ReqwestHttpClient};
use retry::RetryPolicy;
use schedule::{run_periodic, SingleFlight};
use status::StatusBoard;
use store::{OperatorDocumentStore, OperatorPositionStore};
use trackwork::VersionReconciler;
use trainlocation::{
    HttpPublishSink, LogSink, PositionPipeline, PublishSink, SentinelFilter, TrackIndex,
    TrackProximityFilter,
};

pub use init::init_tracing;

/// The wired-up workloads for one configuration.
pub struct Services {
    pub reconciler: Option<Arc<VersionReconciler>>,
    pub pipeline: Option<Arc<PositionPipeline>>,
    pub status: Arc<StatusBoard>,
}

/// Build clients, stores and filters from configuration.
///
/// A subsystem is left out when disabled or when no live interface URL is set.
pub fn build_services(config: &RuntimeConfig, operator: opendal::Operator) -> Result<Services> {
    let configured = config.live_interface.is_configured();
    let track_work_enabled = configured && config.track_work.enabled;
    let train_locations_enabled = configured && config.train_locations.enabled;

    let http: Arc<dyn HttpClient> =
        Arc::new(ReqwestHttpClient::new(config.live_interface.request_timeout())?);
    let live = Arc::new(LiveInterfaceClient::new(
        config.live_interface.url.clone(),
        Arc::clone(&http),
        RetryPolicy::from(&config.live_interface.retry),
    ));

    let reconciler = if track_work_enabled {
        info!(
            interval_secs = config.track_work.interval_secs,
            max_concurrent_fetches = config.track_work.max_concurrent_fetches,
            gap_strategy = %config.track_work.gap_strategy,
            "Track-work sync enabled"
        );
        Some(Arc::new(VersionReconciler::from_config(
            live.clone(),
            Arc::new(OperatorDocumentStore::new(operator.clone())),
            &config.track_work,
        )))
    } else {
        info!("Track-work sync disabled");
        None
    };

    let pipeline = if train_locations_enabled {
        let settings = &config.train_locations;
        let proximity = match settings.track.geometry_path.as_deref() {
            Some(path) => {
                let index = TrackIndex::load(path)
                    .with_context(|| format!("Failed to load track geometry from {}", path))?;
                TrackProximityFilter::new(Arc::new(index), settings.track.max_distance_m)
            }
            None => TrackProximityFilter::disabled(),
        };

        let mut pipeline = PositionPipeline::new(
            live.clone(),
            Arc::new(OperatorPositionStore::new(operator)),
            proximity,
        )
        .with_sentinels(SentinelFilter::new(
            settings.sentinels.iter().copied().map(Into::into),
        ))
        .with_topic_prefix(config.profiles().deployment_prefix());

        if let Some(sink) = build_sink(config, Arc::clone(&http))? {
            pipeline = pipeline.with_sink(sink);
        }

        info!(
            interval_ms = settings.interval_ms,
            publish_backend = %config.publish.backend(),
            "Train location pipeline enabled"
        );
        Some(Arc::new(pipeline))
    } else {
        info!("Train location pipeline disabled");
        None
    };

    let status = Arc::new(StatusBoard::new(track_work_enabled, train_locations_enabled));

    Ok(Services {
        reconciler,
        pipeline,
        status,
    })
}

fn build_sink(
    config: &RuntimeConfig,
    http: Arc<dyn HttpClient>,
) -> Result<Option<Arc<dyn PublishSink>>> {
    let sink: Arc<dyn PublishSink> = match config.publish.backend() {
        PublishBackend::Http => {
            let endpoint = config
                .publish
                .endpoint
                .clone()
                .ok_or_else(|| anyhow::anyhow!("publish.endpoint required for http backend"))?;
            info!(endpoint = %endpoint, "Publishing train locations over HTTP bridge");
            Arc::new(HttpPublishSink::new(endpoint, http))
        }
        PublishBackend::Log => Arc::new(LogSink),
        PublishBackend::None => return Ok(None),
    };
    Ok(Some(sink))
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Entry point (loads config automatically)
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    run_with_config(config).await
}

/// Run both workloads until Ctrl+C / SIGTERM.
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);

    let operator = init::init_storage(&config)?;
    let services = build_services(&config, operator)?;

    if services.reconciler.is_none() && services.pipeline.is_none() {
        warn!("Nothing to run: both track-work sync and train locations are disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    if let Some(reconciler) = services.reconciler.clone() {
        let board = Arc::clone(&services.status);
        handles.push(tokio::spawn(run_periodic(
            "trackwork",
            config.track_work.interval(),
            SingleFlight::new(),
            shutdown_rx.clone(),
            move || {
                let reconciler = Arc::clone(&reconciler);
                let board = Arc::clone(&board);
                async move {
                    let result = reconciler.run().await;
                    if let Err(e) = &result {
                        error!(error = %e, "Track-work sync cycle failed");
                    }
                    board.record_sync(&result);
                }
            },
        )));
    }

    if let Some(pipeline) = services.pipeline.clone() {
        let board = Arc::clone(&services.status);
        handles.push(tokio::spawn(run_periodic(
            "trainlocation",
            config.train_locations.interval(),
            SingleFlight::new(),
            shutdown_rx.clone(),
            move || {
                let pipeline = Arc::clone(&pipeline);
                let board = Arc::clone(&board);
                async move {
                    let result = pipeline.tick().await;
                    if let Err(e) = &result {
                        error!(error = %e, "Train location tick failed");
                    }
                    board.record_tick(&result);
                }
            },
        )));
    }

    match config.server.as_ref() {
        Some(server) => {
            let listener = tokio::net::TcpListener::bind(&server.listen_addr)
                .await
                .with_context(|| format!("Failed to bind to {}", server.listen_addr))?;

            info!("Status endpoint listening on http://{}", server.listen_addr);
            info!("  GET  http://{}/health  - Health check", server.listen_addr);
            info!("  GET  http://{}/ready   - Readiness check", server.listen_addr);
            info!("  GET  http://{}/status  - Last cycle reports", server.listen_addr);
            info!("Press Ctrl+C or send SIGTERM to stop");

            axum::serve(listener, status::router(Arc::clone(&services.status)))
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Status server error")?;
        }
        None => {
            info!("Status endpoint disabled. Press Ctrl+C or send SIGTERM to stop");
            shutdown_signal().await;
        }
    }

    // Stop scheduling; a run already in progress finishes first
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Periodic task panicked");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Run one track-work cycle and one train location tick, then return.
pub async fn run_once(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);

    let operator = init::init_storage(&config)?;
    let services = build_services(&config, operator)?;
    run_services_once(&services).await
}

/// One pass over whatever `services` has enabled. Fails if any pass failed.
pub async fn run_services_once(services: &Services) -> Result<()> {
    let mut failures = Vec::new();

    if let Some(reconciler) = &services.reconciler {
        let result = reconciler.run().await;
        services.status.record_sync(&result);
        match result {
            Ok(report) => info!(
                fetched = report.fetched,
                persisted = report.persisted,
                failed = report.failed.len(),
                "Track-work sync finished"
            ),
            Err(e) => failures.push(format!("track-work sync: {}", e)),
        }
    }

    if let Some(pipeline) = &services.pipeline {
        let result = pipeline.tick().await;
        services.status.record_tick(&result);
        match result {
            Ok(report) => info!(
                received = report.received,
                accepted = report.accepted,
                "Train location tick finished"
            ),
            Err(e) => failures.push(format!("train locations: {}", e)),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{}", failures.join("; "))
    }
}
