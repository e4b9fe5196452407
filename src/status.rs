// Status endpoint
//
// GET /health  - process is up
// GET /ready   - both subsystems finished a cycle (or are disabled)
// GET /status  - last report and counters per subsystem

use crate::trackwork::{SyncError, SyncReport};
use crate::trainlocation::{TickError, TickReport};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubsystemStatus {
    pub enabled: bool,
    pub cycles: u64,
    pub failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<serde_json::Value>,
}

impl SubsystemStatus {
    fn record<R: Serialize, E: std::fmt::Display>(&mut self, result: &Result<R, E>) {
        self.cycles += 1;
        match result {
            Ok(report) => {
                self.last_success_at = Some(Utc::now());
                self.last_error = None;
                self.last_report = serde_json::to_value(report).ok();
            }
            Err(e) => {
                self.failures += 1;
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Disabled subsystems never hold readiness back.
    fn is_ready(&self) -> bool {
        !self.enabled || self.cycles > 0
    }
}

/// Shared, lock-protected view of both subsystems.
#[derive(Debug, Default)]
pub struct StatusBoard {
    track_work: Mutex<SubsystemStatus>,
    train_locations: Mutex<SubsystemStatus>,
}

impl StatusBoard {
    pub fn new(track_work_enabled: bool, train_locations_enabled: bool) -> Self {
        Self {
            track_work: Mutex::new(SubsystemStatus {
                enabled: track_work_enabled,
                ..Default::default()
            }),
            train_locations: Mutex::new(SubsystemStatus {
                enabled: train_locations_enabled,
                ..Default::default()
            }),
        }
    }

    pub fn record_sync(&self, result: &Result<SyncReport, SyncError>) {
        self.track_work.lock().record(result);
    }

    pub fn record_tick(&self, result: &Result<TickReport, TickError>) {
        self.train_locations.lock().record(result);
    }

    pub fn is_ready(&self) -> bool {
        self.track_work.lock().is_ready() && self.train_locations.lock().is_ready()
    }

    pub fn track_work(&self) -> SubsystemStatus {
        self.track_work.lock().clone()
    }

    pub fn train_locations(&self) -> SubsystemStatus {
        self.train_locations.lock().clone()
    }
}

pub fn router(board: Arc<StatusBoard>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(board)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

async fn ready_check(State(board): State<Arc<StatusBoard>>) -> impl IntoResponse {
    if board.is_ready() {
        (StatusCode::OK, Json(json!({"status": "ready"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "starting"})),
        )
    }
}

async fn status(State(board): State<Arc<StatusBoard>>) -> impl IntoResponse {
    Json(json!({
        "ready": board.is_ready(),
        "track_work": board.track_work(),
        "train_locations": board.train_locations(),
    }))
}
