//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: CheckResult,
    pub relay: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn up(latency_ms: Option<u64>) -> Self {
        Self {
            status: "up".to_string(),
            latency_ms,
            error: None,
        }
    }

    fn down(error: String) -> Self {
        Self {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(error),
        }
    }
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: casedesk_common::VERSION,
    })
}

/// Readiness probe - checks all dependencies
///
/// The relay is informational; only the database decides readiness.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let start = std::time::Instant::now();

    let db_check = match &state.db {
        Some(db) => match db.ping().await {
            Ok(_) => CheckResult::up(Some(start.elapsed().as_millis() as u64)),
            Err(e) => CheckResult::down(e.to_string()),
        },
        None => CheckResult::up(None),
    };

    let relay_check = match state.relay {
        Some(_) => CheckResult::up(None),
        None => CheckResult::down("not configured".to_string()),
    };

    let all_healthy = db_check.status == "up";

    Json(ReadyResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks {
            database: db_check,
            relay: relay_check,
        },
    })
}
