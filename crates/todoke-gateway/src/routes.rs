//! API route handlers for the gateway.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use std::sync::Arc;

use super::server::AppState;

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "todoke-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// System information endpoint.
pub async fn system_info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let uptime = state.start_time.elapsed();
    Json(serde_json::json!({
        "service": "todoke",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        "uptime_secs": uptime.as_secs(),
        "scheduler": {
            "check_interval_secs": state.scheduler_config.check_interval_secs,
            "max_concurrent_sends": state.scheduler_config.max_concurrent_sends,
            "send_timeout_secs": state.scheduler_config.send_timeout_secs,
        },
    }))
}

/// Manual delivery trigger — runs the identical reconciliation algorithm
/// as the interval loop, synchronously, and reports the summary.
///
/// Internal completion is always HTTP 200 (including zero deliveries);
/// only a structural failure (the run itself could not scan the store)
/// returns 500, with the error in the body.
pub async fn trigger_delivery_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.engine.run(Utc::now()).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": format!(
                    "Checked {} campaign(s), processed {} delivery(ies)",
                    summary.checked_campaigns, summary.processed_deliveries
                ),
                "checkedCampaigns": summary.checked_campaigns,
                "processedDeliveries": summary.processed_deliveries,
            })),
        ),
        Err(e) => {
            tracing::error!("Manual delivery check failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "message": e.to_string(),
                    "checkedCampaigns": 0,
                    "processedDeliveries": 0,
                })),
            )
        }
    }
}

/// Read-only delivery status for a campaign's submissions (ops view).
pub async fn campaign_submissions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.list_by_campaign(&id) {
        Ok(submissions) => {
            let rows: Vec<_> = submissions
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "id": s.id,
                        "submittedAt": s.submitted_at.to_rfc3339(),
                        "deliveryChoice": s.delivery_choice.map(|c| c.as_str()),
                        "delivered": s.delivered,
                        "deliveredAt": s.delivered_at,
                        "actualDeliveredAt": s.actual_delivered_at.map(|t| t.to_rfc3339()),
                    })
                })
                .collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({ "success": true, "submissions": rows })),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "success": false, "message": e.to_string() })),
        ),
    }
}
