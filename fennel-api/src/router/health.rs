use crate::app::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// 健康检查：渠道快照、调度器状态与数据库连通性
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let balancer = state.load_balancer.balancer();
    let channels = balancer.channels();
    let enabled = channels.iter().filter(|c| c.is_enabled()).count();
    let scheduler = state.load_balancer.scheduler().state();

    let (database, healthy) = match &state.database {
        None => ("not_configured", true),
        Some(db) => match db.ping().await {
            Ok(true) => ("ok", true),
            Ok(false) => ("unavailable", false),
            Err(e) => {
                tracing::warn!("Database ping failed: {}", e);
                ("unavailable", false)
            }
        },
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "channels": {
                "total": channels.len(),
                "enabled": enabled
            },
            "scheduler": scheduler.as_str(),
            "database": database
        })),
    )
}
