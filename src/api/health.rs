use actix_web::{web, HttpResponse, Result};
use futures_util::future::join_all;
use serde_json::json;

use crate::comm::HealthStatus;
use crate::error::AppError;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check);
}

/// 汇总各组件健康状态 / Aggregate component health
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "every component healthy"),
        (status = 503, description = "at least one component unhealthy"),
    )
)]
#[actix_web::get("/health")]
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let components: Vec<HealthStatus> =
        join_all(state.health_checks.iter().map(|check| check.check_health())).await;
    let healthy = components.iter().all(|c| c.healthy);
    let mut builder = if healthy {
        HttpResponse::Ok()
    } else {
        HttpResponse::ServiceUnavailable()
    };
    Ok(builder.json(json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "service": "imaging-hub",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "components": components,
    })))
}
