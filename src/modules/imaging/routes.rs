use actix_web::http::header::CONTENT_TYPE;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use futures_util::StreamExt;

use super::models::{ArchiveStatus, ErrorEnvelope, OpRequest, RoutedResponse, UploadParams};
use crate::error::{ApiResponse, AppError};
use crate::identity::CurrentUser;
use crate::state::AppState;

/// 上传体积上限 / Upload size cap
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
        .service(imaging_system)
        .service(imaging_op)
        .service(imaging_upload);
}

/// 归档探活 / Archive liveness passthrough
#[utoipa::path(
    get,
    path = "/imaging/system",
    tag = "Imaging",
    responses(
        (status = 200, description = "archive reachable", body = ArchiveStatus),
        (status = 503, description = "archive unreachable"),
        (status = 504, description = "archive timed out"),
    )
)]
#[actix_web::get("/imaging/system")]
pub async fn imaging_system(state: web::Data<AppState>, user: CurrentUser) -> Result<HttpResponse, AppError> {
    let status = state.gateway.system(&user).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(status)))
}

/// 通用归档代理 / Generic archive proxy
#[utoipa::path(
    post,
    path = "/imaging/op",
    tag = "Imaging",
    request_body = OpRequest,
    responses(
        (status = 200, description = "archive JSON or binary passthrough"),
        (status = 403, description = "not permitted"),
        (status = 500, description = "imaging endpoint not configured"),
        (status = 502, description = "archive rejected the request", body = ErrorEnvelope),
        (status = 503, description = "archive unreachable"),
        (status = 504, description = "archive timed out"),
    )
)]
#[actix_web::post("/imaging/op")]
pub async fn imaging_op(
    state: web::Data<AppState>,
    user: CurrentUser,
    body: web::Json<OpRequest>,
) -> Result<HttpResponse, AppError> {
    let routed = state.gateway.proxy(&user, body.into_inner()).await?;
    Ok(into_http(routed))
}

/// 上传原始字节 / Upload raw bytes
#[utoipa::path(
    post,
    path = "/imaging/instances",
    tag = "Imaging",
    params(UploadParams),
    request_body(content = String, content_type = "application/octet-stream", description = "raw instance bytes"),
    responses(
        (status = 200, description = "archive accepted the upload"),
        (status = 403, description = "not permitted"),
    )
)]
#[actix_web::post("/imaging/instances")]
pub async fn imaging_upload(
    state: web::Data<AppState>,
    user: CurrentUser,
    req: HttpRequest,
    query: web::Query<UploadParams>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let routed = state
        .gateway
        .upload(&user, query.image_id.as_deref(), body, content_type)
        .await?;
    Ok(into_http(routed))
}

/// 保留上游状态码与内容类型 / Keep the upstream status and content type
fn into_http(routed: RoutedResponse) -> HttpResponse {
    let status = StatusCode::from_u16(routed.status()).unwrap_or(StatusCode::OK);
    match routed {
        RoutedResponse::Json { body, .. } => HttpResponse::build(status).json(body),
        RoutedResponse::Stream {
            content_type,
            content_length,
            stream,
            ..
        } => {
            let mut builder = HttpResponse::build(status);
            builder.content_type(content_type.unwrap_or_else(|| "application/octet-stream".to_string()));
            if let Some(len) = content_length {
                builder.no_chunking(len);
            }
            builder.streaming(stream.map(|chunk| chunk.map_err(AppError::from)))
        }
    }
}
