use actix_web::http::header::LINK;
use actix_web::{web, HttpResponse, Result};
use serde_json::json;

use super::models::NotificationStats;
use super::query::ListParams;
use crate::comm::pagination::build_link_header;
use crate::error::{ApiResponse, AppError};
use crate::identity::CurrentUser;
use crate::state::AppState;

/// 列表基础路径，用于 Link 头 / Base path used in Link headers
const LIST_PATH: &str = "/notifications";
const TOTAL_COUNT_HEADER: &str = "X-Total-Count";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_notifications)
        .service(notification_stats)
        .service(mark_all_read)
        .service(mark_read)
        .service(delete_notification);
}

/// 分页列出当前用户的通知 / Paginated inbox of the caller
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "Notifications",
    params(ListParams),
    responses(
        (status = 200, description = "one page, with Link and X-Total-Count headers"),
        (status = 400, description = "invalid filter or sort field"),
    )
)]
#[actix_web::get("/notifications")]
pub async fn list_notifications(
    state: web::Data<AppState>,
    user: CurrentUser,
    params: web::Query<ListParams>,
) -> Result<HttpResponse, AppError> {
    let params = params.into_inner();
    let passthrough = params.passthrough_query();
    let query = params
        .into_query(&state.settings.notifications)
        .map_err(|(field, message)| AppError::validation(field, message))?;
    let page = state.notifications.list(&user.id, &query).await?;
    let link = build_link_header(LIST_PATH, &passthrough, page.page, page.per_page, page.total);
    Ok(HttpResponse::Ok()
        .insert_header((LINK, link))
        .insert_header((TOTAL_COUNT_HEADER, page.total.to_string()))
        .json(ApiResponse::success(page)))
}

/// 通知统计 / Inbox statistics
#[utoipa::path(
    get,
    path = "/notifications/stats",
    tag = "Notifications",
    responses((status = 200, description = "counts by state and category", body = NotificationStats))
)]
#[actix_web::get("/notifications/stats")]
pub async fn notification_stats(state: web::Data<AppState>, user: CurrentUser) -> Result<HttpResponse, AppError> {
    let stats = state.notifications.stats(&user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

/// 全部标为已读 / Mark every notification read
#[utoipa::path(
    post,
    path = "/notifications/read-all",
    tag = "Notifications",
    responses((status = 200, description = "number of notifications updated"))
)]
#[actix_web::post("/notifications/read-all")]
pub async fn mark_all_read(state: web::Data<AppState>, user: CurrentUser) -> Result<HttpResponse, AppError> {
    let updated = state.notifications.mark_all_read(&user).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "updated": updated }))))
}

/// 标为已读 / Mark one notification read
#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = "Notifications",
    params(("id" = String, Path, description = "notification id")),
    responses(
        (status = 200, description = "notification read"),
        (status = 404, description = "notification not found"),
    )
)]
#[actix_web::post("/notifications/{id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    state.notifications.mark_read(&user, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "id": id, "read": true }))))
}

/// 删除通知（仅收件人）/ Delete a notification; recipient only
#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    tag = "Notifications",
    params(("id" = String, Path, description = "notification id")),
    responses(
        (status = 200, description = "notification deleted"),
        (status = 404, description = "notification not found"),
    )
)]
#[actix_web::delete("/notifications/{id}")]
pub async fn delete_notification(
    state: web::Data<AppState>,
    user: CurrentUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    state.notifications.delete(&user, &id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(json!({ "id": id, "deleted": true }))))
}
