use actix_web::{web, HttpResponse, Result};

use super::models::{GrantOutcome, GrantRequest, RevokeRequest, SharingGrant};
use crate::error::{ApiResponse, AppError};
use crate::identity::CurrentUser;
use crate::policy;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(grant_share)
        .service(revoke_share)
        .service(shared_with_me);
}

/// 共享影像给另一位医生 / Share an image with another doctor
#[utoipa::path(
    post,
    path = "/sharing/grant",
    tag = "Sharing",
    request_body = GrantRequest,
    responses(
        (status = 201, description = "grant created", body = GrantOutcome),
        (status = 200, description = "active grant already existed", body = GrantOutcome),
        (status = 403, description = "not permitted"),
        (status = 404, description = "image not found"),
        (status = 409, description = "re-share cycle or depth limit"),
        (status = 422, description = "target is not a doctor"),
    )
)]
#[actix_web::post("/sharing/grant")]
pub async fn grant_share(
    state: web::Data<AppState>,
    user: CurrentUser,
    body: web::Json<GrantRequest>,
) -> Result<HttpResponse, AppError> {
    let req = body.into_inner();
    let target = req.target_doctor_id.trim();
    let image = req.image_record_id.trim();
    if target.is_empty() {
        return Err(AppError::validation("targetDoctorId", "must not be empty"));
    }
    if image.is_empty() {
        return Err(AppError::validation("imageRecordId", "must not be empty"));
    }
    let outcome = state.ledger.grant_share(&user, target, image).await?;
    let mut builder = if outcome.created {
        HttpResponse::Created()
    } else {
        HttpResponse::Ok()
    };
    Ok(builder.json(ApiResponse::success(outcome)))
}

/// 撤销共享（仅发起人）/ Revoke a share; source doctor only
#[utoipa::path(
    post,
    path = "/sharing/revoke",
    tag = "Sharing",
    request_body = RevokeRequest,
    responses(
        (status = 200, description = "grant inactive", body = SharingGrant),
        (status = 403, description = "not permitted"),
        (status = 404, description = "grant not found"),
    )
)]
#[actix_web::post("/sharing/revoke")]
pub async fn revoke_share(
    state: web::Data<AppState>,
    user: CurrentUser,
    body: web::Json<RevokeRequest>,
) -> Result<HttpResponse, AppError> {
    let grant = state.ledger.revoke_share(&user, body.grant_id.trim()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(grant)))
}

/// 共享给我的影像 / Images shared with the caller
#[utoipa::path(
    get,
    path = "/sharing/shared-with-me",
    tag = "Sharing",
    responses(
        (status = 200, description = "active grants with their image records"),
        (status = 403, description = "not permitted"),
    )
)]
#[actix_web::get("/sharing/shared-with-me")]
pub async fn shared_with_me(state: web::Data<AppState>, user: CurrentUser) -> Result<HttpResponse, AppError> {
    if !policy::can_list_shared(&user) {
        return Err(AppError::NotAuthorized);
    }
    let shared = state.ledger.list_shared_with_details(&user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(shared)))
}
