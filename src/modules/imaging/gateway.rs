//! 影像网关：授权、端点解析、转发
//! Imaging gateway: authorize, resolve the endpoint, then forward
//!
//! 所有归属与角色检查都在发起网络调用之前完成。
//! Every ownership and role check happens before any network call.

use actix_web::web::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

use super::models::{ArchiveStatus, ImagingOp, OpBody, OpKind, OpMethod, OpRequest, RoutedResponse};
use super::path_guard::references_segment;
use super::router::AccessRouter;
use crate::error::AppError;
use crate::identity::CurrentUser;
use crate::modules::directory::TenantDirectory;
use crate::modules::sharing::models::{AccessVia, ImageAccess};
use crate::modules::sharing::{LedgerError, SharingLedger};
use crate::policy;

/// 上传目标路径 / Archive path receiving uploads
const UPLOAD_PATH: &str = "/instances";

pub struct ImagingGateway {
    directory: Arc<TenantDirectory>,
    ledger: Arc<SharingLedger>,
    router: Arc<AccessRouter>,
}

impl ImagingGateway {
    pub fn new(directory: Arc<TenantDirectory>, ledger: Arc<SharingLedger>, router: Arc<AccessRouter>) -> Self {
        Self {
            directory,
            ledger,
            router,
        }
    }

    pub fn router(&self) -> &AccessRouter {
        &self.router
    }

    /// 探测调用者所属医院（或兜底）的归档 / Probe the caller's archive
    pub async fn system(&self, actor: &CurrentUser) -> Result<ArchiveStatus, AppError> {
        let endpoint = self.directory.resolve_endpoint(Some(&actor.id), None).await?;
        Ok(self.router.probe(&endpoint).await?)
    }

    /// 通用代理 / Generic proxy
    pub async fn proxy(&self, actor: &CurrentUser, request: OpRequest) -> Result<RoutedResponse, AppError> {
        let method: OpMethod = request
            .method
            .parse()
            .map_err(|e: String| AppError::validation("method", e))?;
        self.router.check_path(&request.path)?;
        let image_id = non_empty(request.image_id.as_deref());
        let kind = request.kind.unwrap_or_else(|| OpKind::default_for(method));

        match image_id {
            Some(id) => {
                let access = self.image_access(actor, id).await?;
                if !policy::can_proxy_method(&access.via, method, kind) {
                    debug!(actor = %actor.id, method = %method, "grantee write refused");
                    return Err(AppError::NotAuthorized);
                }
                // 被授权者只能访问被共享的那一份影像 / A grantee reaches only the shared image
                if let AccessVia::Grant(grant) = &access.via {
                    if !references_segment(&request.path, &access.image.archive_native_id) {
                        debug!(
                            actor = %actor.id,
                            grant_id = %grant.id,
                            path = %request.path,
                            "path outside the shared image"
                        );
                        return Err(AppError::NotAuthorized);
                    }
                }
            }
            None if policy::can_proxy_unscoped(actor) => {}
            None => return Err(AppError::NotAuthorized),
        }

        let endpoint = self.directory.resolve_endpoint(Some(&actor.id), image_id).await?;
        let body = match request.body {
            Some(value) if !value.is_null() => OpBody::Json(value),
            _ => OpBody::Empty,
        };
        info!(
            actor = %actor.id,
            method = %method,
            path = %request.path,
            hospital = ?endpoint.hospital_id,
            source = ?endpoint.source,
            "📡 routing imaging operation"
        );
        let op = ImagingOp::new(kind, method, endpoint, request.path).with_body(body);
        Ok(self.router.route_operation(op).await?)
    }

    /// 上传二进制；带影像 ID 时仅所属医院医生可写入该归档
    /// Upload bytes; with an image id only owner-hospital doctors may write to that archive
    pub async fn upload(
        &self,
        actor: &CurrentUser,
        image_id: Option<&str>,
        data: Bytes,
        content_type: Option<String>,
    ) -> Result<RoutedResponse, AppError> {
        if data.is_empty() {
            return Err(AppError::validation("body", "upload body must not be empty"));
        }
        let image_id = non_empty(image_id);
        match image_id {
            Some(id) => {
                let access = self.image_access(actor, id).await?;
                if access.via != AccessVia::Native {
                    return Err(AppError::NotAuthorized);
                }
            }
            None if policy::can_proxy_unscoped(actor) => {}
            None => return Err(AppError::NotAuthorized),
        }

        let endpoint = self.directory.resolve_endpoint(Some(&actor.id), image_id).await?;
        info!(
            actor = %actor.id,
            bytes = data.len(),
            hospital = ?endpoint.hospital_id,
            "📤 uploading to imaging archive"
        );
        let op = ImagingOp::new(OpKind::UploadBinary, OpMethod::Post, endpoint, UPLOAD_PATH)
            .with_body(OpBody::Bytes { data, content_type });
        Ok(self.router.route_operation(op).await?)
    }

    /// 未知影像与无权访问对外一致 / An unknown image looks the same as a forbidden one
    async fn image_access(&self, actor: &CurrentUser, image_id: &str) -> Result<ImageAccess, AppError> {
        match self.ledger.authorize_image_access(actor, image_id).await {
            Ok(access) => Ok(access),
            Err(LedgerError::ImageNotFound { .. }) => Err(AppError::NotAuthorized),
            Err(e) => Err(e.into()),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
