use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::modules::directory::models::ImageRecord;

/// 共享授权 / A sharing grant
///
/// 撤销只置 `active = false`，行永远保留用于审计。
/// Revocation only clears `active`; rows are kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SharingGrant {
    pub id: String,
    pub image_record_id: String,
    pub source_doctor_id: String,
    pub target_doctor_id: String,
    /// 原始授权人（转授时不等于 source）/ First owner-side grantor
    pub origin_doctor_id: String,
    /// 转授层数，原始授权为 0 / Re-share depth, 0 for an owner grant
    pub depth: u32,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// 待写入的授权 / A grant about to be recorded
#[derive(Debug, Clone)]
pub struct NewGrant {
    pub image_record_id: String,
    pub source_doctor_id: String,
    pub target_doctor_id: String,
    pub origin_doctor_id: String,
    pub depth: u32,
}

impl NewGrant {
    pub fn into_grant(self, now: DateTime<Utc>) -> SharingGrant {
        SharingGrant {
            id: uuid::Uuid::new_v4().to_string(),
            image_record_id: self.image_record_id,
            source_doctor_id: self.source_doctor_id,
            target_doctor_id: self.target_doctor_id,
            origin_doctor_id: self.origin_doctor_id,
            depth: self.depth,
            created_at: now,
            revoked_at: None,
            active: true,
        }
    }
}

/// 授权结果 / Result of a grant call
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrantOutcome {
    pub grant: SharingGrant,
    /// false 表示已存在活动授权（幂等）/ false when an active grant already existed
    pub created: bool,
}

/// 调用者对影像的访问方式 / How the actor reaches an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessVia {
    /// 所属医院的医生 / Doctor of the owner hospital
    Native,
    /// 通过活动授权 / Through an active grant
    Grant(SharingGrant),
}

#[derive(Debug, Clone)]
pub struct ImageAccess {
    pub image: ImageRecord,
    pub via: AccessVia,
}

/// 共享给我的影像 / An image shared with the caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedImage {
    pub grant: SharingGrant,
    pub image: Option<ImageRecord>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub target_doctor_id: String,
    pub image_record_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub grant_id: String,
}
