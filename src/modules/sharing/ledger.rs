//! 共享台账：医生之间的影像可见性授权
//! Sharing ledger: doctor-to-doctor image visibility grants

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{AccessVia, GrantOutcome, ImageAccess, NewGrant, SharedImage, SharingGrant};
use crate::conf::SharingSettings;
use crate::identity::{CurrentUser, Role};
use crate::modules::directory::models::ImageRecord;
use crate::modules::directory::TenantDirectory;
use crate::modules::notification::models::{Category, NewNotification, NotificationType, Priority};
use crate::modules::notification::NotificationService;
use crate::policy;
use crate::store::{GrantRepo, HospitalDirectory, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("not permitted")]
    NotAuthorized,
    #[error("影像不存在: {image_id}")]
    ImageNotFound { image_id: String },
    #[error("共享授权不存在: {grant_id}")]
    GrantNotFound { grant_id: String },
    #[error("共享目标不是医生: {target}")]
    TargetNotADoctor { target: String },
    #[error("不能共享给自己")]
    SelfShare,
    #[error("共享会形成环: {target} 已可访问该影像")]
    ShareCycle { target: String },
    #[error("转授层数超过上限 {max}")]
    ReshareLimit { max: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SharingLedger {
    grants: Arc<dyn GrantRepo>,
    users: Arc<dyn HospitalDirectory>,
    directory: Arc<TenantDirectory>,
    notifications: Arc<NotificationService>,
    settings: SharingSettings,
}

impl SharingLedger {
    pub fn new(
        grants: Arc<dyn GrantRepo>,
        users: Arc<dyn HospitalDirectory>,
        directory: Arc<TenantDirectory>,
        notifications: Arc<NotificationService>,
        settings: SharingSettings,
    ) -> Self {
        Self {
            grants,
            users,
            directory,
            notifications,
            settings,
        }
    }

    /// 授予共享；对已存在的活动授权幂等
    /// Grant visibility; idempotent for an existing active pair
    ///
    /// 授权先落库，再创建通知；通知失败只记录日志。
    /// The grant is durable before its notification; a notification failure is only logged.
    pub async fn grant_share(
        &self,
        source: &CurrentUser,
        target_doctor_id: &str,
        image_id: &str,
    ) -> Result<GrantOutcome, LedgerError> {
        if !policy::can_grant_share(source) {
            return Err(LedgerError::NotAuthorized);
        }
        if source.id == target_doctor_id {
            return Err(LedgerError::SelfShare);
        }
        let image = self.image(image_id).await?;
        let target_role = self.users.user_role(target_doctor_id).await?;
        if !policy::can_receive_share(target_role) {
            return Err(LedgerError::TargetNotADoctor {
                target: target_doctor_id.to_string(),
            });
        }

        let new_grant = match self.access_of(&source.id, &image).await? {
            Some(AccessVia::Native) => NewGrant {
                image_record_id: image.id.clone(),
                source_doctor_id: source.id.clone(),
                target_doctor_id: target_doctor_id.to_string(),
                origin_doctor_id: source.id.clone(),
                depth: 0,
            },
            Some(AccessVia::Grant(parent)) => self.reshare(source, target_doctor_id, &image, &parent).await?,
            None => return Err(LedgerError::NotAuthorized),
        };

        let (grant, created) = self.grants.activate_grant(new_grant, Utc::now()).await?;
        if created {
            info!(
                grant_id = %grant.id,
                image = %grant.image_record_id,
                source = %grant.source_doctor_id,
                target = %grant.target_doctor_id,
                depth = grant.depth,
                "🤝 image shared"
            );
            self.notify_target(&grant).await;
        }
        Ok(GrantOutcome { grant, created })
    }

    /// 发起人或共享链源头可撤销；已失效的授权直接返回
    /// The source or the chain's origin may revoke; an inactive grant is returned unchanged
    ///
    /// 由被撤销者转授出去的下游授权一并失效。
    /// Re-shares that hang off the revoked grant are deactivated with it.
    pub async fn revoke_share(&self, actor: &CurrentUser, grant_id: &str) -> Result<SharingGrant, LedgerError> {
        let grant = self
            .grants
            .find_grant(grant_id)
            .await?
            .ok_or_else(|| LedgerError::GrantNotFound {
                grant_id: grant_id.to_string(),
            })?;
        if !policy::can_revoke(actor, &grant) {
            return Err(LedgerError::NotAuthorized);
        }
        if !grant.active {
            return Ok(grant);
        }
        let now = Utc::now();
        if self.grants.deactivate_grant(grant_id, now).await? {
            info!(grant_id, by = %actor.id, "🚫 share revoked");
        }
        let downstream = self.revoke_downstream(&grant, now).await?;
        if downstream > 0 {
            info!(grant_id, downstream, "🚫 downstream re-shares revoked");
        }
        Ok(SharingGrant {
            active: false,
            revoked_at: grant.revoked_at.or(Some(now)),
            ..grant
        })
    }

    /// 指向该医生的活动授权，最新在前 / Active grants targeting the doctor, newest first
    pub async fn list_shared_with(&self, doctor_id: &str) -> Result<Vec<SharingGrant>, LedgerError> {
        Ok(self.grants.list_active_for_target(doctor_id).await?)
    }

    /// 附带影像记录 / Same list with the image records attached
    pub async fn list_shared_with_details(&self, doctor_id: &str) -> Result<Vec<SharedImage>, LedgerError> {
        let grants = self.list_shared_with(doctor_id).await?;
        let mut out = Vec::with_capacity(grants.len());
        for grant in grants {
            let image = self.directory.find_image(&grant.image_record_id).await?;
            out.push(SharedImage { grant, image });
        }
        Ok(out)
    }

    /// 调用者能否访问影像（所属医院医生或持有活动授权）
    /// Whether the actor may reach an image: owner-hospital doctor or active grantee
    pub async fn authorize_image_access(&self, actor: &CurrentUser, image_id: &str) -> Result<ImageAccess, LedgerError> {
        let image = self.image(image_id).await?;
        if actor.role != Role::Doctor {
            return Err(LedgerError::NotAuthorized);
        }
        match self.access_of(&actor.id, &image).await? {
            Some(via) => Ok(ImageAccess { image, via }),
            None => Err(LedgerError::NotAuthorized),
        }
    }

    async fn image(&self, image_id: &str) -> Result<ImageRecord, LedgerError> {
        self.directory
            .find_image(image_id)
            .await?
            .ok_or_else(|| LedgerError::ImageNotFound {
                image_id: image_id.to_string(),
            })
    }

    async fn access_of(&self, doctor_id: &str, image: &ImageRecord) -> Result<Option<AccessVia>, LedgerError> {
        if self.is_native(doctor_id, image).await? {
            return Ok(Some(AccessVia::Native));
        }
        Ok(self
            .grants
            .find_active_grant(&image.id, doctor_id)
            .await?
            .map(AccessVia::Grant))
    }

    async fn is_native(&self, doctor_id: &str, image: &ImageRecord) -> Result<bool, LedgerError> {
        Ok(self
            .directory
            .doctor_hospital(doctor_id)
            .await?
            .is_some_and(|h| h == image.owner_hospital_id))
    }

    /// 转授：受配置开关与层数上限约束，禁止回授给源头或原生可访问者
    /// Re-share, bounded by the toggle and max depth; no cycles back to native access
    async fn reshare(
        &self,
        source: &CurrentUser,
        target_doctor_id: &str,
        image: &ImageRecord,
        parent: &SharingGrant,
    ) -> Result<NewGrant, LedgerError> {
        if !self.settings.allow_reshare {
            return Err(LedgerError::NotAuthorized);
        }
        let depth = parent.depth + 1;
        if depth > self.settings.max_reshare_depth {
            return Err(LedgerError::ReshareLimit {
                max: self.settings.max_reshare_depth,
            });
        }
        if target_doctor_id == parent.origin_doctor_id || self.is_native(target_doctor_id, image).await? {
            return Err(LedgerError::ShareCycle {
                target: target_doctor_id.to_string(),
            });
        }
        Ok(NewGrant {
            image_record_id: image.id.clone(),
            source_doctor_id: source.id.clone(),
            target_doctor_id: target_doctor_id.to_string(),
            origin_doctor_id: parent.origin_doctor_id.clone(),
            depth,
        })
    }

    /// 沿共享链向下失效同源转授 / Walk the chain below a revoked grant
    async fn revoke_downstream(&self, revoked: &SharingGrant, now: DateTime<Utc>) -> Result<usize, LedgerError> {
        let mut holders = vec![revoked.target_doctor_id.clone()];
        let mut count = 0;
        while let Some(holder) = holders.pop() {
            let children = self
                .grants
                .list_active_from_source(&revoked.image_record_id, &holder)
                .await?;
            for child in children {
                if child.origin_doctor_id != revoked.origin_doctor_id || child.depth <= revoked.depth {
                    continue;
                }
                if self.grants.deactivate_grant(&child.id, now).await? {
                    count += 1;
                    holders.push(child.target_doctor_id);
                }
            }
        }
        Ok(count)
    }

    async fn notify_target(&self, grant: &SharingGrant) {
        let mut n = NewNotification::new(
            grant.target_doctor_id.clone(),
            "Medical image shared with you",
            format!(
                "Doctor {} shared image {} with you",
                grant.source_doctor_id, grant.image_record_id
            ),
        );
        n.sender_id = Some(grant.source_doctor_id.clone());
        n.kind = NotificationType::Info;
        n.category = Category::Medical;
        n.priority = Priority::Medium;
        n.data = json!({ "grantId": grant.id, "imageRecordId": grant.image_record_id });
        if let Err(e) = self.notifications.create(n).await {
            warn!(grant_id = %grant.id, "⚠️ share recorded but notification failed: {}", e);
        }
    }
}
