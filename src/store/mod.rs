//! 持久化仓库接口
//! Persistence repository contracts
//!
//! 关系型存储由外部持有，本模块只约定本核心需要的 CRUD。
//! 提供两种实现：内存（默认、测试）与 Postgres（sqlx）。
//! The relational store is owned externally; these traits are the CRUD this
//! core issues. Two backends: memory (default, tests) and Postgres (sqlx).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::comm::Page;
use crate::identity::Role;
use crate::modules::directory::models::ImageRecord;
use crate::modules::notification::models::{Notification, NotificationStats};
use crate::modules::notification::query::NotificationQuery;
use crate::modules::sharing::models::{NewGrant, SharingGrant};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// 存储错误 / Storage error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据损坏: {0}")]
    Corrupt(String),
    #[error("数据冲突: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 医院/医生目录（只读协作方）/ Hospital and doctor directory (read-only collaborator)
#[async_trait]
pub trait HospitalDirectory: Send + Sync {
    /// 医院影像端点 / `getHospitalEndpoint(hospitalId)`
    async fn hospital_endpoint(&self, hospital_id: &str) -> StoreResult<Option<String>>;
    /// 医生所属医院 / `getDoctorHospital(doctorId)`
    async fn doctor_hospital(&self, doctor_id: &str) -> StoreResult<Option<String>>;
    /// 用户角色 / Role of any user id
    async fn user_role(&self, user_id: &str) -> StoreResult<Option<Role>>;
}

#[async_trait]
pub trait ImageRecordRepo: Send + Sync {
    async fn find_image(&self, id: &str) -> StoreResult<Option<ImageRecord>>;
    async fn insert_image(&self, record: &ImageRecord) -> StoreResult<()>;
}

#[async_trait]
pub trait GrantRepo: Send + Sync {
    /// 若该 (影像, 目标医生) 已有活动授权则原样返回，否则写入新行。
    /// 返回 (授权, 是否新建)，检查与写入是原子的。
    /// Returns the existing active grant for the pair or records a new row;
    /// check and insert are atomic. The flag is true when a row was created.
    async fn activate_grant(&self, grant: NewGrant, now: DateTime<Utc>) -> StoreResult<(SharingGrant, bool)>;
    async fn find_grant(&self, id: &str) -> StoreResult<Option<SharingGrant>>;
    async fn find_active_grant(&self, image_id: &str, target_doctor_id: &str) -> StoreResult<Option<SharingGrant>>;
    /// 置为失效，返回是否发生变更 / Deactivate; true when the row changed
    async fn deactivate_grant(&self, id: &str, now: DateTime<Utc>) -> StoreResult<bool>;
    /// 目标医生的活动授权，最新在前 / Active grants for a target, newest first
    async fn list_active_for_target(&self, target_doctor_id: &str) -> StoreResult<Vec<SharingGrant>>;
    /// 某医生就某影像发出的活动授权 / Active grants a doctor issued for one image
    async fn list_active_from_source(&self, image_id: &str, source_doctor_id: &str) -> StoreResult<Vec<SharingGrant>>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;
    async fn find_notification(&self, id: &str) -> StoreResult<Option<Notification>>;
    /// 仅当 id 属于 recipient 时生效 / Only applies when `id` belongs to `recipient_id`
    async fn mark_read(&self, id: &str, recipient_id: &str) -> StoreResult<bool>;
    /// 单次原子批量更新，返回更新条数 / One atomic bulk update
    async fn mark_all_read(&self, recipient_id: &str) -> StoreResult<u64>;
    /// 仅当 id 属于 recipient 时删除 / Only deletes when owned by `recipient_id`
    async fn delete_notification(&self, id: &str, recipient_id: &str) -> StoreResult<bool>;
    async fn list_notifications(
        &self,
        recipient_id: &str,
        query: &NotificationQuery,
        now: DateTime<Utc>,
    ) -> StoreResult<Page<Notification>>;
    async fn notification_stats(&self, recipient_id: &str, now: DateTime<Utc>) -> StoreResult<NotificationStats>;
    /// 删除已过期通知 / Remove expired rows
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
