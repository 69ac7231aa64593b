//! 内存存储后端
//! In-memory backend
//!
//! 每个聚合一把 `parking_lot::RwLock`，写操作在单次加锁内完成，
//! 因此"检查后插入"与批量已读都是原子的。
//! One `parking_lot::RwLock` per aggregate; every write completes under a
//! single lock so check-then-insert and bulk mark-read are atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use super::{
    GrantRepo, HospitalDirectory, ImageRecordRepo, NotificationRepo, StoreError, StoreResult,
};
use crate::comm::pagination::{offset, Page};
use crate::conf::DirectorySettings;
use crate::identity::Role;
use crate::modules::directory::models::ImageRecord;
use crate::modules::notification::models::{Notification, NotificationStats};
use crate::modules::notification::query::NotificationQuery;
use crate::modules::sharing::models::{NewGrant, SharingGrant};

#[derive(Debug, Clone)]
struct UserEntry {
    role: Role,
    hospital_id: Option<String>,
}

/// 内存存储 / Memory store implementing every repository trait
#[derive(Debug, Default)]
pub struct MemoryStore {
    hospitals: RwLock<HashMap<String, Option<String>>>,
    users: RwLock<HashMap<String, UserEntry>>,
    images: RwLock<HashMap<String, ImageRecord>>,
    grants: RwLock<HashMap<String, SharingGrant>>,
    notifications: RwLock<HashMap<String, Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用配置中的目录种子初始化 / Seed from the directory section
    pub fn from_seed(seed: &DirectorySettings) -> StoreResult<Self> {
        let store = Self::new();
        for h in &seed.hospitals {
            store.add_hospital(&h.id, h.imaging_endpoint.as_deref());
        }
        for u in &seed.users {
            let role = u
                .role
                .parse::<Role>()
                .map_err(|e| StoreError::Corrupt(format!("user {}: {}", u.id, e)))?;
            store.add_user(&u.id, role, u.hospital_id.as_deref());
        }
        for i in &seed.images {
            store.add_image(ImageRecord {
                id: i.id.clone(),
                owner_hospital_id: i.owner_hospital_id.clone(),
                archive_native_id: i.archive_native_id.clone(),
                medical_record_id: i.medical_record_id.clone(),
                description: i.description.clone(),
            });
        }
        debug!(
            hospitals = seed.hospitals.len(),
            users = seed.users.len(),
            images = seed.images.len(),
            "memory directory seeded"
        );
        Ok(store)
    }

    pub fn add_hospital(&self, hospital_id: &str, endpoint: Option<&str>) {
        self.hospitals
            .write()
            .insert(hospital_id.to_string(), endpoint.map(str::to_string));
    }

    pub fn add_user(&self, user_id: &str, role: Role, hospital_id: Option<&str>) {
        self.users.write().insert(
            user_id.to_string(),
            UserEntry {
                role,
                hospital_id: hospital_id.map(str::to_string),
            },
        );
    }

    pub fn add_image(&self, record: ImageRecord) {
        self.images.write().insert(record.id.clone(), record);
    }

    /// 审计视图：某影像的全部授权（含已撤销）/ Audit view including revoked rows
    pub fn grants_for_image(&self, image_id: &str) -> Vec<SharingGrant> {
        let mut rows: Vec<_> = self
            .grants
            .read()
            .values()
            .filter(|g| g.image_record_id == image_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rows
    }

    fn visible<'a>(
        rows: &'a HashMap<String, Notification>,
        recipient_id: &'a str,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a Notification> + 'a {
        rows.values()
            .filter(move |n| n.recipient_id == recipient_id && !n.is_expired(now))
    }
}

#[async_trait]
impl HospitalDirectory for MemoryStore {
    async fn hospital_endpoint(&self, hospital_id: &str) -> StoreResult<Option<String>> {
        Ok(self.hospitals.read().get(hospital_id).cloned().flatten())
    }

    async fn doctor_hospital(&self, doctor_id: &str) -> StoreResult<Option<String>> {
        Ok(self
            .users
            .read()
            .get(doctor_id)
            .filter(|u| u.role == Role::Doctor)
            .and_then(|u| u.hospital_id.clone()))
    }

    async fn user_role(&self, user_id: &str) -> StoreResult<Option<Role>> {
        Ok(self.users.read().get(user_id).map(|u| u.role))
    }
}

#[async_trait]
impl ImageRecordRepo for MemoryStore {
    async fn find_image(&self, id: &str) -> StoreResult<Option<ImageRecord>> {
        Ok(self.images.read().get(id).cloned())
    }

    async fn insert_image(&self, record: &ImageRecord) -> StoreResult<()> {
        let mut images = self.images.write();
        if images.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("image {} already exists", record.id)));
        }
        images.insert(record.id.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl GrantRepo for MemoryStore {
    async fn activate_grant(&self, grant: NewGrant, now: DateTime<Utc>) -> StoreResult<(SharingGrant, bool)> {
        let mut grants = self.grants.write();
        if let Some(existing) = grants.values().find(|g| {
            g.active
                && g.image_record_id == grant.image_record_id
                && g.target_doctor_id == grant.target_doctor_id
        }) {
            return Ok((existing.clone(), false));
        }
        let row = grant.into_grant(now);
        grants.insert(row.id.clone(), row.clone());
        Ok((row, true))
    }

    async fn find_grant(&self, id: &str) -> StoreResult<Option<SharingGrant>> {
        Ok(self.grants.read().get(id).cloned())
    }

    async fn find_active_grant(&self, image_id: &str, target_doctor_id: &str) -> StoreResult<Option<SharingGrant>> {
        Ok(self
            .grants
            .read()
            .values()
            .find(|g| g.active && g.image_record_id == image_id && g.target_doctor_id == target_doctor_id)
            .cloned())
    }

    async fn deactivate_grant(&self, id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut grants = self.grants.write();
        match grants.get_mut(id) {
            Some(g) if g.active => {
                g.active = false;
                g.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_active_for_target(&self, target_doctor_id: &str) -> StoreResult<Vec<SharingGrant>> {
        let mut rows: Vec<_> = self
            .grants
            .read()
            .values()
            .filter(|g| g.active && g.target_doctor_id == target_doctor_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn list_active_from_source(&self, image_id: &str, source_doctor_id: &str) -> StoreResult<Vec<SharingGrant>> {
        Ok(self
            .grants
            .read()
            .values()
            .filter(|g| g.active && g.image_record_id == image_id && g.source_doctor_id == source_doctor_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationRepo for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.notifications
            .write()
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn find_notification(&self, id: &str) -> StoreResult<Option<Notification>> {
        Ok(self.notifications.read().get(id).cloned())
    }

    async fn mark_read(&self, id: &str, recipient_id: &str) -> StoreResult<bool> {
        let mut rows = self.notifications.write();
        match rows.get_mut(id) {
            Some(n) if n.recipient_id == recipient_id => {
                n.read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, recipient_id: &str) -> StoreResult<u64> {
        let mut rows = self.notifications.write();
        let mut updated = 0;
        for n in rows.values_mut() {
            if n.recipient_id == recipient_id && !n.read {
                n.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_notification(&self, id: &str, recipient_id: &str) -> StoreResult<bool> {
        let mut rows = self.notifications.write();
        if rows.get(id).is_some_and(|n| n.recipient_id == recipient_id) {
            rows.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn list_notifications(
        &self,
        recipient_id: &str,
        query: &NotificationQuery,
        now: DateTime<Utc>,
    ) -> StoreResult<Page<Notification>> {
        let rows = self.notifications.read();
        let mut matched: Vec<Notification> = Self::visible(&rows, recipient_id, now)
            .filter(|n| query.filters.matches(n))
            .cloned()
            .collect();
        drop(rows);

        matched.sort_by(|a, b| query.sort.compare(a, b));
        let total = matched.len() as u64;
        let skip = usize::try_from(offset(query.page, query.per_page)).unwrap_or(usize::MAX);
        let items = matched
            .into_iter()
            .skip(skip)
            .take(query.per_page as usize)
            .collect();
        Ok(Page::new(items, query.page, query.per_page, total))
    }

    async fn notification_stats(&self, recipient_id: &str, now: DateTime<Utc>) -> StoreResult<NotificationStats> {
        let rows = self.notifications.read();
        let mut stats = NotificationStats::default();
        for n in Self::visible(&rows, recipient_id, now) {
            stats.total += 1;
            if !n.read {
                stats.unread += 1;
            }
            if n.priority.is_high() {
                stats.high_priority += 1;
            }
            if n.action_required {
                stats.action_required += 1;
            }
            *stats.by_category.entry(n.category).or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut rows = self.notifications.write();
        let before = rows.len();
        rows.retain(|_, n| !n.is_expired(now));
        Ok((before - rows.len()) as u64)
    }
}
