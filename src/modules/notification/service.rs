//! 通知存储服务：持久化后推送实时事件
//! Notification store service: persist first, then push realtime events

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use super::models::{NewNotification, Notification, NotificationStats};
use super::query::NotificationQuery;
use crate::comm::Page;
use crate::identity::CurrentUser;
use crate::policy;
use crate::realtime::{Dispatcher, NotificationEvent};
use crate::store::{NotificationRepo, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// 不存在或不属于调用者，两者对外不可区分
    /// Missing or not owned by the caller; indistinguishable outward
    #[error("通知不存在: {id}")]
    NotFound { id: String },
    #[error("验证错误: {field}: {message}")]
    Validation { field: String, message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct NotificationService {
    repo: Arc<dyn NotificationRepo>,
    dispatcher: Arc<Dispatcher>,
}

impl NotificationService {
    pub fn new(repo: Arc<dyn NotificationRepo>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { repo, dispatcher }
    }

    /// 创建并推送给收件人的在线连接 / Create and push to the recipient's live connections
    pub async fn create(&self, new: NewNotification) -> Result<Notification, NotificationError> {
        if new.recipient_id.trim().is_empty() {
            return Err(validation("recipientId", "must not be empty"));
        }
        if new.title.trim().is_empty() {
            return Err(validation("title", "must not be empty"));
        }
        let notification = new.into_notification(Utc::now());
        self.repo.insert_notification(&notification).await?;
        let delivered = self.dispatcher.publish(
            &notification.recipient_id,
            &NotificationEvent::Notification(notification.clone()),
        );
        info!(
            id = %notification.id,
            recipient = %notification.recipient_id,
            category = %notification.category,
            delivered,
            "🔔 notification created"
        );
        Ok(notification)
    }

    pub async fn mark_read(&self, actor: &CurrentUser, id: &str) -> Result<(), NotificationError> {
        self.owned(actor, id).await?;
        if !self.repo.mark_read(id, &actor.id).await? {
            return Err(not_found(id));
        }
        self.dispatcher.publish(
            &actor.id,
            &NotificationEvent::NotificationRead { id: id.to_string() },
        );
        Ok(())
    }

    /// 单次批量更新；无未读时也安全 / One bulk update; safe with nothing unread
    pub async fn mark_all_read(&self, actor: &CurrentUser) -> Result<u64, NotificationError> {
        let count = self.repo.mark_all_read(&actor.id).await?;
        self.dispatcher
            .publish(&actor.id, &NotificationEvent::AllNotificationsRead { count });
        debug!(recipient = %actor.id, count, "all notifications read");
        Ok(count)
    }

    pub async fn delete(&self, actor: &CurrentUser, id: &str) -> Result<(), NotificationError> {
        self.owned(actor, id).await?;
        if !self.repo.delete_notification(id, &actor.id).await? {
            return Err(not_found(id));
        }
        self.dispatcher.publish(
            &actor.id,
            &NotificationEvent::NotificationDeleted { id: id.to_string() },
        );
        Ok(())
    }

    pub async fn list(
        &self,
        recipient_id: &str,
        query: &NotificationQuery,
    ) -> Result<Page<Notification>, NotificationError> {
        Ok(self
            .repo
            .list_notifications(recipient_id, query, Utc::now())
            .await?)
    }

    pub async fn stats(&self, recipient_id: &str) -> Result<NotificationStats, NotificationError> {
        Ok(self.repo.notification_stats(recipient_id, Utc::now()).await?)
    }

    pub async fn unread_count(&self, recipient_id: &str) -> Result<u64, NotificationError> {
        Ok(self.stats(recipient_id).await?.unread)
    }

    /// 删除过期通知 / Drop expired rows
    pub async fn purge_expired(&self) -> Result<u64, NotificationError> {
        Ok(self.repo.purge_expired(Utc::now()).await?)
    }

    async fn owned(&self, actor: &CurrentUser, id: &str) -> Result<Notification, NotificationError> {
        match self.repo.find_notification(id).await? {
            Some(n) if policy::can_mutate_notification(actor, &n) => Ok(n),
            Some(_) => {
                debug!(id, actor = %actor.id, "notification owned by someone else");
                Err(not_found(id))
            }
            None => Err(not_found(id)),
        }
    }
}

fn not_found(id: &str) -> NotificationError {
    NotificationError::NotFound { id: id.to_string() }
}

fn validation(field: &str, message: &str) -> NotificationError {
    NotificationError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use crate::store::MemoryStore;

    fn service() -> NotificationService {
        NotificationService::new(Arc::new(MemoryStore::new()), Arc::new(Dispatcher::new()))
    }

    #[tokio::test]
    async fn test_create_requires_title() {
        let svc = service();
        let err = svc.create(NewNotification::new("u1", "  ", "m")).await.unwrap_err();
        assert!(matches!(err, NotificationError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_foreign_mark_read_looks_missing() {
        let svc = service();
        let n = svc.create(NewNotification::new("u1", "t", "m")).await.unwrap();
        let other = CurrentUser::new("u2", Role::Doctor);
        assert!(matches!(
            svc.mark_read(&other, &n.id).await,
            Err(NotificationError::NotFound { .. })
        ));
        assert_eq!(svc.unread_count("u1").await.unwrap(), 1);
    }
}
