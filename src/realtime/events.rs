use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::modules::notification::models::Notification;

/// 通知生命周期事件 / Notification lifecycle events pushed to recipients
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Notification(Notification),
    NotificationRead { id: String },
    NotificationDeleted { id: String },
    AllNotificationsRead { count: u64 },
    /// 加入时下发，用于客户端对账 / Sent on join so clients can reconcile
    UnreadCount { unread: u64 },
}

impl NotificationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NotificationEvent::Notification(_) => "notification",
            NotificationEvent::NotificationRead { .. } => "notification_read",
            NotificationEvent::NotificationDeleted { .. } => "notification_deleted",
            NotificationEvent::AllNotificationsRead { .. } => "all_notifications_read",
            NotificationEvent::UnreadCount { .. } => "unread_count",
        }
    }

    pub fn data(&self) -> Value {
        match self {
            NotificationEvent::Notification(n) => serde_json::to_value(n).unwrap_or(Value::Null),
            NotificationEvent::NotificationRead { id } | NotificationEvent::NotificationDeleted { id } => {
                json!({ "id": id })
            }
            NotificationEvent::AllNotificationsRead { count } => json!({ "count": count }),
            NotificationEvent::UnreadCount { unread } => json!({ "unread": unread }),
        }
    }
}

/// 服务端下行帧 / Server to client frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerFrame {
    pub event: String,
    /// 每用户单调递增；未加入前为 0 / Per-user monotonic; 0 before join
    pub seq: u64,
    pub data: Value,
}

impl ServerFrame {
    pub fn new(event: impl Into<String>, seq: u64, data: Value) -> Self {
        Self {
            event: event.into(),
            seq,
            data,
        }
    }
}

/// 客户端上行帧 / Client to server frame
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join {
        #[serde(rename = "userId")]
        user_id: String,
    },
    Leave,
    Ping,
}
