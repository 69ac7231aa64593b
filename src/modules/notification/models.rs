use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// 通知类型 / Notification type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
}

/// 通知分类 / Notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Medical,
    Appointment,
    Prescription,
    Administrative,
    System,
}

/// 优先级 / Priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn is_high(&self) -> bool {
        matches!(self, Priority::High | Priority::Urgent)
    }
}

// 数据库与查询串使用同一套大写编码 / Same upper-case codes for db and query strings
macro_rules! impl_code {
    ($ty:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $code),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($code => Ok($ty::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($ty), other)),
                }
            }
        }
    };
}

impl_code!(NotificationType { Info => "INFO", Success => "SUCCESS", Warning => "WARNING", Error => "ERROR" });
impl_code!(Category {
    Medical => "MEDICAL",
    Appointment => "APPOINTMENT",
    Prescription => "PRESCRIPTION",
    Administrative => "ADMINISTRATIVE",
    System => "SYSTEM",
});
impl_code!(Priority { Low => "LOW", Medium => "MEDIUM", High => "HIGH", Urgent => "URGENT" });

/// 通知 / A notification row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub category: Category,
    pub priority: Priority,
    pub action_required: bool,
    pub read: bool,
    /// 关联资源（如授权 ID）/ Related resource references
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 新建通知 / Input for creating a notification
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type", default = "default_type")]
    pub kind: NotificationType,
    #[serde(default = "default_category")]
    pub category: Category,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub action_required: bool,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_type() -> NotificationType {
    NotificationType::Info
}

fn default_category() -> Category {
    Category::System
}

fn default_priority() -> Priority {
    Priority::Medium
}

impl NewNotification {
    pub fn new(recipient_id: impl Into<String>, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            sender_id: None,
            title: title.into(),
            message: message.into(),
            kind: default_type(),
            category: default_category(),
            priority: default_priority(),
            action_required: false,
            data: serde_json::Value::Null,
            expires_at: None,
        }
    }

    pub fn into_notification(self, now: DateTime<Utc>) -> Notification {
        Notification {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id: self.recipient_id,
            sender_id: self.sender_id,
            title: self.title,
            message: self.message,
            kind: self.kind,
            category: self.category,
            priority: self.priority,
            action_required: self.action_required,
            read: false,
            data: self.data,
            created_at: now,
            expires_at: self.expires_at,
        }
    }
}

/// 统计 / Per-recipient statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStats {
    pub total: u64,
    pub unread: u64,
    #[schema(value_type = Object)]
    pub by_category: BTreeMap<Category, u64>,
    pub high_priority: u64,
    pub action_required: u64,
}
