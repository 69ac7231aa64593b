use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::modules::directory::DirectoryError;
use crate::modules::imaging::RouteError;
use crate::modules::notification::NotificationError;
use crate::modules::sharing::LedgerError;
use crate::realtime::DispatchError;
use crate::store::StoreError;

/// 授权失败时对外统一文案，不暴露资源是否存在
/// Generic outward message for every authorization failure
pub const NOT_PERMITTED: &str = "not permitted";

/// 统一的应用错误类型
#[derive(Error, Debug)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(#[from] crate::comm::config::ConfigError),

    #[error("认证错误: {message}")]
    Unauthenticated { message: String },

    #[error("not permitted")]
    NotAuthorized,

    #[error("验证错误: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("资源未找到: {resource}")]
    NotFound { resource: String },

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Imaging(#[from] RouteError),

    #[error(transparent)]
    Sharing(#[from] LedgerError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("内部错误: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// 创建认证错误
    pub fn unauthenticated<T: Into<String>>(message: T) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// 创建验证错误
    pub fn validation<T: Into<String>, U: Into<String>>(field: T, message: U) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建资源未找到错误
    pub fn not_found<T: Into<String>>(resource: T) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// 获取错误代码
    pub fn error_code(&self) -> i32 {
        match self {
            AppError::Internal(_) => 1000,
            AppError::Config(_) => 1001,
            AppError::Unauthenticated { .. } => 1002,
            AppError::NotAuthorized => 1003,
            AppError::Validation { .. } => 1004,
            AppError::Store(_) => 1006,
            AppError::NotFound { .. } => 1009,
            AppError::Directory(e) => match e {
                DirectoryError::EndpointUnresolved { .. } => 2001,
                DirectoryError::Store(_) => 1006,
            },
            AppError::Imaging(e) => match e {
                RouteError::Unavailable { .. } => 2002,
                RouteError::Timeout { .. } => 2003,
                RouteError::Rejected { .. } => 2004,
                RouteError::Transport { .. } => 2005,
                RouteError::InvalidRequest { .. } => 1004,
            },
            AppError::Sharing(e) => match e {
                LedgerError::NotAuthorized => 1003,
                LedgerError::ImageNotFound { .. } => 3001,
                LedgerError::GrantNotFound { .. } => 3002,
                LedgerError::TargetNotADoctor { .. } => 3003,
                LedgerError::SelfShare => 3004,
                LedgerError::ShareCycle { .. } => 3005,
                LedgerError::ReshareLimit { .. } => 3006,
                LedgerError::Store(_) => 1006,
            },
            AppError::Notification(e) => match e {
                NotificationError::NotFound { .. } => 4001,
                NotificationError::Validation { .. } => 1004,
                NotificationError::Store(_) => 1006,
            },
            AppError::Dispatch(_) => 5001,
        }
    }

    /// 获取HTTP状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Internal(_) | AppError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            AppError::NotAuthorized => StatusCode::FORBIDDEN,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Directory(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Imaging(e) => match e {
                RouteError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                RouteError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                RouteError::Rejected { status, .. } => StatusCode::from_u16(*status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                RouteError::Transport { .. } => StatusCode::BAD_GATEWAY,
                RouteError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            },
            AppError::Sharing(e) => match e {
                LedgerError::NotAuthorized => StatusCode::FORBIDDEN,
                LedgerError::ImageNotFound { .. } | LedgerError::GrantNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                LedgerError::TargetNotADoctor { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                LedgerError::SelfShare => StatusCode::BAD_REQUEST,
                LedgerError::ShareCycle { .. } | LedgerError::ReshareLimit { .. } => {
                    StatusCode::CONFLICT
                }
                LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Notification(e) => match e {
                NotificationError::NotFound { .. } => StatusCode::NOT_FOUND,
                NotificationError::Validation { .. } => StatusCode::BAD_REQUEST,
                NotificationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Dispatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 子系统标签 / Subsystem label carried in the envelope
    pub fn subsystem(&self) -> &'static str {
        match self {
            AppError::Imaging(_) => "imaging",
            AppError::Directory(_) => "directory",
            AppError::Sharing(_) => "sharing",
            AppError::Notification(_) => "notification",
            AppError::Dispatch(_) => "realtime",
            _ => "core",
        }
    }

    /// 错误类型名 / Variant name for the envelope
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Config(_) => "Config",
            AppError::Unauthenticated { .. } => "Unauthenticated",
            AppError::NotAuthorized => "NotAuthorized",
            AppError::Validation { .. } => "Validation",
            AppError::NotFound { .. } => "NotFound",
            AppError::Directory(DirectoryError::EndpointUnresolved { .. }) => "EndpointUnresolved",
            AppError::Imaging(e) => match e {
                RouteError::Unavailable { .. } => "UpstreamUnavailable",
                RouteError::Timeout { .. } => "UpstreamTimeout",
                RouteError::Rejected { .. } => "UpstreamRejected",
                RouteError::Transport { .. } => "UpstreamTransport",
                RouteError::InvalidRequest { .. } => "Validation",
            },
            AppError::Sharing(e) => match e {
                LedgerError::NotAuthorized => "NotAuthorized",
                LedgerError::ImageNotFound { .. } => "ImageNotFound",
                LedgerError::GrantNotFound { .. } => "NotFound",
                LedgerError::TargetNotADoctor { .. } => "TargetNotADoctor",
                LedgerError::SelfShare => "Validation",
                LedgerError::ShareCycle { .. } => "ShareCycle",
                LedgerError::ReshareLimit { .. } => "ReshareLimit",
                LedgerError::Store(_) => "Store",
            },
            AppError::Notification(NotificationError::NotFound { .. }) => "NotFound",
            AppError::Notification(NotificationError::Validation { .. }) => "Validation",
            AppError::Dispatch(_) => "Dispatch",
            AppError::Internal(_) => "Internal",
            AppError::Directory(DirectoryError::Store(_))
            | AppError::Notification(NotificationError::Store(_))
            | AppError::Store(_) => "Store",
        }
    }

    /// 对外文案：授权失败统一为 "not permitted"，存储细节不外泄
    /// Outward message; authorization failures and storage details are masked
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotAuthorized | AppError::Sharing(LedgerError::NotAuthorized) => {
                NOT_PERMITTED.to_string()
            }
            AppError::Directory(DirectoryError::EndpointUnresolved { .. }) => {
                "imaging endpoint not configured".to_string()
            }
            // 归档地址只写日志 / Archive URLs stay in the log
            AppError::Imaging(RouteError::Unavailable { .. }) => "imaging archive unavailable".to_string(),
            AppError::Imaging(RouteError::Timeout { .. }) => "imaging archive timed out".to_string(),
            AppError::Imaging(RouteError::Transport { .. }) => "imaging archive transport error".to_string(),
            AppError::Store(_)
            | AppError::Directory(DirectoryError::Store(_))
            | AppError::Sharing(LedgerError::Store(_))
            | AppError::Notification(NotificationError::Store(_))
            | AppError::Internal(_)
            | AppError::Config(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = AppError::status_code(self);
        let message = self.to_string();

        // 记录错误日志
        match self {
            AppError::Directory(DirectoryError::EndpointUnresolved { .. }) => {
                tracing::error!(subsystem = self.subsystem(), "Endpoint unresolved: {}", message);
            }
            AppError::Imaging(RouteError::InvalidRequest { .. }) => {
                tracing::info!(subsystem = "imaging", "Client error: {}", message);
            }
            AppError::Imaging(_) => {
                tracing::warn!(subsystem = "imaging", "Upstream error: {}", message);
            }
            _ if status.is_server_error() => {
                tracing::error!(subsystem = self.subsystem(), "Internal error: {}", message);
            }
            _ => {
                tracing::info!(subsystem = self.subsystem(), "Client error: {}", message);
            }
        }

        // 上游拒绝时透出归一化后的 {error, details}
        if let AppError::Imaging(RouteError::Rejected { status: upstream, envelope }) = self {
            return HttpResponse::build(status).json(json!({
                "success": false,
                "error": envelope.error,
                "details": envelope.details,
                "upstreamStatus": upstream,
                "subsystem": "imaging",
                "timestamp": chrono::Utc::now().to_rfc3339()
            }));
        }

        HttpResponse::build(status).json(json!({
            "success": false,
            "error": {
                "code": self.error_code(),
                "message": self.public_message(),
                "type": self.error_type(),
                "subsystem": self.subsystem()
            },
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))
    }
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 成功响应结构
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::imaging::models::ErrorEnvelope;
    use actix_web::body::to_bytes;

    #[test]
    fn test_upstream_failures_map_to_distinct_statuses() {
        let unavailable = AppError::from(RouteError::Unavailable {
            url: "http://pacs".into(),
            message: "refused".into(),
        });
        let timeout = AppError::from(RouteError::Timeout {
            url: "http://pacs".into(),
            after_ms: 10,
        });
        let rejected = AppError::from(RouteError::Rejected {
            status: 404,
            envelope: ErrorEnvelope::new("Unknown resource", serde_json::Value::Null),
        });
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(rejected.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_upstream_messages_hide_archive_url() {
        let unavailable = AppError::from(RouteError::Unavailable {
            url: "http://pacs-h1.internal:8042/instances/abc123".into(),
            message: "connection refused".into(),
        });
        let timeout = AppError::from(RouteError::Timeout {
            url: "http://pacs-h1.internal:8042/system".into(),
            after_ms: 800,
        });
        assert_eq!(unavailable.public_message(), "imaging archive unavailable");
        assert_eq!(timeout.public_message(), "imaging archive timed out");
        assert!(unavailable.to_string().contains("pacs-h1.internal"));
    }

    #[test]
    fn test_rejected_with_odd_status_becomes_bad_gateway() {
        let err = AppError::from(RouteError::Rejected {
            status: 302,
            envelope: ErrorEnvelope::new("moved", serde_json::Value::Null),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_endpoint_unresolved_is_server_error_with_code() {
        let err = AppError::from(DirectoryError::EndpointUnresolved {
            reason: "no rule matched".into(),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), 2001);
        assert_eq!(err.subsystem(), "directory");
    }

    #[test]
    fn test_sharing_errors() {
        assert_eq!(
            AppError::from(LedgerError::TargetNotADoctor { target: "p1".into() }).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        let denied = AppError::from(LedgerError::NotAuthorized);
        assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(denied.public_message(), NOT_PERMITTED);
    }

    #[actix_web::test]
    async fn test_envelope_carries_subsystem() {
        let err = AppError::from(NotificationError::NotFound { id: "n1".into() });
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"]["subsystem"], "notification");
        assert_eq!(v["error"]["code"], 4001);
    }

    #[actix_web::test]
    async fn test_rejected_body_is_normalized() {
        let err = AppError::from(RouteError::Rejected {
            status: 400,
            envelope: ErrorEnvelope::new("Bad file format", json!({"httpStatus": 400})),
        });
        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["error"], "Bad file format");
        assert_eq!(v["details"]["httpStatus"], 400);
        assert_eq!(v["subsystem"], "imaging");
    }
}
