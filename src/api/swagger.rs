use utoipa::OpenApi;

/// OpenAPI 文档聚合
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::health::health_check,
        crate::modules::imaging::routes::imaging_system,
        crate::modules::imaging::routes::imaging_op,
        crate::modules::imaging::routes::imaging_upload,
        crate::modules::sharing::routes::grant_share,
        crate::modules::sharing::routes::revoke_share,
        crate::modules::sharing::routes::shared_with_me,
        crate::modules::notification::routes::list_notifications,
        crate::modules::notification::routes::notification_stats,
        crate::modules::notification::routes::mark_all_read,
        crate::modules::notification::routes::mark_read,
        crate::modules::notification::routes::delete_notification,
    ),
    components(
        schemas(
            crate::modules::imaging::models::OpRequest,
            crate::modules::imaging::models::OpKind,
            crate::modules::imaging::models::ArchiveStatus,
            crate::modules::imaging::models::ErrorEnvelope,
            crate::modules::sharing::models::SharingGrant,
            crate::modules::sharing::models::GrantOutcome,
            crate::modules::sharing::models::GrantRequest,
            crate::modules::sharing::models::RevokeRequest,
            crate::modules::notification::models::Notification,
            crate::modules::notification::models::NotificationStats,
            crate::modules::notification::models::NotificationType,
            crate::modules::notification::models::Category,
            crate::modules::notification::models::Priority,
        )
    ),
    tags(
        (name = "Health", description = "组件健康检查 / Component health"),
        (name = "Imaging", description = "影像归档代理 / Imaging archive proxy"),
        (name = "Sharing", description = "医生间影像共享 / Doctor-to-doctor image sharing"),
        (name = "Notifications", description = "通知收件箱 / Notification inbox"),
    )
)]
pub struct ApiDoc;
