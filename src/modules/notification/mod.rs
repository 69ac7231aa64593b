/// 通知模块 / Notification module
pub mod models;
pub mod query;
pub mod routes;
pub mod service;

pub use service::{NotificationError, NotificationService};

use crate::route_registry::{RouteInfo, RouteRegistry};

/// 注册通知模块的路由 / Register the notification routes
pub fn register_notification_routes(registry: &mut RouteRegistry) {
    registry.register_route(RouteInfo {
        name: "notifications".to_string(),
        description: "paginated inbox, read state and stats".to_string(),
        module: "notification".to_string(),
        config_fn: routes::configure,
    });
}
