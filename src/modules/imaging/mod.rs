/// 影像模块：归档代理 / Imaging module: archive proxy
pub mod gateway;
pub mod models;
pub mod path_guard;
pub mod router;
pub mod routes;

pub use gateway::ImagingGateway;
pub use router::{AccessRouter, RouteError};

use crate::route_registry::{RouteInfo, RouteRegistry};

/// 注册影像模块的路由 / Register the imaging routes
pub fn register_imaging_routes(registry: &mut RouteRegistry) {
    registry.register_route(RouteInfo {
        name: "imaging".to_string(),
        description: "archive liveness, generic proxy and upload".to_string(),
        module: "imaging".to_string(),
        config_fn: routes::configure,
    });
}
