/// 共享模块 / Sharing module
pub mod ledger;
pub mod models;
pub mod routes;

pub use ledger::{LedgerError, SharingLedger};

use crate::route_registry::{RouteInfo, RouteRegistry};

/// 注册共享模块的路由 / Register the sharing routes
pub fn register_sharing_routes(registry: &mut RouteRegistry) {
    registry.register_route(RouteInfo {
        name: "sharing".to_string(),
        description: "grant, revoke and list image shares".to_string(),
        module: "sharing".to_string(),
        config_fn: routes::configure,
    });
}
