use actix_web::web;
use std::collections::BTreeMap;
use tracing::info;

/// 路由配置函数类型
pub type RouteConfigFn = fn(&mut web::ServiceConfig);

/// 路由信息结构
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub name: String,
    pub description: String,
    pub module: String,
    pub config_fn: RouteConfigFn,
}

/// 路由注册器，由启动器构造并持有，不再是全局单例
/// Route registry owned by the bootstrapper; no global instance
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    routes: BTreeMap<String, RouteInfo>,
}

impl RouteRegistry {
    /// 创建新的路由注册器
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部业务模块 / Register every feature module
    pub fn with_all_modules() -> Self {
        let mut registry = Self::new();
        registry.register_route(RouteInfo {
            name: "health".to_string(),
            description: "aggregated component health".to_string(),
            module: "core".to_string(),
            config_fn: crate::api::health::configure,
        });
        crate::modules::imaging::register_imaging_routes(&mut registry);
        crate::modules::sharing::register_sharing_routes(&mut registry);
        crate::modules::notification::register_notification_routes(&mut registry);
        registry
    }

    /// 注册路由，同名覆盖 / Register; a same-named entry is replaced
    pub fn register_route(&mut self, route_info: RouteInfo) {
        self.routes.insert(route_info.name.clone(), route_info);
    }

    /// 获取指定模块的路由
    pub fn get_routes_by_module(&self, module: &str) -> Vec<&RouteInfo> {
        self.routes
            .values()
            .filter(|route| route.module == module)
            .collect()
    }

    /// 配置所有路由到 ServiceConfig
    pub fn configure_all_routes(&self, cfg: &mut web::ServiceConfig) {
        for route_info in self.routes.values() {
            (route_info.config_fn)(cfg);
        }
    }

    /// 路由总数与模块列表 / (total, modules)
    pub fn get_stats(&self) -> (usize, Vec<String>) {
        let mut modules: Vec<String> = self.routes.values().map(|r| r.module.clone()).collect();
        modules.sort();
        modules.dedup();
        (self.routes.len(), modules)
    }

    /// 打印路由信息
    pub fn print_routes_info(&self) {
        let (total, modules) = self.get_stats();
        for module in &modules {
            let module_routes = self.get_routes_by_module(module);
            info!("📚 模块: {} ({} 个路由组)", module, module_routes.len());
            for route in module_routes {
                info!("  - {}: {}", route.name, route.description);
            }
        }
        info!("总计: {} 个路由组", total);
    }
}
