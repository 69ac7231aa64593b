/// 通用模块：配置、日志、分页、健康检查
/// Common module: config, tracing, pagination, health

pub mod config;
pub mod health;
pub mod pagination;
pub mod tracing;

// 重新导出主要的公共接口
pub use health::{HealthCheck, HealthStatus};
pub use pagination::Page;
