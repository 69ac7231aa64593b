// 健康检查接口与状态定义
// Health check interface and status definitions
use async_trait::async_trait;

/// 健康状态结构体：用于表示组件当前健康状况
/// Health status struct: represents the current health of a component
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    /// 组件名称（如 realtime_dispatcher、imaging_router）
    /// Component name (e.g., realtime_dispatcher, imaging_router)
    pub component: String,
    /// 是否健康 / Whether healthy
    pub healthy: bool,
    /// 附加消息（错误信息或提示）/ Additional message
    pub message: Option<String>,
    /// 采样时间戳（UTC）/ Sample timestamp (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthStatus {
    pub fn new(component: &str, healthy: bool, message: Option<String>) -> Self {
        Self {
            component: component.to_string(),
            healthy,
            message,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// 健康检查通用接口：由各服务或资源实现具体检查逻辑
/// Generic health check interface: implemented by services/resources with concrete logic
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// 执行健康检查并返回健康状态
    /// Perform health check and return the status
    async fn check_health(&self) -> HealthStatus;
}
