use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, info};

use super::events::NotificationEvent;
use super::registry::ConnectionRegistry;
use crate::comm::{HealthCheck, HealthStatus};

/// 实时分发器：显式构造并注入，拥有自己的生命周期
/// Realtime dispatcher; constructed explicitly and injected, with its own lifecycle
pub struct Dispatcher {
    registry: ConnectionRegistry,
    shutdown_tx: watch::Sender<bool>,
    draining: AtomicBool,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            registry: ConnectionRegistry::new(),
            shutdown_tx,
            draining: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// 推送给目标用户的全部在线连接；无在线连接时丢弃（持久化由通知存储负责）
    /// Push to every live connection of the target; dropped when none are live
    pub fn publish(&self, user_id: &str, event: &NotificationEvent) -> usize {
        if self.is_draining() {
            return 0;
        }
        let delivered = self.registry.publish(user_id, event.name(), &event.data());
        if delivered > 0 {
            debug!(user_id, event = event.name(), delivered, "📤 event published");
        }
        delivered
    }

    /// 订阅停机信号 / Subscribe to the shutdown signal
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// 停机：通知后台任务退出并关闭全部连接
    /// Drain: stop background tasks and close every connection
    pub fn drain(&self) -> usize {
        self.draining.store(true, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);
        let closed = self.registry.drain("server shutting down");
        info!("🛑 realtime dispatcher drained, closed {} connections", closed);
        closed
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthCheck for Dispatcher {
    async fn check_health(&self) -> HealthStatus {
        HealthStatus::new(
            "realtime_dispatcher",
            !self.is_draining(),
            Some(format!(
                "users={} connections={}",
                self.registry.user_count(),
                self.registry.connection_count()
            )),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::registry::{ConnectionHandle, Outbound};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_drain_signals_and_stops_publishing() {
        let dispatcher = Dispatcher::new();
        let mut shutdown = dispatcher.subscribe_shutdown();
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.registry().join("u1", ConnectionHandle::new("c1", tx));

        assert_eq!(dispatcher.drain(), 1);
        assert!(shutdown.changed().await.is_ok());
        assert!(*shutdown.borrow());
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close(_))));
        assert_eq!(
            dispatcher.publish("u1", &NotificationEvent::UnreadCount { unread: 1 }),
            0
        );
        assert!(!dispatcher.check_health().await.healthy);
    }
}
