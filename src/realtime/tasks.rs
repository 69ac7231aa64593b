use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::dispatcher::Dispatcher;
use super::registry::Outbound;
use crate::modules::notification::NotificationService;

/// 清理间隔随超时缩放 / Sweep interval scaled to the timeout
fn sweep_interval_ms(timeout_ms: u64) -> u64 {
    if timeout_ms <= 1000 {
        (timeout_ms / 2).max(10)
    } else if timeout_ms <= 10000 {
        1000
    } else {
        5000
    }
}

/// 心跳超时清理 / Close connections whose heartbeat expired
pub fn spawn_heartbeat_sweeper(
    dispatcher: Arc<Dispatcher>,
    timeout_ms: u64,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let every = sweep_interval_ms(timeout_ms);
        info!("⏰ heartbeat sweep every {}ms for timeout {}ms", every, timeout_ms);
        let timeout = Duration::from_millis(timeout_ms);
        let mut ticker = interval(Duration::from_millis(every));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let registry = dispatcher.registry();
                    for handle in registry.stale_connections(timeout) {
                        let _ = handle.tx.send(Outbound::Close("heartbeat timeout".to_string()));
                        registry.leave(&handle.conn_id);
                        info!("🧹 Cleaned up timeout connection: {}", handle.conn_id);
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() { break; }
                }
            }
        }
        debug!("heartbeat sweeper stopped");
    })
}

/// 过期通知清理 / Periodically purge expired notifications
pub fn spawn_expiry_purge(
    notifications: Arc<NotificationService>,
    interval_secs: u64,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match notifications.purge_expired().await {
                        Ok(0) => {}
                        Ok(n) => info!("🧹 purged {} expired notifications", n),
                        Err(e) => warn!("⚠️ expired notification purge failed: {}", e),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() { break; }
                }
            }
        }
        debug!("expiry purge stopped");
    })
}
