//! 连接注册表：用户 ID → 在线连接
//! Connection registry: user id to live connections
//!
//! 单进程内有效；多进程扇出需要共享的发布订阅总线。
//! Process-local; multi-process fan-out would need a shared pub/sub backbone.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::events::ServerFrame;

/// 写任务接收的指令 / Commands consumed by a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close(String),
}

pub type OutboundTx = mpsc::UnboundedSender<Outbound>;

/// 单个连接的句柄 / Handle to one live connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: String,
    pub tx: OutboundTx,
    /// 最近一次收到客户端帧的时间 / Last inbound frame
    pub last_seen: Arc<Mutex<Instant>>,
}

impl ConnectionHandle {
    pub fn new(conn_id: impl Into<String>, tx: OutboundTx) -> Self {
        Self {
            conn_id: conn_id.into(),
            tx,
            last_seen: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

#[derive(Debug, Default)]
struct UserSlot {
    next_seq: u64,
    connections: HashMap<String, ConnectionHandle>,
}

impl UserSlot {
    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: DashMap<String, UserSlot>,
    conn_users: DashMap<String, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入：连接已属于其他用户时先离开 / Join; re-homes a connection joined elsewhere
    pub fn join(&self, user_id: &str, handle: ConnectionHandle) -> usize {
        let conn_id = handle.conn_id.clone();
        if let Some(previous) = self.conn_users.get(&conn_id).map(|u| u.clone()) {
            if previous != user_id {
                self.leave(&conn_id);
            }
        }
        let mut slot = self.users.entry(user_id.to_string()).or_default();
        slot.connections.insert(conn_id.clone(), handle);
        let count = slot.connections.len();
        drop(slot);
        self.conn_users.insert(conn_id, user_id.to_string());
        count
    }

    /// 离开；最后一个连接离开时删除用户条目 / Leave; the last leave drops the user entry
    pub fn leave(&self, conn_id: &str) -> Option<String> {
        let (_, user_id) = self.conn_users.remove(conn_id)?;
        if let Some(mut slot) = self.users.get_mut(&user_id) {
            slot.connections.remove(conn_id);
        }
        self.users.remove_if(&user_id, |_, slot| slot.connections.is_empty());
        Some(user_id)
    }

    /// 向用户全部连接推送；单个连接失败不影响其他连接
    /// Fan out to every connection of a user; one failed send never aborts the rest
    ///
    /// 持有该用户条目的写锁完成编号与发送，保证同一用户的事件按发布顺序到达。
    /// Numbering and sending happen under the user's entry lock, so events for
    /// one user arrive in publish order.
    pub fn publish(&self, user_id: &str, event: &str, data: &Value) -> usize {
        let Some(mut slot) = self.users.get_mut(user_id) else {
            debug!(user_id, event, "no live connection, event dropped");
            return 0;
        };
        let seq = slot.bump();
        let text = match serde_json::to_string(&ServerFrame::new(event, seq, data.clone())) {
            Ok(text) => text,
            Err(e) => {
                warn!(user_id, event, "failed to encode frame: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (conn_id, handle) in slot.connections.iter() {
            if handle.tx.send(Outbound::Text(text.clone())).is_ok() {
                delivered += 1;
            } else {
                dead.push(conn_id.clone());
            }
        }
        for conn_id in &dead {
            slot.connections.remove(conn_id);
            self.conn_users.remove(conn_id);
            warn!(user_id, conn_id = %conn_id, "⚠️ pruned closed connection");
        }
        let empty = slot.connections.is_empty();
        drop(slot);
        if empty {
            self.users.remove_if(user_id, |_, slot| slot.connections.is_empty());
        }
        delivered
    }

    /// 只发给某一连接，但仍占用该用户的序号 / Send to one connection using the user's sequence
    pub fn send_direct(&self, conn_id: &str, event: &str, data: &Value) -> bool {
        let Some(user_id) = self.conn_users.get(conn_id).map(|u| u.clone()) else {
            return false;
        };
        let Some(mut slot) = self.users.get_mut(&user_id) else {
            return false;
        };
        let seq = slot.bump();
        let Some(handle) = slot.connections.get(conn_id) else {
            return false;
        };
        match serde_json::to_string(&ServerFrame::new(event, seq, data.clone())) {
            Ok(text) => handle.tx.send(Outbound::Text(text)).is_ok(),
            Err(_) => false,
        }
    }

    pub fn user_of(&self, conn_id: &str) -> Option<String> {
        self.conn_users.get(conn_id).map(|u| u.clone())
    }

    pub fn connections_of(&self, user_id: &str) -> usize {
        self.users.get(user_id).map(|s| s.connections.len()).unwrap_or(0)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn connection_count(&self) -> usize {
        self.conn_users.len()
    }

    /// 超过心跳超时的连接 / Connections idle longer than `timeout`
    pub fn stale_connections(&self, timeout: Duration) -> Vec<ConnectionHandle> {
        self.users
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .connections
                    .values()
                    .filter(|h| h.idle_for() > timeout)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// 关闭全部连接并清空 / Close every connection and clear the registry
    pub fn drain(&self, reason: &str) -> usize {
        let handles: Vec<ConnectionHandle> = self
            .users
            .iter()
            .flat_map(|entry| entry.value().connections.values().cloned().collect::<Vec<_>>())
            .collect();
        for handle in &handles {
            let _ = handle.tx.send(Outbound::Close(reason.to_string()));
        }
        self.users.clear();
        self.conn_users.clear();
        handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handle(id: &str) -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(id, tx), rx)
    }

    fn frame(out: Outbound) -> ServerFrame {
        match out {
            Outbound::Text(t) => serde_json::from_str(&t).unwrap(),
            Outbound::Close(r) => panic!("unexpected close: {}", r),
        }
    }

    #[test]
    fn test_fan_out_to_every_connection() {
        let reg = ConnectionRegistry::new();
        let (h1, mut rx1) = handle("c1");
        let (h2, mut rx2) = handle("c2");
        reg.join("u1", h1);
        assert_eq!(reg.join("u1", h2), 2);

        assert_eq!(reg.publish("u1", "notification", &json!({"id": "n1"})), 2);
        assert_eq!(frame(rx1.try_recv().unwrap()).seq, 1);
        assert_eq!(frame(rx2.try_recv().unwrap()).data["id"], "n1");
        assert_eq!(reg.publish("u2", "notification", &json!({})), 0);
    }

    #[test]
    fn test_dead_connection_does_not_block_others() {
        let reg = ConnectionRegistry::new();
        let (h1, rx1) = handle("c1");
        let (h2, mut rx2) = handle("c2");
        reg.join("u1", h1);
        reg.join("u1", h2);
        drop(rx1);

        assert_eq!(reg.publish("u1", "notification", &json!({})), 1);
        assert!(rx2.try_recv().is_ok());
        assert_eq!(reg.connections_of("u1"), 1);
        assert_eq!(reg.connection_count(), 1);
    }

    #[test]
    fn test_last_leave_drops_user() {
        let reg = ConnectionRegistry::new();
        let (h1, _rx1) = handle("c1");
        let (h2, _rx2) = handle("c2");
        reg.join("u1", h1);
        reg.join("u1", h2);
        assert_eq!(reg.leave("c1").as_deref(), Some("u1"));
        assert_eq!(reg.user_count(), 1);
        reg.leave("c2");
        assert_eq!(reg.user_count(), 0);
        assert!(reg.leave("c2").is_none());
    }

    #[test]
    fn test_seq_is_monotonic_per_user() {
        let reg = ConnectionRegistry::new();
        let (h1, mut rx) = handle("c1");
        reg.join("u1", h1);
        for i in 0..5 {
            reg.publish("u1", "notification_read", &json!({ "id": i }));
        }
        assert!(reg.send_direct("c1", "pong", &json!({})));
        let seqs: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok()).map(|o| frame(o).seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_rejoin_as_other_user_moves_connection() {
        let reg = ConnectionRegistry::new();
        let (h1, _rx) = handle("c1");
        reg.join("u1", h1.clone());
        reg.join("u2", h1);
        assert_eq!(reg.connections_of("u1"), 0);
        assert_eq!(reg.user_of("c1").as_deref(), Some("u2"));
    }

    #[test]
    fn test_drain_closes_all() {
        let reg = ConnectionRegistry::new();
        let (h1, mut rx) = handle("c1");
        reg.join("u1", h1);
        assert_eq!(reg.drain("shutdown"), 1);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close("shutdown".to_string()));
        assert_eq!(reg.connection_count(), 0);
    }
}
