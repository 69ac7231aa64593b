//! 实时通道帧处理
//! Realtime frame handling
//!
//! `join` 中的 userId 不做校验，身份须由前置会话网关确认，与 HTTP 的
//! `X-User-Id` 头同一信任模型。该端口不得直接暴露给不可信客户端。
//! The `userId` in `join` is taken as given. Identity must be established
//! upstream by the session gateway, the same trust model as the HTTP
//! `X-User-Id` header. Never expose this port directly to untrusted clients.

use serde_json::json;
use tracing::{debug, info, warn};

use super::events::{ClientFrame, NotificationEvent, ServerFrame};
use super::registry::{ConnectionHandle, Outbound};
use super::server::RealtimeServer;
use super::DispatchError;

/// 单个连接的会话状态 / Per-connection session state
pub struct Session {
    pub handle: ConnectionHandle,
    pub user_id: Option<String>,
}

impl Session {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self { handle, user_id: None }
    }

    pub fn conn_id(&self) -> &str {
        &self.handle.conn_id
    }

    /// 未加入前的直发帧，序号为 0 / Frame sent before join, seq 0
    fn send_local(&self, event: &str, data: serde_json::Value) -> Result<(), DispatchError> {
        let text = serde_json::to_string(&ServerFrame::new(event, 0, data))?;
        self.handle
            .tx
            .send(Outbound::Text(text))
            .map_err(|_| DispatchError::ChannelClosed {
                conn_id: self.handle.conn_id.clone(),
            })
    }
}

/// 处理后连接的去向 / What happens to the connection next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close(String),
}

/// 处理一条文本帧 / Handle one inbound text frame
pub async fn handle_text(server: &RealtimeServer, session: &mut Session, text: &str) -> Result<Flow, DispatchError> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(conn_id = session.conn_id(), "invalid frame: {}", e);
            session.send_local("error", json!({ "message": "invalid frame" }))?;
            return Ok(Flow::Continue);
        }
    };

    match frame {
        ClientFrame::Join { user_id } => handle_join(server, session, user_id).await,
        ClientFrame::Leave => {
            if let Some(user_id) = session.user_id.take() {
                server.dispatcher().registry().leave(session.conn_id());
                info!("👋 {} left on connection {}", user_id, session.conn_id());
            }
            session.send_local("left", json!({}))?;
            Ok(Flow::Close("left".to_string()))
        }
        ClientFrame::Ping => {
            debug!("🏓 ping from {}", session.conn_id());
            let data = json!({ "timestamp": chrono::Utc::now().timestamp_millis() });
            let registry = server.dispatcher().registry();
            if session.user_id.is_none() || !registry.send_direct(session.conn_id(), "pong", &data) {
                session.send_local("pong", data)?;
            }
            Ok(Flow::Continue)
        }
    }
}

async fn handle_join(server: &RealtimeServer, session: &mut Session, user_id: String) -> Result<Flow, DispatchError> {
    let user_id = user_id.trim().to_string();
    if user_id.is_empty() {
        session.send_local("error", json!({ "message": "userId is required" }))?;
        return Ok(Flow::Continue);
    }

    let registry = server.dispatcher().registry();
    let connections = registry.join(&user_id, session.handle.clone());
    session.user_id = Some(user_id.clone());
    info!(
        "✅ {} joined on connection {} ({} live)",
        user_id,
        session.conn_id(),
        connections
    );
    registry.send_direct(
        session.conn_id(),
        "joined",
        &json!({ "userId": user_id, "connectionId": session.conn_id(), "connections": connections }),
    );

    // 不回放历史，只下发未读数供客户端对账 / No replay; unread count only
    match server.notifications().unread_count(&user_id).await {
        Ok(unread) => {
            let event = NotificationEvent::UnreadCount { unread };
            registry.send_direct(session.conn_id(), event.name(), &event.data());
        }
        Err(e) => warn!("⚠️ unread count for {} unavailable: {}", user_id, e),
    }
    Ok(Flow::Continue)
}
