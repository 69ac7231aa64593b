//! 实时通道：WebSocket 连接管理与通知扇出
//! Realtime channel: WebSocket connection management and notification fan-out

pub mod connection;
pub mod dispatcher;
pub mod events;
pub mod handler;
pub mod registry;
pub mod server;
pub mod tasks;

pub use dispatcher::Dispatcher;
pub use events::{ClientFrame, NotificationEvent, ServerFrame};
pub use registry::{ConnectionHandle, ConnectionRegistry, Outbound};
pub use server::RealtimeServer;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("实时通道监听失败 {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("WebSocket 握手失败: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("帧编码失败: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("连接已关闭: {conn_id}")]
    ChannelClosed { conn_id: String },
}
