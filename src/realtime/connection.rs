use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::handler::{handle_text, Flow, Session};
use super::registry::{ConnectionHandle, Outbound};
use super::server::RealtimeServer;
use super::DispatchError;

/// 写任务在关闭后等待刷出的时间 / Grace period for the writer to flush a close
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// 处理新连接：Connecting → Joined(userId) → Disconnected
/// Handle a new connection through its lifecycle
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    server: Arc<RealtimeServer>,
) -> Result<(), DispatchError> {
    debug!("📨 New connection from: {}", peer_addr);
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let conn_id = Uuid::new_v4().to_string();

    let writer_conn = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            let (msg, is_close) = match out {
                Outbound::Text(text) => (Message::Text(text), false),
                Outbound::Close(reason) => (
                    Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: Cow::Owned(reason),
                    })),
                    true,
                ),
            };
            if let Err(e) = ws_sender.send(msg).await {
                debug!("Failed to send to {}: {}", writer_conn, e);
                break;
            }
            if is_close {
                let _ = ws_sender.close().await;
                break;
            }
        }
    });

    let mut session = Session::new(ConnectionHandle::new(conn_id.clone(), tx));
    let mut shutdown = server.dispatcher().subscribe_shutdown();
    let join_deadline = tokio::time::sleep(server.join_deadline());
    tokio::pin!(join_deadline);

    let close_reason: Option<String> = loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                let Some(msg) = msg else { break None };
                let message = match msg {
                    Ok(message) => message,
                    Err(e) => {
                        debug!("WebSocket error from {}: {}", conn_id, e);
                        break None;
                    }
                };
                session.handle.touch();
                match message {
                    Message::Text(text) => match handle_text(&server, &mut session, &text).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Close(reason)) => break Some(reason),
                        Err(e) => {
                            warn!("Error handling frame from {}: {}", conn_id, e);
                            break None;
                        }
                    },
                    Message::Close(_) => break None,
                    _ => {}
                }
            }
            _ = &mut join_deadline, if session.user_id.is_none() => {
                warn!("⏰ connection {} from {} never joined, closing", conn_id, peer_addr);
                break Some("join deadline exceeded".to_string());
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break Some("server shutting down".to_string());
                }
            }
        }
    };

    if let Some(user_id) = server.dispatcher().registry().leave(&conn_id) {
        info!("👋 {} disconnected ({})", user_id, conn_id);
    }
    if let Some(reason) = close_reason {
        let _ = session.handle.tx.send(Outbound::Close(reason));
    }
    drop(session);
    if tokio::time::timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
        send_task.abort();
    }
    debug!("connection {} closed", conn_id);
    Ok(())
}
