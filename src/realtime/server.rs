use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::dispatcher::Dispatcher;
use super::DispatchError;
use crate::conf::RealtimeSettings;
use crate::modules::notification::NotificationService;

/// 实时通道服务端 / Realtime channel server
pub struct RealtimeServer {
    dispatcher: Arc<Dispatcher>,
    notifications: Arc<NotificationService>,
    join_deadline: Duration,
}

impl RealtimeServer {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        notifications: Arc<NotificationService>,
        settings: &RealtimeSettings,
    ) -> Self {
        Self {
            dispatcher,
            notifications,
            join_deadline: Duration::from_millis(settings.join_deadline_ms),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    pub fn join_deadline(&self) -> Duration {
        self.join_deadline
    }

    pub async fn bind(host: &str, port: u16) -> Result<TcpListener, DispatchError> {
        let addr = format!("{}:{}", host, port);
        TcpListener::bind(&addr)
            .await
            .map_err(|source| DispatchError::Bind { addr, source })
    }

    /// 接受连接直到收到停机信号 / Accept connections until shutdown
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), DispatchError> {
        if let Ok(addr) = listener.local_addr() {
            info!("🚀 realtime channel listening on ws://{}", addr);
        }
        let mut shutdown = self.dispatcher.subscribe_shutdown();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            let server = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = super::connection::handle_connection(stream, peer_addr, server).await {
                                    error!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => error!("accept failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("realtime listener stopped");
        Ok(())
    }
}
