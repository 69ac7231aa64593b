use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{error, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::conf::AppSettings;
use crate::error::{AppError, AppResult};
use crate::realtime::tasks::{spawn_expiry_purge, spawn_heartbeat_sweeper};
use crate::realtime::RealtimeServer;
use crate::route_registry::RouteRegistry;
use crate::state::AppState;

/// 停机时等待后台任务退出的上限 / How long shutdown waits for background tasks
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 应用启动器
pub struct AppBootstrap {
    settings: AppSettings,
}

impl AppBootstrap {
    pub fn new(settings: AppSettings) -> Self {
        Self { settings }
    }

    /// 运行应用服务器：HTTP、实时通道与后台任务
    /// Run the HTTP server, the realtime channel and background tasks
    #[instrument(skip(self))]
    pub async fn run(self) -> AppResult<()> {
        let settings = self.settings;
        info!(
            "启动应用服务器 http={}:{} realtime={}:{} (enabled={})",
            settings.server.host,
            settings.server.port,
            settings.realtime.host,
            settings.realtime.port,
            settings.realtime.enabled
        );

        let state = web::Data::new(AppState::build(settings.clone()).await?);
        let dispatcher = state.dispatcher.clone();

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        if settings.realtime.enabled {
            let listener = RealtimeServer::bind(&settings.realtime.host, settings.realtime.port).await?;
            let realtime = Arc::new(RealtimeServer::new(
                dispatcher.clone(),
                state.notifications.clone(),
                &settings.realtime,
            ));
            tasks.push(tokio::spawn(async move {
                if let Err(e) = realtime.serve(listener).await {
                    error!("❌ realtime channel stopped: {}", e);
                }
            }));
            tasks.push(spawn_heartbeat_sweeper(
                dispatcher.clone(),
                settings.realtime.heartbeat_timeout_ms,
                dispatcher.subscribe_shutdown(),
            ));
        }
        tasks.push(spawn_expiry_purge(
            state.notifications.clone(),
            settings.notifications.purge_interval_secs,
            dispatcher.subscribe_shutdown(),
        ));

        let registry = RouteRegistry::with_all_modules();
        registry.print_routes_info();

        let result = Self::start_http_server(&settings, state, registry).await;

        // HTTP 停止后排空实时连接 / Drain realtime connections once HTTP stops
        let closed = dispatcher.drain();
        info!("🛑 shutting down, closed {} realtime connections", closed);
        for task in tasks {
            if timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("background task did not stop within {:?}", SHUTDOWN_GRACE);
            }
        }

        match result {
            Ok(()) => {
                info!("服务器已停止");
                Ok(())
            }
            Err(e) => {
                error!("服务器运行失败: {}", e);
                Err(e)
            }
        }
    }

    /// 启动HTTP服务器
    async fn start_http_server(
        settings: &AppSettings,
        state: web::Data<AppState>,
        registry: RouteRegistry,
    ) -> AppResult<()> {
        let mut server = HttpServer::new(move || {
            App::new()
                .wrap(Logger::default())
                .app_data(state.clone())
                // 集成 Swagger UI 文档（使用通配路径以兼容静态资源与尾随斜杠）
                .service(SwaggerUi::new("/swagger-ui/{_:.*}").url(
                    "/api-doc/openapi.json",
                    crate::api::swagger::ApiDoc::openapi(),
                ))
                .configure(|cfg| configure_app(cfg, &registry))
        });
        if let Some(workers) = settings.server.workers {
            server = server.workers(workers);
        }

        server
            .bind((settings.server.host.as_str(), settings.server.port))
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?
            .run()
            .await
            .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

        Ok(())
    }
}

/// 提取器错误统一为应用错误信封，并挂载全部路由
/// Extractor errors use the application envelope; mounts every route
pub fn configure_app(cfg: &mut web::ServiceConfig, registry: &RouteRegistry) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::validation("body", err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::validation("query", err.to_string()).into()),
    );
    registry.configure_all_routes(cfg);
}
