//! 应用状态：显式构造并注入到 HTTP 与实时通道
//! Application state, constructed once and injected into HTTP and realtime

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::comm::HealthCheck;
use crate::conf::AppSettings;
use crate::error::AppError;
use crate::modules::directory::TenantDirectory;
use crate::modules::imaging::{AccessRouter, ImagingGateway};
use crate::modules::notification::NotificationService;
use crate::modules::sharing::SharingLedger;
use crate::realtime::Dispatcher;
use crate::store::{GrantRepo, HospitalDirectory, ImageRecordRepo, MemoryStore, NotificationRepo, PgStore};

pub struct AppState {
    pub settings: AppSettings,
    pub directory: Arc<TenantDirectory>,
    pub gateway: Arc<ImagingGateway>,
    pub ledger: Arc<SharingLedger>,
    pub notifications: Arc<NotificationService>,
    pub dispatcher: Arc<Dispatcher>,
    pub health_checks: Vec<Arc<dyn HealthCheck>>,
}

impl AppState {
    /// 按 `database.url` 选择后端 / Pick the backend from `database.url`
    pub async fn build(settings: AppSettings) -> Result<Self, AppError> {
        match settings.database.url.clone() {
            Some(url) => {
                let store = Arc::new(PgStore::connect(&settings.database, &url).await?);
                info!("🗄️ storage backend: postgres");
                let mut state = Self::assemble(settings, store.clone())?;
                state.health_checks.push(store);
                Ok(state)
            }
            None => {
                let store = Arc::new(MemoryStore::from_seed(&settings.directory)?);
                info!("🗄️ storage backend: memory");
                Self::assemble(settings, store)
            }
        }
    }

    /// 用同一个存储对象实现全部仓库 / Wire every service over one store
    pub fn assemble<S>(settings: AppSettings, store: Arc<S>) -> Result<Self, AppError>
    where
        S: HospitalDirectory + ImageRecordRepo + GrantRepo + NotificationRepo + 'static,
    {
        let dispatcher = Arc::new(Dispatcher::new());
        let directory = Arc::new(TenantDirectory::new(
            store.clone(),
            store.clone(),
            settings.imaging.fallback_endpoint.clone(),
            Duration::from_secs(settings.directory.cache_ttl_secs),
        ));
        let notifications = Arc::new(NotificationService::new(store.clone(), dispatcher.clone()));
        let ledger = Arc::new(SharingLedger::new(
            store.clone(),
            store,
            directory.clone(),
            notifications.clone(),
            settings.sharing.clone(),
        ));
        let router = Arc::new(AccessRouter::new(&settings.imaging)?);
        let gateway = Arc::new(ImagingGateway::new(directory.clone(), ledger.clone(), router.clone()));
        let health_checks: Vec<Arc<dyn HealthCheck>> = vec![
            dispatcher.clone() as Arc<dyn HealthCheck>,
            router as Arc<dyn HealthCheck>,
        ];

        Ok(Self {
            settings,
            directory,
            gateway,
            ledger,
            notifications,
            dispatcher,
            health_checks,
        })
    }
}
