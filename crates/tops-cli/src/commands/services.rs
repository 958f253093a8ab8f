use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tops_acme::{
    create_acme_app_state, AcmeAppState, AcmeDependencies, InstantAcmeProtocol, StaleKeyCleanup,
};
use tops_config::ServerConfig;
use tops_notifications::SmtpEmailService;
use tops_queue::{CdnWorkerSupervisor, WorkerPool};
use tops_vault::VaultRegistry;
use tracing::{debug, info};

/// Everything a command needs, wired from one configuration file.
pub struct Services {
    pub config: ServerConfig,
    pub state: Arc<AcmeAppState>,
    pub pool: Arc<WorkerPool>,
    pub supervisor: Arc<CdnWorkerSupervisor>,
}

impl Services {
    pub async fn build(config_path: &Path) -> anyhow::Result<Self> {
        let config = ServerConfig::load(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;

        if !config.traffic_vault.enabled {
            bail!("Traffic Vault is not enabled; certificate operations are unavailable");
        }

        debug!("Initializing database connection...");
        let db =
            tops_database::establish_connection(&config.database_url, config.db_max_connections)
                .await?;

        let vault = VaultRegistry::default()
            .build(
                &config.traffic_vault.backend,
                config.traffic_vault.config.clone(),
                db.clone(),
            )
            .await?;

        let pool = WorkerPool::new(config.worker_pool.workers, config.worker_pool.queue_depth);
        let supervisor = Arc::new(CdnWorkerSupervisor::new(Arc::new(StaleKeyCleanup::new(
            vault.clone(),
            db.clone(),
        ))));
        let notifier = Arc::new(SmtpEmailService::new(&config.smtp)?);

        let state = create_acme_app_state(
            &config,
            AcmeDependencies {
                db,
                vault,
                protocol: Arc::new(InstantAcmeProtocol::new()),
                queue: pool.clone(),
                supervisor: supervisor.clone(),
                notifier,
            },
        );
        info!(
            "services ready: {} workers, queue depth {}",
            config.worker_pool.workers, config.worker_pool.queue_depth
        );

        Ok(Self {
            config,
            state,
            pool,
            supervisor,
        })
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        self.supervisor.shutdown().await;
    }
}
