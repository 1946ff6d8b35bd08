use crate::api::{self, AppState};
use crate::chain::{ContractFactory, ContractResolver, WalletFactory};
use crate::config::{Config, MonitorConfig};
use crate::database::{VaultRepository, VaultStore, WalletRepository, WalletResolver};
use crate::deployment_monitor::DeploymentMonitor;
use crate::error::{Result, VaultError};
use crate::recovery_monitor::RecoveryMonitor;
use crate::vault_manager::VaultManager;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wires storage, the lifecycle manager and both monitors together.
///
/// The signing wallet and contract bindings are supplied by the embedding
/// application.
pub struct VaultService {
    vault_manager: Arc<VaultManager>,
    deployment_monitor: Arc<DeploymentMonitor>,
    recovery_monitor: Arc<RecoveryMonitor>,
}

impl VaultService {
    pub fn new(
        config: &MonitorConfig,
        store: Arc<dyn VaultStore>,
        wallets: Arc<dyn WalletResolver>,
        wallet_factory: Arc<dyn WalletFactory>,
        contract_factory: Arc<dyn ContractFactory>,
    ) -> Self {
        let vault_manager = Arc::new(VaultManager::new(store.clone()));
        let contracts = Arc::new(ContractResolver::new(wallets, wallet_factory, contract_factory));

        let deployment_monitor = Arc::new(DeploymentMonitor::new(
            store.clone(),
            vault_manager.clone(),
            contracts.clone(),
            config,
        ));
        let recovery_monitor = Arc::new(RecoveryMonitor::new(store, vault_manager.clone(), contracts, config));

        Self {
            vault_manager,
            deployment_monitor,
            recovery_monitor,
        }
    }

    /// Connects to Postgres, runs migrations and builds the service on the
    /// database-backed repositories.
    pub async fn connect(
        config: &Config,
        wallet_factory: Arc<dyn WalletFactory>,
        contract_factory: Arc<dyn ContractFactory>,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.database_url)
            .await?;
        info!("Database connection established");

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations completed");

        Ok(Self::new(
            &config.monitor_config(),
            Arc::new(VaultRepository::new(pool.clone())),
            Arc::new(WalletRepository::new(pool)),
            wallet_factory,
            contract_factory,
        ))
    }

    pub fn vault_manager(&self) -> Arc<VaultManager> {
        self.vault_manager.clone()
    }

    pub fn deployment_monitor(&self) -> Arc<DeploymentMonitor> {
        self.deployment_monitor.clone()
    }

    pub fn recovery_monitor(&self) -> Arc<RecoveryMonitor> {
        self.recovery_monitor.clone()
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            vault_manager: self.vault_manager.clone(),
            deployment_monitor: self.deployment_monitor.clone(),
            recovery_monitor: self.recovery_monitor.clone(),
        }
    }

    pub fn start_monitors(&self, parent: &CancellationToken) {
        self.deployment_monitor.start_deployment_monitoring(parent);
        self.recovery_monitor.start_recovery_polling(parent);
    }

    pub async fn stop_monitors(&self) {
        self.deployment_monitor.stop_deployment_monitoring().await;
        self.recovery_monitor.stop_recovery_polling().await;
    }

    /// Runs both monitors and the HTTP API until `shutdown` is cancelled.
    pub async fn run(&self, api_port: u16, shutdown: CancellationToken) -> Result<()> {
        self.start_monitors(&shutdown);

        let addr = SocketAddr::from(([0, 0, 0, 0], api_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| VaultError::NetworkError(format!("Failed to bind {}: {}", addr, e)))?;
        info!("API server listening on {}", addr);

        let signal = shutdown.clone();
        let served = axum::serve(listener, api::create_router(self.app_state()))
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
            .map_err(|e| VaultError::NetworkError(format!("API server error: {}", e)));

        self.stop_monitors().await;
        info!("Vault service stopped");
        served
    }
}
