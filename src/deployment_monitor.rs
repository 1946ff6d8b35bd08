use crate::chain::{ContractResolver, DeploymentStatus};
use crate::config::MonitorConfig;
use crate::database::VaultStore;
use crate::error::{Result, VaultError};
use crate::models::{Vault, VaultFilter, VaultStatus};
use crate::scheduler::{cancellable, PollingJob, PollingTask, TickReport};
use crate::vault_manager::{Transition, VaultManager};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const MISSING_TX_HASH_REASON: &str = "missing deployment transaction hash";
pub const NO_CONTRACT_ADDRESS_REASON: &str = "deployment did not produce a contract address";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeploymentOutcome {
    StillPending,
    Activated,
    Failed,
    /// Another writer already moved the vault on
    Superseded,
}

/// Moves vaults out of `Deploying` once their deployment transaction settles.
pub struct DeploymentMonitor {
    store: Arc<dyn VaultStore>,
    vault_manager: Arc<VaultManager>,
    contracts: Arc<ContractResolver>,
    task: PollingTask,
    last_report: RwLock<Option<TickReport>>,
}

impl DeploymentMonitor {
    pub fn new(
        store: Arc<dyn VaultStore>,
        vault_manager: Arc<VaultManager>,
        contracts: Arc<ContractResolver>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            store,
            vault_manager,
            contracts,
            task: PollingTask::new(config.deployment_interval),
            last_report: RwLock::new(None),
        }
    }

    /// Returns `false` if the loop was already running.
    pub fn start_deployment_monitoring(self: &Arc<Self>, parent: &CancellationToken) -> bool {
        self.task.start(Arc::clone(self), parent)
    }

    pub async fn stop_deployment_monitoring(&self) {
        self.task.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn last_report(&self) -> Option<TickReport> {
        self.last_report.read().clone()
    }

    /// One pass over every live `Deploying` vault.
    pub async fn check_deploying_vaults(&self, token: &CancellationToken) -> TickReport {
        let mut report = TickReport::default();

        let filter = VaultFilter::with_status(VaultStatus::Deploying);
        let vaults = match cancellable(token, self.store.list(&filter, None, None)).await {
            Ok(page) => page.vaults,
            Err(e) => {
                error!("Failed to list deploying vaults: {}", e);
                report.record_error(e);
                return report;
            }
        };

        for vault in &vaults {
            if token.is_cancelled() {
                report.record_error(VaultError::Cancelled);
                break;
            }
            report.processed += 1;

            match self.check_vault_deployment(vault, token).await {
                Ok(outcome) => {
                    report.checked += 1;
                    if matches!(outcome, DeploymentOutcome::Activated | DeploymentOutcome::Failed) {
                        report.transitioned += 1;
                    }
                }
                Err(VaultError::Cancelled) => {
                    report.record_error(VaultError::Cancelled);
                    break;
                }
                Err(e) => {
                    warn!(vault_id = %vault.id, transient = e.is_transient(), "Deployment check failed: {}", e);
                    report.record_error(e);
                }
            }
        }

        if !vaults.is_empty() {
            info!(
                deploying = vaults.len(),
                checked = report.checked,
                transitioned = report.transitioned,
                "Deployment check completed"
            );
        }
        report
    }

    async fn check_vault_deployment(&self, vault: &Vault, token: &CancellationToken) -> Result<DeploymentOutcome> {
        let Some(tx_hash) = vault.deployment_tx_hash() else {
            warn!(vault_id = %vault.id, "Deploying vault has no transaction hash");
            return self
                .settle(
                    vault,
                    DeploymentOutcome::Failed,
                    self.vault_manager
                        .process_vault_deployment_failure(vault.id, MISSING_TX_HASH_REASON),
                )
                .await;
        };

        let contract = cancellable(token, self.contracts.contract_for(vault)).await?;
        let status = cancellable(token, contract.get_deployment(tx_hash)).await?;

        match status {
            DeploymentStatus::Pending => {
                debug!(vault_id = %vault.id, tx_hash, "Deployment not confirmed yet");
                Ok(DeploymentOutcome::StillPending)
            }
            DeploymentStatus::Failed(reason) => {
                let reason = format!("deployment transaction failed: {}", reason);
                self.settle(
                    vault,
                    DeploymentOutcome::Failed,
                    self.vault_manager.process_vault_deployment_failure(vault.id, &reason),
                )
                .await
            }
            DeploymentStatus::Confirmed(receipt) => {
                match receipt.contract_address.as_deref().filter(|a| !a.is_empty()) {
                    Some(address) => {
                        info!(vault_id = %vault.id, address, block = receipt.block_number, "Deployment confirmed");
                        self.settle(
                            vault,
                            DeploymentOutcome::Activated,
                            self.vault_manager
                                .process_vault_deployment_success(vault.id, address, tx_hash),
                        )
                        .await
                    }
                    None => {
                        warn!(vault_id = %vault.id, block = receipt.block_number, "Deployment confirmed without contract address");
                        self.settle(
                            vault,
                            DeploymentOutcome::Failed,
                            self.vault_manager
                                .process_vault_deployment_failure(vault.id, NO_CONTRACT_ADDRESS_REASON),
                        )
                        .await
                    }
                }
            }
        }
    }

    /// A rejected transition means another writer got there first; that is
    /// a warning for the monitor, not a failed check.
    async fn settle<F>(&self, vault: &Vault, outcome: DeploymentOutcome, write: F) -> Result<DeploymentOutcome>
    where
        F: Future<Output = Result<Transition>>,
    {
        match write.await {
            Ok(transition) if transition.applied => Ok(outcome),
            Ok(transition) => {
                debug!(vault_id = %vault.id, status = %transition.status, "Deployment result already recorded");
                Ok(DeploymentOutcome::Superseded)
            }
            Err(VaultError::InvalidStateTransition { from, to, .. }) => {
                warn!(vault_id = %vault.id, %from, %to, "Vault moved on before deployment result was applied");
                Ok(DeploymentOutcome::Superseded)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl PollingJob for DeploymentMonitor {
    fn name(&self) -> &'static str {
        "deployment_monitor"
    }

    async fn run_tick(&self, token: &CancellationToken) -> TickReport {
        let report = self.check_deploying_vaults(token).await;
        *self.last_report.write() = Some(report.clone());
        report
    }
}
