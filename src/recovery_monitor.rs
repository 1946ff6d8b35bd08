use crate::chain::{ContractResolver, ExecuteOptions};
use crate::config::MonitorConfig;
use crate::database::VaultStore;
use crate::error::{Result, VaultError};
use crate::models::{Vault, VaultFilter, VaultStatus};
use crate::scheduler::{cancellable, PollingJob, PollingTask, TickReport};
use crate::vault_manager::VaultManager;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A recovery that executed on chain but was never recorded locally.
///
/// The entry stays until the local record reads `Recovered`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DivergedRecovery {
    pub vault_id: Uuid,
    pub tx_hash: String,
    pub reason: String,
    /// Local status when last observed; anything but `Recovering` needs an operator
    pub local_status: VaultStatus,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecoveryOutcome {
    MissingRequestTimestamp,
    TimelockActive,
    Recovered,
    /// Another writer recorded the recovery first
    AlreadyRecorded,
    /// Local write for an already-executed recovery finally landed
    Reconciled,
}

/// Executes timelocked recoveries once the delay has elapsed.
///
/// Between ticks the only guard against a duplicate execution is the status
/// re-read from storage, plus the divergence ledger: a vault whose execution
/// went through but whose local write failed is never submitted again, only
/// its local write is retried. A ledgered vault that leaves `Recovering` any
/// other way stays ledgered and is reported as critical on every tick.
pub struct RecoveryMonitor {
    store: Arc<dyn VaultStore>,
    vault_manager: Arc<VaultManager>,
    contracts: Arc<ContractResolver>,
    recovery_delay: Duration,
    contract_name: String,
    method_signature: String,
    diverged: Mutex<HashMap<Uuid, DivergedRecovery>>,
    task: PollingTask,
    last_report: RwLock<Option<TickReport>>,
}

impl RecoveryMonitor {
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
            recovery_delay: config.recovery_delay,
            contract_name: config.recovery_contract_name.clone(),
            method_signature: config.recovery_method_signature.clone(),
            diverged: Mutex::new(HashMap::new()),
            task: PollingTask::new(config.recovery_interval),
            last_report: RwLock::new(None),
        }
    }

    pub fn start_recovery_polling(self: &Arc<Self>, parent: &CancellationToken) -> bool {
        self.task.start(Arc::clone(self), parent)
    }

    pub async fn stop_recovery_polling(&self) {
        self.task.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn last_report(&self) -> Option<TickReport> {
        self.last_report.read().clone()
    }

    pub fn recovery_delay(&self) -> Duration {
        self.recovery_delay
    }

    pub fn diverged_vaults(&self) -> Vec<DivergedRecovery> {
        self.diverged.lock().values().cloned().collect()
    }

    pub fn is_timelock_elapsed(&self, vault: &Vault, now: DateTime<Utc>) -> bool {
        vault
            .recovery_eligible_at(self.recovery_delay)
            .map(|eligible_at| now >= eligible_at)
            .unwrap_or(false)
    }

    /// One pass over every live `Recovering` vault.
    pub async fn process_recovering_vaults(&self, token: &CancellationToken) -> TickReport {
        let mut report = TickReport::default();

        let filter = VaultFilter::with_status(VaultStatus::Recovering);
        let vaults = match cancellable(token, self.store.list(&filter, None, None)).await {
            Ok(page) => page.vaults,
            Err(e) => {
                error!("Failed to list recovering vaults: {}", e);
                report.record_error(e);
                return report;
            }
        };

        let recovering: HashSet<Uuid> = vaults.iter().map(|v| v.id).collect();
        if let Err(e) = self.audit_departed_entries(&recovering, &mut report, token).await {
            report.record_error(e);
            return report;
        }

        let now = Utc::now();
        for vault in &vaults {
            if token.is_cancelled() {
                report.record_error(VaultError::Cancelled);
                break;
            }
            report.processed += 1;

            match self.process_vault(vault, now, token).await {
                Ok(outcome) => {
                    report.checked += 1;
                    if matches!(outcome, RecoveryOutcome::Recovered | RecoveryOutcome::Reconciled) {
                        report.transitioned += 1;
                    }
                }
                Err(VaultError::Cancelled) => {
                    report.record_error(VaultError::Cancelled);
                    break;
                }
                Err(e) => {
                    if !matches!(e, VaultError::CriticalDivergence { .. }) {
                        warn!(vault_id = %vault.id, "Recovery processing failed: {}", e);
                    }
                    report.record_error(e);
                }
            }
        }

        if report.transitioned > 0 {
            info!(recovering = vaults.len(), recovered = report.transitioned, "Recovery polling completed");
        }
        report
    }

    async fn process_vault(&self, vault: &Vault, now: DateTime<Utc>, token: &CancellationToken) -> Result<RecoveryOutcome> {
        let ledgered = self.diverged.lock().get(&vault.id).cloned();
        if let Some(entry) = ledgered {
            return self.reconcile_diverged(vault, entry).await;
        }

        let Some(requested_at) = vault.recovery_request_timestamp else {
            warn!(vault_id = %vault.id, "Recovering vault has no recovery request timestamp, skipping");
            return Ok(RecoveryOutcome::MissingRequestTimestamp);
        };

        if !self.is_timelock_elapsed(vault, now) {
            debug!(
                vault_id = %vault.id,
                requested_at = %requested_at,
                remaining_secs = (requested_at + self.recovery_delay - now).num_seconds(),
                "Recovery timelock still active"
            );
            return Ok(RecoveryOutcome::TimelockActive);
        }

        let Some(address) = vault.contract_address() else {
            return Err(VaultError::ValidationError(format!(
                "vault {} has no contract address to recover",
                vault.id
            )));
        };

        let contract = cancellable(token, self.contracts.contract_for(vault)).await?;
        let artifact = cancellable(token, contract.load_artifact(&self.contract_name)).await?;

        // Runs to completion even if a stop arrives mid-call
        let tx_hash = match contract
            .execute_method(address, &self.method_signature, &artifact, ExecuteOptions::default())
            .await
        {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                error!(vault_id = %vault.id, "Recovery execution submission failed: {}", e);
                return Err(e);
            }
        };
        info!(vault_id = %vault.id, tx_hash = %tx_hash, "Recovery execution submitted");

        match self.vault_manager.process_recovery_success(vault.id).await {
            Ok(transition) if transition.applied => {
                info!(vault_id = %vault.id, tx_hash = %tx_hash, "Vault recovered");
                Ok(RecoveryOutcome::Recovered)
            }
            Ok(_) => {
                warn!(vault_id = %vault.id, tx_hash = %tx_hash, "Recovery was already recorded by another writer");
                Ok(RecoveryOutcome::AlreadyRecorded)
            }
            Err(e) => Err(self.record_divergence(vault.id, tx_hash, e)),
        }
    }

    /// Ledger entries whose vault is no longer listed as `Recovering`.
    ///
    /// Only a local `Recovered` clears an entry. Any other status means the
    /// chain and the local record disagree for good, so the entry is kept and
    /// escalated. Only `Cancelled` is returned; every other problem is
    /// recorded on the report.
    async fn audit_departed_entries(
        &self,
        recovering: &HashSet<Uuid>,
        report: &mut TickReport,
        token: &CancellationToken,
    ) -> Result<()> {
        let departed: Vec<DivergedRecovery> = self
            .diverged
            .lock()
            .values()
            .filter(|entry| !recovering.contains(&entry.vault_id))
            .cloned()
            .collect();

        for entry in departed {
            let observed = match cancellable(token, self.store.get_by_id(entry.vault_id)).await {
                Ok(vault) if vault.status == VaultStatus::Recovered => {
                    self.diverged.lock().remove(&entry.vault_id);
                    info!(vault_id = %entry.vault_id, tx_hash = %entry.tx_hash, "Diverged recovery recorded by another writer, clearing ledger entry");
                    continue;
                }
                Ok(vault) => {
                    if let Some(ledgered) = self.diverged.lock().get_mut(&entry.vault_id) {
                        ledgered.local_status = vault.status;
                    }
                    format!("local status is {}", vault.status)
                }
                Err(VaultError::Cancelled) => return Err(VaultError::Cancelled),
                Err(e) => format!("local record unreadable: {}", e),
            };

            error!(
                vault_id = %entry.vault_id,
                tx_hash = %entry.tx_hash,
                critical = true,
                "CRITICAL: recovery executed on chain but {}; operator reconciliation required", observed
            );
            report.record_error(VaultError::CriticalDivergence {
                vault_id: entry.vault_id,
                tx_hash: entry.tx_hash,
                reason: observed,
            });
        }
        Ok(())
    }

    async fn reconcile_diverged(&self, vault: &Vault, entry: DivergedRecovery) -> Result<RecoveryOutcome> {
        match self.vault_manager.process_recovery_success(vault.id).await {
            Ok(transition) => {
                self.diverged.lock().remove(&vault.id);
                info!(vault_id = %vault.id, tx_hash = %entry.tx_hash, "Diverged recovery reconciled locally");
                if transition.applied {
                    Ok(RecoveryOutcome::Reconciled)
                } else {
                    Ok(RecoveryOutcome::AlreadyRecorded)
                }
            }
            Err(e) => {
                error!(
                    vault_id = %vault.id,
                    tx_hash = %entry.tx_hash,
                    critical = true,
                    "CRITICAL: vault still diverged, local write retry failed: {}", e
                );
                Err(VaultError::CriticalDivergence {
                    vault_id: vault.id,
                    tx_hash: entry.tx_hash,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn record_divergence(&self, vault_id: Uuid, tx_hash: String, cause: VaultError) -> VaultError {
        error!(
            vault_id = %vault_id,
            tx_hash = %tx_hash,
            critical = true,
            "CRITICAL: recovery executed on chain but local status update failed: {}", cause
        );

        let entry = DivergedRecovery {
            vault_id,
            tx_hash: tx_hash.clone(),
            reason: cause.to_string(),
            local_status: VaultStatus::Recovering,
            detected_at: Utc::now(),
        };
        self.diverged.lock().insert(vault_id, entry);

        VaultError::CriticalDivergence {
            vault_id,
            tx_hash,
            reason: cause.to_string(),
        }
    }
}

#[async_trait]
impl PollingJob for RecoveryMonitor {
    fn name(&self) -> &'static str {
        "recovery_monitor"
    }

    async fn run_tick(&self, token: &CancellationToken) -> TickReport {
        let report = self.process_recovering_vaults(token).await;
        *self.last_report.write() = Some(report.clone());
        report
    }
}
