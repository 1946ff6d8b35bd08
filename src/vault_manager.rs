use crate::database::VaultStore;
use crate::error::{Result, VaultError};
use crate::models::{Vault, VaultCreateRequest, VaultStatus};
use crate::state_machine::can_transition;
use chrono::Utc;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a lifecycle event.
#[derive(Debug, Clone)]
pub struct Transition {
    pub vault: Vault,
    /// `false` when the vault was already in the target status and nothing was written
    pub applied: bool,
}

impl Transition {
    pub fn into_vault(self) -> Vault {
        self.vault
    }
}

impl Deref for Transition {
    type Target = Vault;

    fn deref(&self) -> &Vault {
        &self.vault
    }
}

/// The only write path for vault status.
///
/// Every lifecycle event loads the current record, checks the transition
/// table and persists with a single update. Concurrent writers are not
/// locked out: whichever write lands first wins and the loser receives
/// `InvalidStateTransition`, which callers must be prepared to handle.
pub struct VaultManager {
    store: Arc<dyn VaultStore>,
}

impl VaultManager {
    pub fn new(store: Arc<dyn VaultStore>) -> Self {
        Self { store }
    }

    /// Persist a new vault in `Pending`
    pub async fn create_vault(&self, request: VaultCreateRequest) -> Result<Vault> {
        request.validate()?;
        let vault = self.store.create(&Vault::new_pending(request)).await?;
        info!(vault_id = %vault.id, signers = vault.signers.len(), threshold = vault.signature_threshold, "Vault created");
        Ok(vault)
    }

    pub async fn get_vault(&self, vault_id: Uuid) -> Result<Vault> {
        self.store.get_by_id(vault_id).await
    }

    pub async fn delete_vault(&self, vault_id: Uuid) -> Result<()> {
        self.store.soft_delete(vault_id).await
    }

    /// Deployment transaction was broadcast: `Pending -> Deploying`.
    pub async fn process_vault_deployment_submitted(&self, vault_id: Uuid, tx_hash: &str) -> Result<Transition> {
        if tx_hash.trim().is_empty() {
            return Err(VaultError::ValidationError("deployment transaction hash is required".to_string()));
        }
        let tx_hash = tx_hash.to_string();
        self.apply_transition(vault_id, VaultStatus::Deploying, move |vault| {
            vault.tx_hash = Some(tx_hash);
        })
        .await
    }

    pub async fn process_vault_deployment_success(
        &self,
        vault_id: Uuid,
        contract_address: &str,
        tx_hash: &str,
    ) -> Result<Transition> {
        if contract_address.trim().is_empty() {
            return Err(VaultError::ValidationError("contract address is required".to_string()));
        }
        let contract_address = contract_address.to_string();
        let tx_hash = (!tx_hash.is_empty()).then(|| tx_hash.to_string());
        self.apply_transition(vault_id, VaultStatus::Active, move |vault| {
            vault.address = Some(contract_address);
            if tx_hash.is_some() {
                vault.tx_hash = tx_hash;
            }
        })
        .await
    }

    pub async fn process_vault_deployment_failure(&self, vault_id: Uuid, reason: &str) -> Result<Transition> {
        self.fail(vault_id, reason).await
    }

    /// `Active | Paused -> Recovering`; starts the timelock.
    pub async fn start_recovery(&self, vault_id: Uuid) -> Result<Transition> {
        self.apply_transition(vault_id, VaultStatus::Recovering, |vault| {
            vault.recovery_request_timestamp = Some(Utc::now());
        })
        .await
    }

    /// Owner cancelled a pending recovery. The request timestamp is kept.
    pub async fn cancel_recovery(&self, vault_id: Uuid) -> Result<Transition> {
        self.apply_transition_from(vault_id, Some(VaultStatus::Recovering), VaultStatus::Active, |_| {})
            .await
    }

    pub async fn process_recovery_success(&self, vault_id: Uuid) -> Result<Transition> {
        self.apply_transition(vault_id, VaultStatus::Recovered, |_| {}).await
    }

    pub async fn process_recovery_failure(&self, vault_id: Uuid, reason: &str) -> Result<Transition> {
        self.fail(vault_id, reason).await
    }

    pub async fn pause_vault(&self, vault_id: Uuid) -> Result<Transition> {
        self.apply_transition(vault_id, VaultStatus::Paused, |_| {}).await
    }

    pub async fn resume_vault(&self, vault_id: Uuid) -> Result<Transition> {
        self.apply_transition_from(vault_id, Some(VaultStatus::Paused), VaultStatus::Active, |_| {})
            .await
    }

    async fn fail(&self, vault_id: Uuid, reason: &str) -> Result<Transition> {
        let reason = reason.to_string();
        self.apply_transition(vault_id, VaultStatus::Failed, move |vault| {
            vault.failure_reason = Some(reason);
        })
        .await
    }

    async fn apply_transition<F>(&self, vault_id: Uuid, target: VaultStatus, mutate: F) -> Result<Transition>
    where
        F: FnOnce(&mut Vault) + Send,
    {
        self.apply_transition_from(vault_id, None, target, mutate).await
    }

    /// `required_from` narrows the legal sources for events that share a
    /// target, e.g. cancel-recovery and resume both land on `Active`.
    async fn apply_transition_from<F>(
        &self,
        vault_id: Uuid,
        required_from: Option<VaultStatus>,
        target: VaultStatus,
        mutate: F,
    ) -> Result<Transition>
    where
        F: FnOnce(&mut Vault) + Send,
    {
        let mut vault = self.store.get_by_id(vault_id).await?;
        let current = vault.status;

        if !can_transition(current, target) {
            if current == target {
                debug!(vault_id = %vault_id, status = %current, "Vault already in target status");
                return Ok(Transition { vault, applied: false });
            }
            warn!(vault_id = %vault_id, from = %current, to = %target, "Rejected invalid state transition");
            return Err(VaultError::InvalidStateTransition {
                vault_id,
                from: current,
                to: target,
            });
        }

        if required_from.is_some_and(|required| required != current) {
            warn!(vault_id = %vault_id, from = %current, to = %target, "Transition not allowed for this event");
            return Err(VaultError::InvalidStateTransition {
                vault_id,
                from: current,
                to: target,
            });
        }

        vault.status = target;
        mutate(&mut vault);
        vault.updated_at = Utc::now();

        // Persistence errors go back verbatim; the caller decides on retry
        self.store.update(vault_id, &vault).await?;

        info!(vault_id = %vault_id, from = %current, to = %target, "Vault status updated");
        Ok(Transition { vault, applied: true })
    }
}
