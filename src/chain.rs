//! On-chain collaborators.
//!
//! The signing client and contract bindings live outside this crate; the
//! monitors only see the traits below.

use crate::database::WalletResolver;
use crate::error::Result;
use crate::models::{ChainType, Vault};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Outcome of looking up a deployment transaction.
///
/// Transient lookup problems are reported as `Err(VaultError::NetworkError)`
/// rather than as a variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentStatus {
    Confirmed(DeploymentReceipt),
    /// Not mined yet, or not visible to the node.
    Pending,
    /// Reverted or confirmed-failed on chain.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentReceipt {
    pub contract_address: Option<String>,
    pub block_number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractArtifact {
    pub contract_name: String,
    pub abi: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub value: u128,
}

/// Signing handle for a wallet.
pub trait SigningWallet: Send + Sync {
    fn chain_type(&self) -> ChainType;
    fn address(&self) -> &str;
}

#[cfg_attr(test, mockall::automock)]
pub trait WalletFactory: Send + Sync {
    fn new_wallet(&self, chain_type: ChainType, address: &str) -> Result<Arc<dyn SigningWallet>>;
}

#[cfg_attr(test, mockall::automock)]
pub trait ContractFactory: Send + Sync {
    fn new_smart_contract(&self, wallet: Arc<dyn SigningWallet>) -> Result<Arc<dyn SmartContract>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmartContract: Send + Sync {
    async fn get_deployment(&self, tx_hash: &str) -> Result<DeploymentStatus>;

    async fn load_artifact(&self, contract_name: &str) -> Result<ContractArtifact>;

    /// Submits a contract call and returns its transaction hash.
    async fn execute_method(
        &self,
        address: &str,
        method_signature: &str,
        abi: &ContractArtifact,
        options: ExecuteOptions,
    ) -> Result<String>;
}

/// Resolves the contract handle a vault's signing wallet acts through.
pub struct ContractResolver {
    wallets: Arc<dyn WalletResolver>,
    wallet_factory: Arc<dyn WalletFactory>,
    contract_factory: Arc<dyn ContractFactory>,
}

impl ContractResolver {
    pub fn new(
        wallets: Arc<dyn WalletResolver>,
        wallet_factory: Arc<dyn WalletFactory>,
        contract_factory: Arc<dyn ContractFactory>,
    ) -> Self {
        Self {
            wallets,
            wallet_factory,
            contract_factory,
        }
    }

    pub async fn contract_for(&self, vault: &Vault) -> Result<Arc<dyn SmartContract>> {
        let wallet = self.wallets.get_by_id(vault.wallet_id).await?;
        debug!(vault_id = %vault.id, wallet_id = %wallet.id, chain = ?wallet.chain_type, "Resolved signing wallet");

        let signer = self.wallet_factory.new_wallet(wallet.chain_type, &wallet.address)?;
        self.contract_factory.new_smart_contract(signer)
    }
}
