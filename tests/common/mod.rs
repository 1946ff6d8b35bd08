#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use custody_vault_backend::chain::{
    ContractArtifact, ContractFactory, DeploymentReceipt, DeploymentStatus, ExecuteOptions, SigningWallet,
    SmartContract, WalletFactory,
};
use custody_vault_backend::{
    ChainType, MonitorConfig, Result, Vault, VaultCreateRequest, VaultError, VaultFilter, VaultPage,
    VaultService, VaultStatus, VaultStore, Wallet, WalletResolver,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// In-memory vault store honouring the soft-delete invariant.
#[derive(Default)]
pub struct InMemoryVaultStore {
    vaults: Mutex<HashMap<Uuid, Vault>>,
    order: Mutex<Vec<Uuid>>,
    pub fail_updates: AtomicBool,
    pub fail_lists: AtomicBool,
    pub update_calls: AtomicUsize,
}

impl InMemoryVaultStore {
    /// Inserts or overwrites, keeping first-insertion order for listings.
    pub fn insert(&self, vault: Vault) {
        let mut order = self.order.lock();
        if !order.contains(&vault.id) {
            order.push(vault.id);
        }
        self.vaults.lock().insert(vault.id, vault);
    }

    /// Raw read, including soft-deleted rows.
    pub fn snapshot(&self, id: Uuid) -> Vault {
        self.vaults.lock().get(&id).cloned().expect("vault exists")
    }
}

#[async_trait]
impl VaultStore for InMemoryVaultStore {
    async fn create(&self, vault: &Vault) -> Result<Vault> {
        self.insert(vault.clone());
        Ok(vault.clone())
    }

    async fn list(&self, filter: &VaultFilter, limit: Option<i64>, page_token: Option<String>) -> Result<VaultPage> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(VaultError::DatabaseError("list unavailable".to_string()));
        }
        let offset: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let order = self.order.lock().clone();
        let vaults = self.vaults.lock();
        let matching: Vec<Vault> = order
            .iter()
            .filter_map(|id| vaults.get(id))
            .filter(|v| !v.is_deleted())
            .filter(|v| filter.status.map_or(true, |s| v.status == s))
            .skip(offset)
            .take(limit.map(|l| l as usize).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(VaultPage {
            vaults: matching,
            next_page_token: None,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Vault> {
        self.vaults
            .lock()
            .get(&id)
            .filter(|v| !v.is_deleted())
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("Vault {} not found", id)))
    }

    async fn update(&self, id: Uuid, vault: &Vault) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(VaultError::DatabaseError("update failed".to_string()));
        }
        let mut vaults = self.vaults.lock();
        match vaults.get_mut(&id) {
            Some(existing) if !existing.is_deleted() => {
                *existing = vault.clone();
                Ok(())
            }
            _ => Err(VaultError::NotFound(format!("Vault {} not found", id))),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut vaults = self.vaults.lock();
        match vaults.get_mut(&id) {
            Some(existing) if !existing.is_deleted() => {
                existing.deleted_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(VaultError::NotFound(format!("Vault {} not found", id))),
        }
    }
}

#[derive(Default)]
pub struct FakeWallets {
    wallets: Mutex<HashMap<Uuid, Wallet>>,
    pub lookups: AtomicUsize,
}

impl FakeWallets {
    pub fn add(&self) -> Uuid {
        let wallet = Wallet {
            id: Uuid::new_v4(),
            chain_type: ChainType::Ethereum,
            address: "0xsigner".to_string(),
        };
        let id = wallet.id;
        self.wallets.lock().insert(id, wallet);
        id
    }
}

#[async_trait]
impl WalletResolver for FakeWallets {
    async fn get_by_id(&self, wallet_id: Uuid) -> Result<Wallet> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.wallets
            .lock()
            .get(&wallet_id)
            .cloned()
            .ok_or(VaultError::WalletNotFound(wallet_id))
    }
}

pub struct FakeSigner {
    chain_type: ChainType,
    address: String,
}

impl SigningWallet for FakeSigner {
    fn chain_type(&self) -> ChainType {
        self.chain_type
    }

    fn address(&self) -> &str {
        &self.address
    }
}

pub struct FakeWalletFactory;

impl WalletFactory for FakeWalletFactory {
    fn new_wallet(&self, chain_type: ChainType, address: &str) -> Result<Arc<dyn SigningWallet>> {
        Ok(Arc::new(FakeSigner {
            chain_type,
            address: address.to_string(),
        }))
    }
}

/// Scripted chain: deployment results keyed by tx hash, recorded executions.
#[derive(Default)]
pub struct FakeChain {
    deployments: Mutex<HashMap<String, Result<DeploymentStatus>>>,
    pub deployment_lookups: AtomicUsize,
    pub executions: Mutex<Vec<(String, String)>>,
    pub fail_executions: AtomicBool,
    pub next_execution_hash: Mutex<String>,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        let chain = Self::default();
        *chain.next_execution_hash.lock() = "0xdef".to_string();
        Arc::new(chain)
    }

    pub fn set_deployment(&self, tx_hash: &str, result: Result<DeploymentStatus>) {
        self.deployments.lock().insert(tx_hash.to_string(), result);
    }

    pub fn confirm(&self, tx_hash: &str, contract_address: Option<&str>, block_number: u64) {
        self.set_deployment(
            tx_hash,
            Ok(DeploymentStatus::Confirmed(DeploymentReceipt {
                contract_address: contract_address.map(str::to_string),
                block_number,
            })),
        );
    }

    pub fn execution_count(&self) -> usize {
        self.executions.lock().len()
    }
}

struct FakeContract {
    chain: Arc<FakeChain>,
}

#[async_trait]
impl SmartContract for FakeContract {
    async fn get_deployment(&self, tx_hash: &str) -> Result<DeploymentStatus> {
        self.chain.deployment_lookups.fetch_add(1, Ordering::SeqCst);
        self.chain
            .deployments
            .lock()
            .get(tx_hash)
            .cloned()
            .unwrap_or(Ok(DeploymentStatus::Pending))
    }

    async fn load_artifact(&self, contract_name: &str) -> Result<ContractArtifact> {
        Ok(ContractArtifact {
            contract_name: contract_name.to_string(),
            abi: serde_json::json!([]),
        })
    }

    async fn execute_method(
        &self,
        address: &str,
        method_signature: &str,
        _abi: &ContractArtifact,
        _options: ExecuteOptions,
    ) -> Result<String> {
        if self.chain.fail_executions.load(Ordering::SeqCst) {
            return Err(VaultError::NetworkError("rpc timeout".to_string()));
        }
        self.chain
            .executions
            .lock()
            .push((address.to_string(), method_signature.to_string()));
        Ok(self.chain.next_execution_hash.lock().clone())
    }
}

pub struct FakeContractFactory {
    pub chain: Arc<FakeChain>,
}

impl ContractFactory for FakeContractFactory {
    fn new_smart_contract(&self, _wallet: Arc<dyn SigningWallet>) -> Result<Arc<dyn SmartContract>> {
        Ok(Arc::new(FakeContract {
            chain: self.chain.clone(),
        }))
    }
}

pub struct Harness {
    pub store: Arc<InMemoryVaultStore>,
    pub wallets: Arc<FakeWallets>,
    pub chain: Arc<FakeChain>,
    pub service: VaultService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(MonitorConfig::default())
    }

    pub fn with_config(config: MonitorConfig) -> Self {
        let store = Arc::new(InMemoryVaultStore::default());
        let wallets = Arc::new(FakeWallets::default());
        let chain = FakeChain::new();
        let service = VaultService::new(
            &config,
            store.clone(),
            wallets.clone(),
            Arc::new(FakeWalletFactory),
            Arc::new(FakeContractFactory { chain: chain.clone() }),
        );
        Self {
            store,
            wallets,
            chain,
            service,
        }
    }

    pub fn seed(&self, status: VaultStatus) -> Vault {
        let mut vault = Vault::new_pending(VaultCreateRequest {
            wallet_id: self.wallets.add(),
            chain_type: ChainType::Ethereum,
            recovery_address: "0xrecovery".to_string(),
            signers: vec!["0xa".to_string(), "0xb".to_string(), "0xc".to_string()],
            signature_threshold: 2,
        });
        vault.status = status;
        self.store.insert(vault.clone());
        vault
    }

    pub fn seed_deploying(&self, tx_hash: &str) -> Vault {
        let mut vault = self.seed(VaultStatus::Deploying);
        vault.tx_hash = Some(tx_hash.to_string());
        self.store.insert(vault.clone());
        vault
    }

    pub fn seed_recovering(&self, requested_ago: Option<Duration>) -> Vault {
        let mut vault = self.seed(VaultStatus::Recovering);
        vault.address = Some("0xvault".to_string());
        vault.tx_hash = Some("0xdeploy".to_string());
        vault.recovery_request_timestamp = requested_ago.map(|ago| Utc::now() - ago);
        self.store.insert(vault.clone());
        vault
    }
}
