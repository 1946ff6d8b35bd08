use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use std::collections::HashSet;
use std::fmt;

use crate::error::{Result, VaultError};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vault {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub chain_type: ChainType,
    pub address: Option<String>,  // Set once deployment confirms
    pub tx_hash: Option<String>,  // Deployment transaction
    pub recovery_address: String,
    pub signers: Vec<String>,
    pub signature_threshold: i32,
    pub status: VaultStatus,
    pub recovery_request_timestamp: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vault_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VaultStatus {
    Pending,
    Deploying,
    Active,
    Recovering,
    Paused,
    Recovered,
    Failed,
}

impl VaultStatus {
    pub const ALL: [VaultStatus; 7] = [
        VaultStatus::Pending,
        VaultStatus::Deploying,
        VaultStatus::Active,
        VaultStatus::Recovering,
        VaultStatus::Paused,
        VaultStatus::Recovered,
        VaultStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VaultStatus::Pending => "pending",
            VaultStatus::Deploying => "deploying",
            VaultStatus::Active => "active",
            VaultStatus::Recovering => "recovering",
            VaultStatus::Paused => "paused",
            VaultStatus::Recovered => "recovered",
            VaultStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "chain_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChainType {
    Ethereum,
    Polygon,
    Arbitrum,
    Base,
}

/// Signing wallet that deploys and executes on behalf of a vault.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub chain_type: ChainType,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultFilter {
    pub status: Option<VaultStatus>,
}

impl VaultFilter {
    pub fn with_status(status: VaultStatus) -> Self {
        Self { status: Some(status) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VaultPage {
    pub vaults: Vec<Vault>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultCreateRequest {
    pub wallet_id: Uuid,
    pub chain_type: ChainType,
    pub recovery_address: String,
    pub signers: Vec<String>,
    pub signature_threshold: i32,
}

impl VaultCreateRequest {
    pub fn validate(&self) -> Result<()> {
        if self.signers.is_empty() {
            return Err(VaultError::ValidationError("at least one signer is required".to_string()));
        }
        if self.signers.iter().any(|s| s.trim().is_empty()) {
            return Err(VaultError::ValidationError("signer address must not be empty".to_string()));
        }
        let unique: HashSet<&str> = self.signers.iter().map(String::as_str).collect();
        if unique.len() != self.signers.len() {
            return Err(VaultError::ValidationError("duplicate signer address".to_string()));
        }
        if self.signature_threshold < 1 || self.signature_threshold as usize > self.signers.len() {
            return Err(VaultError::ValidationError(format!(
                "signature threshold {} must be between 1 and {}",
                self.signature_threshold,
                self.signers.len()
            )));
        }
        if self.recovery_address.trim().is_empty() {
            return Err(VaultError::ValidationError("recovery address is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultResponse {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub chain_type: ChainType,
    pub address: Option<String>,
    pub tx_hash: Option<String>,
    pub recovery_address: String,
    pub signers: Vec<String>,
    pub signature_threshold: i32,
    pub status: VaultStatus,
    pub recovery_request_timestamp: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vault {
    pub fn new_pending(request: VaultCreateRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            wallet_id: request.wallet_id,
            chain_type: request.chain_type,
            address: None,
            tx_hash: None,
            recovery_address: request.recovery_address,
            signers: request.signers,
            signature_threshold: request.signature_threshold,
            status: VaultStatus::Pending,
            recovery_request_timestamp: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Deployment hash, treating an empty string the same as an absent one.
    pub fn deployment_tx_hash(&self) -> Option<&str> {
        self.tx_hash.as_deref().filter(|h| !h.is_empty())
    }

    pub fn contract_address(&self) -> Option<&str> {
        self.address.as_deref().filter(|a| !a.is_empty())
    }

    /// Earliest instant a recovery may be executed, if one was ever requested.
    pub fn recovery_eligible_at(&self, delay: Duration) -> Option<DateTime<Utc>> {
        self.recovery_request_timestamp.map(|requested| requested + delay)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn to_response(&self) -> VaultResponse {
        VaultResponse {
            id: self.id,
            wallet_id: self.wallet_id,
            chain_type: self.chain_type,
            address: self.address.clone(),
            tx_hash: self.tx_hash.clone(),
            recovery_address: self.recovery_address.clone(),
            signers: self.signers.clone(),
            signature_threshold: self.signature_threshold,
            status: self.status,
            recovery_request_timestamp: self.recovery_request_timestamp,
            failure_reason: self.failure_reason.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
