use thiserror::Error;
use uuid::Uuid;

use crate::models::VaultStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VaultError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Vault not found: {0}")]
    NotFound(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    #[error("Invalid state transition for vault {vault_id}: {from} -> {to}")]
    InvalidStateTransition {
        vault_id: Uuid,
        from: VaultStatus,
        to: VaultStatus,
    },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("On-chain failure: {0}")]
    OnChainFailure(String),

    #[error("CRITICAL divergence on vault {vault_id} (tx {tx_hash}): {reason}")]
    CriticalDivergence {
        vault_id: Uuid,
        tx_hash: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl VaultError {
    /// Errors that leave vault state untouched and are retried on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, VaultError::NetworkError(_) | VaultError::DatabaseError(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound(_) | VaultError::WalletNotFound(_))
    }
}

impl From<sqlx::Error> for VaultError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => VaultError::NotFound("row not found".to_string()),
            other => VaultError::DatabaseError(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for VaultError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        VaultError::DatabaseError(format!("migration failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
