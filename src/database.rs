use crate::error::{Result, VaultError};
use crate::models::{Vault, VaultFilter, VaultPage, Wallet};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use tracing::{debug, info};

/// Persistence contract for vault records.
///
/// Implementations must exclude soft-deleted rows from every read path and
/// from `update`; callers never filter on `deleted_at` themselves.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VaultStore: Send + Sync {
    async fn create(&self, vault: &Vault) -> Result<Vault>;

    /// `limit = None` returns every matching row.
    async fn list(&self, filter: &VaultFilter, limit: Option<i64>, page_token: Option<String>) -> Result<VaultPage>;

    async fn get_by_id(&self, id: Uuid) -> Result<Vault>;

    async fn update(&self, id: Uuid, vault: &Vault) -> Result<()>;

    async fn soft_delete(&self, id: Uuid) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletResolver: Send + Sync {
    async fn get_by_id(&self, wallet_id: Uuid) -> Result<Wallet>;
}

const VAULT_COLUMNS: &str = "id, wallet_id, chain_type, address, tx_hash, recovery_address, signers, \
     signature_threshold, status, recovery_request_timestamp, failure_reason, created_at, updated_at, deleted_at";

/// Every vault read goes through here so soft-deleted rows never escape.
fn select_live_vaults(condition: &str) -> String {
    format!(
        "SELECT {} FROM vaults WHERE deleted_at IS NULL AND {}",
        VAULT_COLUMNS, condition
    )
}

fn parse_page_token(page_token: Option<&str>) -> Result<i64> {
    match page_token {
        None => Ok(0),
        Some(token) => token
            .parse::<i64>()
            .ok()
            .filter(|offset| *offset >= 0)
            .ok_or_else(|| VaultError::ValidationError(format!("invalid page token: {}", token))),
    }
}

/// Postgres-backed vault repository
pub struct VaultRepository {
    pool: PgPool,
}

impl VaultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VaultStore for VaultRepository {
    async fn create(&self, vault: &Vault) -> Result<Vault> {
        let sql = format!(
            r#"
            INSERT INTO vaults ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NULL)
            RETURNING {cols}
            "#,
            cols = VAULT_COLUMNS
        );

        let created = sqlx::query_as::<_, Vault>(&sql)
            .bind(vault.id)
            .bind(vault.wallet_id)
            .bind(vault.chain_type)
            .bind(vault.address.as_deref())
            .bind(vault.tx_hash.as_deref())
            .bind(vault.recovery_address.as_str())
            .bind(vault.signers.clone())
            .bind(vault.signature_threshold)
            .bind(vault.status)
            .bind(vault.recovery_request_timestamp)
            .bind(vault.failure_reason.as_deref())
            .bind(vault.created_at)
            .bind(vault.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VaultError::DatabaseError(format!("Failed to create vault: {}", e)))?;

        info!(vault_id = %created.id, "Created vault");
        Ok(created)
    }

    async fn list(&self, filter: &VaultFilter, limit: Option<i64>, page_token: Option<String>) -> Result<VaultPage> {
        let offset = parse_page_token(page_token.as_deref())?;
        // LIMIT NULL is LIMIT ALL in Postgres
        let sql = format!(
            "{} ORDER BY created_at ASC, id ASC LIMIT $2 OFFSET $3",
            select_live_vaults("($1::vault_status IS NULL OR status = $1)")
        );

        let vaults = sqlx::query_as::<_, Vault>(&sql)
            .bind(filter.status)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VaultError::DatabaseError(format!("Failed to list vaults: {}", e)))?;

        let next_page_token = match limit {
            Some(limit) if vaults.len() as i64 == limit => Some((offset + limit).to_string()),
            _ => None,
        };

        debug!(count = vaults.len(), status = ?filter.status, "Listed vaults");
        Ok(VaultPage { vaults, next_page_token })
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Vault> {
        let sql = select_live_vaults("id = $1");

        sqlx::query_as::<_, Vault>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VaultError::DatabaseError(format!("Failed to load vault {}: {}", id, e)))?
            .ok_or_else(|| VaultError::NotFound(format!("Vault {} not found", id)))
    }

    async fn update(&self, id: Uuid, vault: &Vault) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE vaults
            SET status = $2, address = $3, tx_hash = $4, recovery_request_timestamp = $5,
                failure_reason = $6, updated_at = $7
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(vault.status)
        .bind(vault.address.as_deref())
        .bind(vault.tx_hash.as_deref())
        .bind(vault.recovery_request_timestamp)
        .bind(vault.failure_reason.as_deref())
        .bind(vault.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::DatabaseError(format!("Failed to update vault {}: {}", id, e)))?;

        if result.rows_affected() == 0 {
            return Err(VaultError::NotFound(format!("Vault {} not found", id)));
        }

        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE vaults
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::DatabaseError(format!("Failed to delete vault {}: {}", id, e)))?;

        if result.rows_affected() == 0 {
            return Err(VaultError::NotFound(format!("Vault {} not found", id)));
        }

        info!(vault_id = %id, "Soft-deleted vault");
        Ok(())
    }
}

/// Postgres-backed lookup of signing wallets
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletResolver for WalletRepository {
    async fn get_by_id(&self, wallet_id: Uuid) -> Result<Wallet> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, chain_type, address
            FROM wallets
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VaultError::DatabaseError(format!("Failed to load wallet {}: {}", wallet_id, e)))?
        .ok_or(VaultError::WalletNotFound(wallet_id))
    }
}
