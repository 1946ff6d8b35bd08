use axum::{
    routing::{get, post},
    Router,
    extract::{Path, State, Json},
    response::{Json as JsonResponse, Response},
    http::StatusCode,
};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::{
    DeploymentMonitor, RecoveryMonitor, VaultManager,
    models::{VaultCreateRequest, VaultResponse},
    error::VaultError,
    recovery_monitor::DivergedRecovery,
};

#[derive(Clone)]
pub struct AppState {
    pub vault_manager: Arc<VaultManager>,
    pub deployment_monitor: Arc<DeploymentMonitor>,
    pub recovery_monitor: Arc<RecoveryMonitor>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))

        // Vault lifecycle
        .route("/vaults", post(create_vault))
        .route("/vaults/:vault_id", get(get_vault).delete(delete_vault))
        .route("/vaults/:vault_id/deployment", post(deployment_submitted))
        .route("/vaults/:vault_id/deployment/success", post(deployment_success))
        .route("/vaults/:vault_id/deployment/failure", post(deployment_failure))
        .route("/vaults/:vault_id/recovery/start", post(start_recovery))
        .route("/vaults/:vault_id/recovery/cancel", post(cancel_recovery))
        .route("/vaults/:vault_id/pause", post(pause_vault))
        .route("/vaults/:vault_id/resume", post(resume_vault))

        .with_state(state)
}

// Request/Response DTOs

#[derive(Debug, Serialize, Deserialize)]
pub struct DeploymentSubmittedRequest {
    pub tx_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeploymentSuccessRequest {
    pub contract_address: String,
    pub tx_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeploymentFailureRequest {
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MonitorHealth {
    pub running: bool,
    pub last_checked: Option<usize>,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub deployment_monitor: MonitorHealth,
    pub recovery_monitor: MonitorHealth,
    pub diverged_vaults: Vec<DivergedRecovery>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

// API Handlers

async fn health_check(State(state): State<AppState>) -> JsonResponse<HealthResponse> {
    let diverged_vaults = state.recovery_monitor.diverged_vaults();
    let status = if diverged_vaults.is_empty() { "healthy" } else { "diverged" };

    let deployment_report = state.deployment_monitor.last_report();
    let recovery_report = state.recovery_monitor.last_report();

    JsonResponse(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        deployment_monitor: MonitorHealth {
            running: state.deployment_monitor.is_running(),
            last_checked: deployment_report.as_ref().map(|r| r.checked),
            last_error: deployment_report.and_then(|r| r.first_error).map(|e| e.to_string()),
        },
        recovery_monitor: MonitorHealth {
            running: state.recovery_monitor.is_running(),
            last_checked: recovery_report.as_ref().map(|r| r.checked),
            last_error: recovery_report.and_then(|r| r.first_error).map(|e| e.to_string()),
        },
        diverged_vaults,
    })
}

async fn create_vault(
    State(state): State<AppState>,
    Json(request): Json<VaultCreateRequest>,
) -> Result<(StatusCode, JsonResponse<VaultResponse>), VaultError> {
    info!("Creating vault for wallet: {}", request.wallet_id);
    let vault = state.vault_manager.create_vault(request).await?;
    Ok((StatusCode::CREATED, JsonResponse(vault.to_response())))
}

async fn get_vault(
    State(state): State<AppState>,
    Path(vault_id): Path<Uuid>,
) -> Result<JsonResponse<VaultResponse>, VaultError> {
    let vault = state.vault_manager.get_vault(vault_id).await?;
    Ok(JsonResponse(vault.to_response()))
}

async fn delete_vault(
    State(state): State<AppState>,
    Path(vault_id): Path<Uuid>,
) -> Result<StatusCode, VaultError> {
    state.vault_manager.delete_vault(vault_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn deployment_submitted(
    State(state): State<AppState>,
    Path(vault_id): Path<Uuid>,
    Json(request): Json<DeploymentSubmittedRequest>,
) -> Result<JsonResponse<VaultResponse>, VaultError> {
    let vault = state
        .vault_manager
        .process_vault_deployment_submitted(vault_id, &request.tx_hash)
        .await?;
    Ok(JsonResponse(vault.to_response()))
}

async fn deployment_success(
    State(state): State<AppState>,
    Path(vault_id): Path<Uuid>,
    Json(request): Json<DeploymentSuccessRequest>,
) -> Result<JsonResponse<VaultResponse>, VaultError> {
    let vault = state
        .vault_manager
        .process_vault_deployment_success(vault_id, &request.contract_address, &request.tx_hash)
        .await?;
    Ok(JsonResponse(vault.to_response()))
}

async fn deployment_failure(
    State(state): State<AppState>,
    Path(vault_id): Path<Uuid>,
    Json(request): Json<DeploymentFailureRequest>,
) -> Result<JsonResponse<VaultResponse>, VaultError> {
    let vault = state
        .vault_manager
        .process_vault_deployment_failure(vault_id, &request.reason)
        .await?;
    Ok(JsonResponse(vault.to_response()))
}

async fn start_recovery(
    State(state): State<AppState>,
    Path(vault_id): Path<Uuid>,
) -> Result<JsonResponse<VaultResponse>, VaultError> {
    let vault = state.vault_manager.start_recovery(vault_id).await?;
    Ok(JsonResponse(vault.to_response()))
}

async fn cancel_recovery(
    State(state): State<AppState>,
    Path(vault_id): Path<Uuid>,
) -> Result<JsonResponse<VaultResponse>, VaultError> {
    let vault = state.vault_manager.cancel_recovery(vault_id).await?;
    Ok(JsonResponse(vault.to_response()))
}

async fn pause_vault(
    State(state): State<AppState>,
    Path(vault_id): Path<Uuid>,
) -> Result<JsonResponse<VaultResponse>, VaultError> {
    let vault = state.vault_manager.pause_vault(vault_id).await?;
    Ok(JsonResponse(vault.to_response()))
}

async fn resume_vault(
    State(state): State<AppState>,
    Path(vault_id): Path<Uuid>,
) -> Result<JsonResponse<VaultResponse>, VaultError> {
    let vault = state.vault_manager.resume_vault(vault_id).await?;
    Ok(JsonResponse(vault.to_response()))
}

// Error handling

impl IntoResponse for VaultError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            VaultError::NotFound(_) | VaultError::WalletNotFound(_) => (StatusCode::NOT_FOUND, "Resource not found"),
            VaultError::InvalidStateTransition { .. } => (StatusCode::CONFLICT, "Invalid state transition"),
            VaultError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Validation error"),
            VaultError::NetworkError(_) | VaultError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "Network error"),
            VaultError::OnChainFailure(_) => (StatusCode::BAD_GATEWAY, "On-chain failure"),
            VaultError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            VaultError::CriticalDivergence { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "State divergence"),
            VaultError::ConfigurationError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error"),
        };

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let error_response = ErrorResponse {
            error: error_message.to_string(),
            message: self.to_string(),
        };

        (status, JsonResponse(error_response)).into_response()
    }
}
