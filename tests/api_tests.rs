mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Duration;
use common::Harness;
use custody_vault_backend::api::create_router;
use custody_vault_backend::VaultStatus;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn router(harness: &Harness) -> Router {
    create_router(harness.service.app_state())
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_reports_idle_monitors() {
    let harness = Harness::new();

    let (status, body) = send(router(&harness), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["deployment_monitor"]["running"], false);
    assert_eq!(body["recovery_monitor"]["running"], false);
    assert_eq!(body["diverged_vaults"], json!([]));
}

#[tokio::test]
async fn test_health_reports_divergence() {
    let harness = Harness::new();
    let vault = harness.seed_recovering(Some(Duration::hours(100)));
    harness.store.fail_updates.store(true, Ordering::SeqCst);
    harness
        .service
        .recovery_monitor()
        .process_recovering_vaults(&CancellationToken::new())
        .await;

    let (status, body) = send(router(&harness), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "diverged");
    assert_eq!(body["diverged_vaults"][0]["vault_id"], vault.id.to_string());
    assert_eq!(body["diverged_vaults"][0]["tx_hash"], "0xdef");
}

#[tokio::test]
async fn test_health_keeps_divergence_after_cancel() {
    let harness = Harness::new();
    let vault = harness.seed_recovering(Some(Duration::hours(100)));
    let token = CancellationToken::new();
    harness.store.fail_updates.store(true, Ordering::SeqCst);
    harness.service.recovery_monitor().process_recovering_vaults(&token).await;
    harness.store.fail_updates.store(false, Ordering::SeqCst);

    let (status, _) = send(router(&harness), "POST", &format!("/vaults/{}/recovery/cancel", vault.id), None).await;
    assert_eq!(status, StatusCode::OK);
    harness.service.recovery_monitor().process_recovering_vaults(&token).await;

    let (_, body) = send(router(&harness), "GET", "/health", None).await;
    assert_eq!(body["status"], "diverged");
    assert_eq!(body["diverged_vaults"][0]["local_status"], "active");
}

#[tokio::test]
async fn test_create_and_fetch_vault() {
    let harness = Harness::new();
    let wallet_id = harness.wallets.add();

    let (status, created) = send(
        router(&harness),
        "POST",
        "/vaults",
        Some(json!({
            "wallet_id": wallet_id,
            "chain_type": "base",
            "recovery_address": "0xrecovery",
            "signers": ["0xa", "0xb"],
            "signature_threshold": 2
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    let vault_id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = send(router(&harness), "GET", &format!("/vaults/{}", vault_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["chain_type"], "base");
    assert_eq!(fetched["signature_threshold"], 2);
}

#[tokio::test]
async fn test_create_rejects_invalid_threshold() {
    let harness = Harness::new();

    let (status, body) = send(
        router(&harness),
        "POST",
        "/vaults",
        Some(json!({
            "wallet_id": uuid::Uuid::new_v4(),
            "chain_type": "ethereum",
            "recovery_address": "0xrecovery",
            "signers": ["0xa"],
            "signature_threshold": 5
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation error");
}

#[tokio::test]
async fn test_deployment_callbacks_drive_lifecycle() {
    let harness = Harness::new();
    let vault = harness.seed(VaultStatus::Pending);
    let base = format!("/vaults/{}", vault.id);

    let (status, body) = send(
        router(&harness),
        "POST",
        &format!("{}/deployment", base),
        Some(json!({ "tx_hash": "0xtx" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "deploying");

    let (status, body) = send(
        router(&harness),
        "POST",
        &format!("{}/deployment/success", base),
        Some(json!({ "contract_address": "0xabc", "tx_hash": "0xtx" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(body["address"], "0xabc");

    // Repeating the callback is harmless
    let (status, _) = send(
        router(&harness),
        "POST",
        &format!("{}/deployment/success", base),
        Some(json!({ "contract_address": "0xabc", "tx_hash": "0xtx" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(router(&harness), "POST", &format!("{}/recovery/start", base), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "recovering");
    assert!(body["recovery_request_timestamp"].is_string());

    let (status, body) = send(router(&harness), "POST", &format!("{}/recovery/cancel", base), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn test_invalid_transition_is_conflict() {
    let harness = Harness::new();
    let vault = harness.seed(VaultStatus::Failed);

    let (status, body) = send(router(&harness), "POST", &format!("/vaults/{}/pause", vault.id), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Invalid state transition");
    assert_eq!(harness.store.snapshot(vault.id).status, VaultStatus::Failed);
}

#[tokio::test]
async fn test_deployment_failure_records_reason() {
    let harness = Harness::new();
    let vault = harness.seed_deploying("0xtx");

    let (status, body) = send(
        router(&harness),
        "POST",
        &format!("/vaults/{}/deployment/failure", vault.id),
        Some(json!({ "reason": "out of gas" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["failure_reason"], "out of gas");
}

#[tokio::test]
async fn test_deleted_vault_is_not_found() {
    let harness = Harness::new();
    let vault = harness.seed(VaultStatus::Active);
    let uri = format!("/vaults/{}", vault.id);

    let (status, _) = send(router(&harness), "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(router(&harness), "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Resource not found");

    let (status, _) = send(router(&harness), "POST", &format!("{}/pause", uri), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let harness = Harness::new();
    let vault = harness.seed(VaultStatus::Active);
    let base = format!("/vaults/{}", vault.id);

    let (status, body) = send(router(&harness), "POST", &format!("{}/pause", base), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paused");

    let (status, body) = send(router(&harness), "POST", &format!("{}/resume", base), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
}
