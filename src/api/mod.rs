// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

pub mod health;
pub mod keys;
pub mod wallet;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/wallet/deposit", post(wallet::deposit))
        .route("/wallet/paystack/webhook", post(wallet::paystack_webhook))
        .route(
            "/wallet/deposit/{reference}/status",
            get(wallet::deposit_status),
        )
        .route("/wallet/balance", get(wallet::balance))
        .route("/wallet/transfer", post(wallet::transfer))
        .route("/wallet/transactions", get(wallet::transactions))
        .route("/keys", post(keys::create_key).get(keys::list_keys))
        .route("/keys/rollover", post(keys::rollover_key))
        .route("/keys/{key_id}/revoke", delete(keys::revoke_key))
        .with_state(state);

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        wallet::deposit,
        wallet::paystack_webhook,
        wallet::deposit_status,
        wallet::balance,
        wallet::transfer,
        wallet::transactions,
        keys::create_key,
        keys::rollover_key,
        keys::revoke_key,
        keys::list_keys
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            wallet::DepositRequest,
            wallet::DepositResponse,
            wallet::WebhookAck,
            wallet::DepositStatusResponse,
            wallet::BalanceResponse,
            wallet::TransferRequest,
            wallet::TransferResponse,
            wallet::TransactionView,
            wallet::TransactionListResponse,
            keys::CreateKeyRequest,
            keys::CreatedKeyResponse,
            keys::RolloverKeyRequest,
            keys::RolledKeyResponse,
            keys::RevokeResponse,
            keys::KeyListResponse,
            crate::auth::Permission,
            crate::keys::ApiKeySummary,
            crate::storage::EntryType,
            crate::storage::EntryStatus
        )
    ),
    tags(
        (name = "Health", description = "Service health probes"),
        (name = "Wallet", description = "Deposits, transfers, balances, and history"),
        (name = "Keys", description = "API-key lifecycle")
    )
)]
struct ApiDoc;
