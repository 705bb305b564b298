// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet API: deposits, webhook settlement, balance, transfers, history.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{Auth, CanDeposit, CanRead, CanTransfer},
    error::ApiError,
    ledger::{
        money::{format_minor, parse_amount_to_minor},
        LedgerError,
    },
    providers::paystack::PaystackError,
    state::AppState,
    storage::{EntryStatus, EntryType, StoredEntry},
};

/// Header carrying the processor's webhook signature.
const WEBHOOK_SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Request body for deposit initiation.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DepositRequest {
    /// Amount as a decimal string (e.g. "5000" or "5000.00").
    pub amount: String,
}

/// Deposit initiation response. The URL and access code come from the
/// processor verbatim.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DepositResponse {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: String,
}

/// Webhook acknowledgement body.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookAck {
    pub status: bool,
}

/// Deposit settlement status.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DepositStatusResponse {
    pub reference: String,
    pub status: EntryStatus,
    /// Amount as a decimal string.
    pub amount: String,
    /// Amount in minor units.
    pub amount_minor: u64,
}

/// Wallet balance response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BalanceResponse {
    /// Balance as a decimal string.
    pub balance: String,
    /// Balance in minor units.
    pub balance_minor: u64,
}

/// Request body for a peer transfer.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransferRequest {
    /// Recipient's 13-digit wallet number.
    pub wallet_number: String,
    /// Amount as a decimal string.
    pub amount: String,
}

/// Transfer acknowledgement.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferResponse {
    pub status: String,
    pub message: String,
}

/// One transaction in the history listing. Only the counterparty field
/// relevant to the transaction's direction is serialized.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionView {
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub amount: String,
    pub amount_minor: u64,
    pub status: EntryStatus,
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_wallet_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_wallet_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Transaction history response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionView>,
    pub total: usize,
}

fn map_ledger_error(error: LedgerError) -> ApiError {
    match error {
        LedgerError::InvalidAmount(_)
        | LedgerError::SelfTransfer
        | LedgerError::InsufficientFunds { .. }
        | LedgerError::InvalidSignature
        | LedgerError::InvalidPayload(_) => ApiError::bad_request(error.to_string()),
        LedgerError::WalletNotFound
        | LedgerError::RecipientNotFound
        | LedgerError::ReferenceNotFound => ApiError::not_found(error.to_string()),
        LedgerError::Entropy => ApiError::internal(error.to_string()),
        LedgerError::Db(e) => ApiError::internal(format!("Ledger storage failure: {e}")),
    }
}

fn map_gateway_error(error: PaystackError) -> ApiError {
    match error {
        PaystackError::Rejected { message, details } => {
            let detail_suffix = details
                .map(|value| format!(" ({value})"))
                .unwrap_or_default();
            ApiError::service_unavailable(format!(
                "Payment processor rejected the request: {message}{detail_suffix}"
            ))
        }
        PaystackError::Request(message) | PaystackError::InvalidResponse(message) => {
            ApiError::service_unavailable(format!("Payment processor request failed: {message}"))
        }
    }
}

fn to_transaction_view(entry: StoredEntry) -> TransactionView {
    let (recipient, sender) = match entry.entry_type {
        EntryType::TransferOut => (entry.counterparty_wallet_number.clone(), None),
        EntryType::TransferIn => (None, entry.counterparty_wallet_number.clone()),
        EntryType::Deposit => (None, None),
    };
    TransactionView {
        entry_type: entry.entry_type,
        amount: format_minor(entry.amount_minor),
        amount_minor: entry.amount_minor,
        status: entry.status,
        reference: entry.reference,
        recipient_wallet_number: recipient,
        sender_wallet_number: sender,
        created_at: entry.created_at,
    }
}

/// Initiate a deposit via the payment processor.
///
/// The pending ledger entry is written before the processor call; a
/// processor failure surfaces the processor's detail and credits nothing.
#[utoipa::path(
    post,
    path = "/v1/wallet/deposit",
    tag = "Wallet",
    request_body = DepositRequest,
    security(("bearer_auth" = []), ("api_key" = [])),
    responses(
        (status = 201, description = "Deposit initialized", body = DepositResponse),
        (status = 400, description = "Invalid amount or minimum deposit not met"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing deposit permission"),
        (status = 404, description = "Wallet not found"),
        (status = 503, description = "Payment processor unavailable")
    )
)]
pub async fn deposit(
    CanDeposit(ctx): CanDeposit,
    State(state): State<AppState>,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<DepositResponse>), ApiError> {
    let amount_minor =
        parse_amount_to_minor(&request.amount).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let gateway = state
        .gateway
        .as_ref()
        .ok_or_else(|| {
            ApiError::service_unavailable(
                "Payment processor is not configured. Set PAYSTACK_SECRET_KEY.",
            )
        })?
        .clone();

    let pending = state
        .ledger
        .prepare_deposit(&ctx.user_id, amount_minor)
        .map_err(map_ledger_error)?;

    let authorization = gateway
        .initialize_transaction(&pending.email, pending.amount_minor, &pending.reference)
        .await
        .map_err(map_gateway_error)?;

    Ok((
        StatusCode::CREATED,
        Json(DepositResponse {
            reference: pending.reference,
            authorization_url: authorization.authorization_url,
            access_code: authorization.access_code,
        }),
    ))
}

/// Processor webhook endpoint.
///
/// No request authorization; the HMAC-SHA512 signature over the raw body is
/// the credential. Unknown references and replays acknowledge as no-ops.
#[utoipa::path(
    post,
    path = "/v1/wallet/paystack/webhook",
    tag = "Wallet",
    request_body(content = String, description = "Raw webhook payload (HMAC-signed)", content_type = "application/json"),
    responses(
        (status = 200, description = "Webhook processed", body = WebhookAck),
        (status = 400, description = "Invalid signature")
    )
)]
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing x-paystack-signature header"))?;

    state
        .ledger
        .settle_webhook(&body, signature)
        .map_err(map_ledger_error)?;

    Ok(Json(WebhookAck { status: true }))
}

/// Check the status of a deposit by reference.
#[utoipa::path(
    get,
    path = "/v1/wallet/deposit/{reference}/status",
    tag = "Wallet",
    params(
        ("reference" = String, Path, description = "Transaction reference")
    ),
    security(("bearer_auth" = []), ("api_key" = [])),
    responses(
        (status = 200, description = "Deposit status", body = DepositStatusResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Transaction not found")
    )
)]
pub async fn deposit_status(
    Auth(_ctx): Auth,
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<DepositStatusResponse>, ApiError> {
    let status = state
        .ledger
        .deposit_status(&reference)
        .map_err(map_ledger_error)?;

    Ok(Json(DepositStatusResponse {
        reference: status.reference,
        status: status.status,
        amount: format_minor(status.amount_minor),
        amount_minor: status.amount_minor,
    }))
}

/// Get the current wallet balance.
#[utoipa::path(
    get,
    path = "/v1/wallet/balance",
    tag = "Wallet",
    security(("bearer_auth" = []), ("api_key" = [])),
    responses(
        (status = 200, description = "Balance retrieved", body = BalanceResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing read permission"),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn balance(
    CanRead(ctx): CanRead,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance_minor = state.ledger.balance(&ctx.user_id).map_err(map_ledger_error)?;

    Ok(Json(BalanceResponse {
        balance: format_minor(balance_minor),
        balance_minor,
    }))
}

/// Transfer funds to another wallet by wallet number.
#[utoipa::path(
    post,
    path = "/v1/wallet/transfer",
    tag = "Wallet",
    request_body = TransferRequest,
    security(("bearer_auth" = []), ("api_key" = [])),
    responses(
        (status = 200, description = "Transfer completed", body = TransferResponse),
        (status = 400, description = "Invalid amount, insufficient balance, or self transfer"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing transfer permission"),
        (status = 404, description = "Sender or recipient wallet not found")
    )
)]
pub async fn transfer(
    CanTransfer(ctx): CanTransfer,
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    let amount_minor =
        parse_amount_to_minor(&request.amount).map_err(|e| ApiError::bad_request(e.to_string()))?;

    state
        .ledger
        .transfer(&ctx.user_id, &request.wallet_number, amount_minor)
        .map_err(map_ledger_error)?;

    Ok(Json(TransferResponse {
        status: "success".to_string(),
        message: "Transfer completed".to_string(),
    }))
}

/// Transaction history, newest first.
#[utoipa::path(
    get,
    path = "/v1/wallet/transactions",
    tag = "Wallet",
    security(("bearer_auth" = []), ("api_key" = [])),
    responses(
        (status = 200, description = "Transaction history", body = TransactionListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing read permission"),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn transactions(
    CanRead(ctx): CanRead,
    State(state): State<AppState>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    let entries = state
        .ledger
        .transactions(&ctx.user_id)
        .map_err(map_ledger_error)?;

    let transactions: Vec<TransactionView> = entries.into_iter().map(to_transaction_view).collect();

    Ok(Json(TransactionListResponse {
        total: transactions.len(),
        transactions,
    }))
}
