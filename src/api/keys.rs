// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! API-key management endpoints.
//!
//! All routes require a session token — an API key cannot manage API keys.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{Permission, SessionOnly},
    error::ApiError,
    keys::{ApiKeySummary, ExpiryPeriod, KeyError},
    state::AppState,
};

/// Request body for key creation.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateKeyRequest {
    /// Human label for the key.
    pub name: String,
    /// Permissions drawn from {deposit, transfer, read}.
    pub permissions: Vec<String>,
    /// Expiry code: 1H, 1D, 1M, or 1Y.
    pub expiry: String,
}

/// Key creation response. `key` is the plaintext secret, shown exactly once.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreatedKeyResponse {
    pub id: String,
    pub name: String,
    /// The raw secret. Not retrievable again.
    pub key: String,
    pub permissions: Vec<Permission>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Request body for key rollover.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RolloverKeyRequest {
    pub expired_key_id: String,
    /// Expiry code: 1H, 1D, 1M, or 1Y.
    pub expiry: String,
}

/// Rollover response. Permissions are inherited from the expired key.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RolledKeyResponse {
    pub id: String,
    /// The new raw secret. Not retrievable again.
    pub api_key: String,
    pub expires_at: DateTime<Utc>,
    pub permissions: Vec<Permission>,
}

/// Revocation acknowledgement.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RevokeResponse {
    pub message: String,
}

/// Key listing response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KeyListResponse {
    pub api_keys: Vec<ApiKeySummary>,
}

fn parse_permissions(raw: &[String]) -> Result<Vec<Permission>, ApiError> {
    let mut permissions = Vec::with_capacity(raw.len());
    let mut invalid = Vec::new();
    for name in raw {
        match Permission::from_str(name) {
            Some(permission) => permissions.push(permission),
            None => invalid.push(name.as_str()),
        }
    }
    if !invalid.is_empty() {
        return Err(ApiError::bad_request(format!(
            "Invalid permissions: {}",
            invalid.join(", ")
        )));
    }
    Ok(permissions)
}

fn parse_expiry(code: &str) -> Result<ExpiryPeriod, ApiError> {
    ExpiryPeriod::from_code(code).ok_or_else(|| ApiError::bad_request("Invalid expiry"))
}

fn map_key_error(error: KeyError) -> ApiError {
    match error {
        KeyError::QuotaExceeded => ApiError::conflict(error.to_string()),
        KeyError::EmptyPermissions | KeyError::NotYetExpired => {
            ApiError::bad_request(error.to_string())
        }
        KeyError::NotFound => ApiError::not_found(error.to_string()),
        KeyError::Entropy => ApiError::internal(error.to_string()),
        KeyError::Db(e) => ApiError::internal(format!("Key storage failure: {e}")),
    }
}

/// Create a new API key. The plaintext secret is returned exactly once.
#[utoipa::path(
    post,
    path = "/v1/keys",
    tag = "Keys",
    request_body = CreateKeyRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "API key created", body = CreatedKeyResponse),
        (status = 400, description = "Invalid permissions or expiry"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Active key quota reached")
    )
)]
pub async fn create_key(
    SessionOnly(ctx): SessionOnly,
    State(state): State<AppState>,
    Json(request): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<CreatedKeyResponse>), ApiError> {
    let permissions = parse_permissions(&request.permissions)?;
    let expiry = parse_expiry(&request.expiry)?;

    let issued = state
        .keys
        .issue(&ctx.user_id, &request.name, permissions, expiry)
        .map_err(map_key_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedKeyResponse {
            id: issued.key_id,
            name: issued.name,
            key: issued.secret,
            permissions: issued.permissions,
            expires_at: issued.expires_at,
            created_at: issued.created_at,
        }),
    ))
}

/// Roll an expired key over to a fresh secret with the same permissions.
#[utoipa::path(
    post,
    path = "/v1/keys/rollover",
    tag = "Keys",
    request_body = RolloverKeyRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Key rolled over", body = RolledKeyResponse),
        (status = 400, description = "Key not yet expired or invalid expiry"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Key not found"),
        (status = 409, description = "Active key quota reached")
    )
)]
pub async fn rollover_key(
    SessionOnly(ctx): SessionOnly,
    State(state): State<AppState>,
    Json(request): Json<RolloverKeyRequest>,
) -> Result<Json<RolledKeyResponse>, ApiError> {
    let expiry = parse_expiry(&request.expiry)?;

    let rolled = state
        .keys
        .rollover(&ctx.user_id, &request.expired_key_id, expiry)
        .map_err(map_key_error)?;

    Ok(Json(RolledKeyResponse {
        id: rolled.key_id,
        api_key: rolled.secret,
        expires_at: rolled.expires_at,
        permissions: rolled.permissions,
    }))
}

/// Revoke an API key. Revoking an already-revoked key succeeds silently.
#[utoipa::path(
    delete,
    path = "/v1/keys/{key_id}/revoke",
    tag = "Keys",
    params(
        ("key_id" = String, Path, description = "Key ID")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Key revoked", body = RevokeResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Key not found")
    )
)]
pub async fn revoke_key(
    SessionOnly(ctx): SessionOnly,
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<RevokeResponse>, ApiError> {
    state
        .keys
        .revoke(&key_id, &ctx.user_id)
        .map_err(map_key_error)?;

    Ok(Json(RevokeResponse {
        message: "API key revoked successfully".to_string(),
    }))
}

/// List the caller's API keys, newest first. Never includes secrets.
#[utoipa::path(
    get,
    path = "/v1/keys",
    tag = "Keys",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "API keys listed", body = KeyListResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_keys(
    SessionOnly(ctx): SessionOnly,
    State(state): State<AppState>,
) -> Result<Json<KeyListResponse>, ApiError> {
    let api_keys = state.keys.list(&ctx.user_id).map_err(map_key_error)?;
    Ok(Json(KeyListResponse { api_keys }))
}
