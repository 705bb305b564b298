// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the credential dispatcher.
//!
//! Two independent credential schemes feed one `AuthContext`:
//!
//! 1. `Authorization: Bearer <session token>` — verified against the shared
//!    session secret; grants the full permission set. A verification failure
//!    falls through to scheme 2 instead of failing the request.
//! 2. `x-api-key: sk_<64 hex>` — validated against the hashed key records;
//!    grants the permissions stored on the matched key.
//!
//! Permission enforcement is a second, independent gate: handlers declare
//! their required permission by taking `CanDeposit` / `CanTransfer` /
//! `CanRead` instead of bare `Auth`.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, Permission, PermissionSet};
use crate::state::AppState;

/// Header carrying the raw API-key secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Which credential scheme authenticated the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// Short-lived signed session token (human login)
    Session,
    /// Long-lived API key
    ApiKey { key_id: String },
}

/// Identity and permissions resolved from either credential scheme.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub scheme: AuthScheme,
    pub permissions: PermissionSet,
}

/// Authorization step: does this context satisfy the required permission?
///
/// Session identities always pass; API-key identities pass only if the
/// permission was granted at issuance.
pub fn authorize(ctx: &AuthContext, required: Permission) -> Result<(), AuthError> {
    match ctx.scheme {
        AuthScheme::Session => Ok(()),
        AuthScheme::ApiKey { .. } => {
            if ctx.permissions.contains(required) {
                Ok(())
            } else {
                Err(AuthError::MissingPermission(required))
            }
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Extractor accepting either credential scheme.
pub struct Auth(pub AuthContext);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // First check if middleware already set the context
        if let Some(ctx) = parts.extensions.get::<AuthContext>().cloned() {
            return Ok(Auth(ctx));
        }

        // Scheme 1: bearer session token. Verification failure falls through.
        if let Some(token) = bearer_token(parts) {
            if let Ok(claims) = state.session.verify(token) {
                return Ok(Auth(AuthContext {
                    user_id: claims.sub,
                    email: claims.email,
                    scheme: AuthScheme::Session,
                    permissions: PermissionSet::all(),
                }));
            }
        }

        // Scheme 2: API key header
        if let Some(header) = parts.headers.get(API_KEY_HEADER) {
            let raw = header.to_str().map_err(|_| AuthError::InvalidApiKey)?;
            return match state.keys.validate(raw) {
                Ok(Some(validated)) => Ok(Auth(AuthContext {
                    user_id: validated.user_id,
                    email: validated.email,
                    scheme: AuthScheme::ApiKey {
                        key_id: validated.key_id,
                    },
                    permissions: validated.permissions,
                })),
                Ok(None) => Err(AuthError::InvalidApiKey),
                Err(e) => Err(AuthError::InternalError(e.to_string())),
            };
        }

        Err(AuthError::MissingCredentials)
    }
}

/// Extractor requiring a bearer session token specifically.
///
/// Key-management routes use this: an API key must not be able to mint,
/// roll over, or revoke API keys.
pub struct SessionOnly(pub AuthContext);

impl FromRequestParts<AppState> for SessionOnly {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingCredentials)?;
        let claims = state.session.verify(token)?;

        Ok(SessionOnly(AuthContext {
            user_id: claims.sub,
            email: claims.email,
            scheme: AuthScheme::Session,
            permissions: PermissionSet::all(),
        }))
    }
}

macro_rules! permission_extractor {
    ($name:ident, $permission:expr, $doc:literal) => {
        #[doc = $doc]
        pub struct $name(pub AuthContext);

        impl FromRequestParts<AppState> for $name {
            type Rejection = AuthError;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &AppState,
            ) -> Result<Self, Self::Rejection> {
                let Auth(ctx) = Auth::from_request_parts(parts, state).await?;
                authorize(&ctx, $permission)?;
                Ok($name(ctx))
            }
        }
    };
}

permission_extractor!(
    CanDeposit,
    Permission::Deposit,
    "Extractor requiring the `deposit` permission."
);
permission_extractor!(
    CanTransfer,
    Permission::Transfer,
    "Extractor requiring the `transfer` permission."
);
permission_extractor!(
    CanRead,
    Permission::Read,
    "Extractor requiring the `read` permission."
);
