// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::permissions::Permission;

/// Error type for the credential dispatcher.
///
/// Invalid API keys collapse revoked, expired, and unknown into one variant
/// so the response never discloses which condition applied.
#[derive(Debug)]
pub enum AuthError {
    /// Neither a bearer token nor an API key was presented
    MissingCredentials,
    /// Authorization header is present but not `Bearer <token>`
    InvalidAuthHeader,
    /// Session token failed verification (bad signature, expired, malformed)
    InvalidToken,
    /// API key did not validate (unknown, revoked, or expired)
    InvalidApiKey,
    /// Authenticated, but the credential lacks the required permission
    MissingPermission(Permission),
    /// Internal error during credential resolution
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::InvalidToken => "invalid_token",
            AuthError::InvalidApiKey => "invalid_api_key",
            AuthError::MissingPermission(_) => "missing_permission",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken
            | AuthError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            AuthError::MissingPermission(_) => StatusCode::FORBIDDEN,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingCredentials => write!(f, "No valid authentication provided"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::InvalidToken => write!(f, "Invalid or expired token"),
            AuthError::InvalidApiKey => write!(f, "Invalid, expired or revoked API key"),
            AuthError::MissingPermission(permission) => {
                write!(f, "Missing required permission: {permission}")
            }
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_credentials_returns_401() {
        let response = AuthError::MissingCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "missing_credentials");
    }

    #[tokio::test]
    async fn missing_permission_returns_403() {
        let response = AuthError::MissingPermission(Permission::Transfer).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error"], "Missing required permission: transfer");
    }

    #[test]
    fn invalid_api_key_never_discloses_reason() {
        // Revoked, expired, and unknown keys all surface the same message
        assert_eq!(
            AuthError::InvalidApiKey.to_string(),
            "Invalid, expired or revoked API key"
        );
    }
}
