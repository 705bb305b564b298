// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session tokens: short-lived HS256 JWTs representing a human login.
//!
//! The login flow itself (external identity provider) is out of scope; this
//! module issues and verifies the tokens that flow carries. A session token
//! is always maximally privileged — permission scoping exists only for API
//! keys.

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::AuthError;
use crate::clock::Clock;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Default session lifetime (1 hour).
const SESSION_LIFETIME_SECS: i64 = 3600;

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Account email
    pub email: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Issues and verifies session tokens with a shared secret.
pub struct SessionAuth {
    secret: String,
}

impl SessionAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign a session token for a logged-in user. 1-hour lifetime.
    pub fn issue(&self, user_id: &str, email: &str, clock: &dyn Clock) -> Result<String, AuthError> {
        let now = clock.now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(SESSION_LIFETIME_SECS)).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::InternalError(format!("failed to sign session token: {e}")))
    }

    /// Verify signature and expiry; returns the claims on success.
    ///
    /// Every failure mode maps to `InvalidToken` — the dispatcher falls
    /// through to the API-key scheme rather than reporting specifics.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_aud = false;

        let token_data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use chrono::{DateTime, Utc};

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let auth = SessionAuth::new("test-secret");
        let token = auth.issue("user_1", "a@example.com", &SystemClock).unwrap();

        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.sub, "user_1");
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.exp - claims.iat, SESSION_LIFETIME_SECS);
    }

    #[test]
    fn wrong_secret_rejected() {
        let auth = SessionAuth::new("test-secret");
        let token = auth.issue("user_1", "a@example.com", &SystemClock).unwrap();

        let other = SessionAuth::new("other-secret");
        assert!(matches!(
            other.verify(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_rejected() {
        let auth = SessionAuth::new("test-secret");
        // Issued two hours in the past, expired one hour ago — well past leeway
        let past = FixedClock(Utc::now() - Duration::hours(2));
        let token = auth.issue("user_1", "a@example.com", &past).unwrap();

        assert!(matches!(auth.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn garbage_token_rejected() {
        let auth = SessionAuth::new("test-secret");
        assert!(matches!(
            auth.verify("not-a-jwt"),
            Err(AuthError::InvalidToken)
        ));
    }
}
