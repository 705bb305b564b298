// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup and injected
//! into the services that need it. Nothing here is read again after boot.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the ledger database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `SESSION_JWT_SECRET` | Shared secret for session-token signing | Required |
//! | `PAYSTACK_SECRET_KEY` | Processor secret (outbound bearer + webhook HMAC) | Required |
//! | `PAYSTACK_BASE_URL` | Payment processor API base | `https://api.paystack.co` |
//! | `SEED_USER_EMAIL` | Provision this user/wallet at startup (dev) | Unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;

/// Environment variable name for the ledger data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the session-token shared secret.
pub const SESSION_SECRET_ENV: &str = "SESSION_JWT_SECRET";

/// Environment variable name for the payment-processor secret key.
///
/// The same secret authenticates outbound initialize calls (bearer) and
/// inbound webhook deliveries (HMAC-SHA512 over the raw payload).
pub const PROCESSOR_SECRET_ENV: &str = "PAYSTACK_SECRET_KEY";

/// Environment variable name for the payment-processor base URL.
pub const PROCESSOR_BASE_URL_ENV: &str = "PAYSTACK_BASE_URL";

const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_PROCESSOR_BASE_URL: &str = "https://api.paystack.co";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable missing: {0}")]
    Missing(&'static str),
}

/// Resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub session_secret: String,
    pub processor_secret: String,
    pub processor_base_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or_default("HOST", "0.0.0.0");
        let port = env_or_default("PORT", "8080").parse().unwrap_or(8080);
        let data_dir = PathBuf::from(env_or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR));
        let session_secret = env_required(SESSION_SECRET_ENV)?;
        let processor_secret = env_required(PROCESSOR_SECRET_ENV)?;
        let processor_base_url =
            env_or_default(PROCESSOR_BASE_URL_ENV, DEFAULT_PROCESSOR_BASE_URL);

        Ok(Self {
            host,
            port,
            data_dir,
            session_secret,
            processor_secret,
            processor_base_url,
        })
    }
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_required(name: &'static str) -> Result<String, ConfigError> {
    env_optional(name).ok_or(ConfigError::Missing(name))
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_default_falls_back() {
        assert_eq!(
            env_or_default("RELATIONAL_LEDGER_UNSET_VAR", "fallback"),
            "fallback"
        );
    }

    #[test]
    fn env_required_reports_missing() {
        let err = env_required("RELATIONAL_LEDGER_UNSET_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }
}
