// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Stored record types persisted by the ledger database.
//!
//! These are the serialized shapes written to redb. API response types live
//! next to their handlers; nothing here ever carries a raw API-key secret.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Permission;

/// Direction/type of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Deposit,
    TransferIn,
    TransferOut,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Deposit => "deposit",
            EntryType::TransferIn => "transfer_in",
            EntryType::TransferOut => "transfer_out",
        }
    }
}

/// Settlement status of a ledger entry.
///
/// Deposits are created `Pending` and move to `Success` exactly once, on
/// webhook settlement. Transfer entries are written already in `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Success,
    Failed,
}

/// User record. Created by the login layer via wallet provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredUser {
    pub user_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Wallet record. Balance is integer minor units and is only ever mutated
/// inside a ledger database write transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredWallet {
    pub wallet_id: String,
    /// Stable 13-digit public transfer address, distinct from `wallet_id`.
    pub wallet_number: String,
    pub balance_minor: u64,
    pub owner_user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable audit record of a balance-change attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Globally unique correlation key (`TXN_` + 32 hex). Idempotency key
    /// for webhook settlement and client polling.
    pub reference: String,
    pub entry_type: EntryType,
    pub amount_minor: u64,
    pub status: EntryStatus,
    /// Recipient wallet number for `TransferOut`, sender wallet number for
    /// `TransferIn`, absent for deposits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_wallet_number: Option<String>,
    pub wallet_id: String,
    pub created_at: DateTime<Utc>,
}

impl StoredEntry {
    /// Create a pending deposit entry.
    pub fn new_pending_deposit(
        reference: String,
        wallet_id: String,
        amount_minor: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reference,
            entry_type: EntryType::Deposit,
            amount_minor,
            status: EntryStatus::Pending,
            counterparty_wallet_number: None,
            wallet_id,
            created_at,
        }
    }
}

/// API-key credential record.
///
/// Only the one-way hash of the secret is stored. `secret_prefix` is the
/// first 12 hex characters of the secret body, kept in plaintext as a public
/// lookup index so validation does not scan the whole table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredApiKey {
    pub key_id: String,
    /// `pbkdf2-sha256$<iterations>$<salt-hex>$<hash-hex>`
    pub secret_hash: String,
    pub secret_prefix: String,
    pub name: String,
    pub permissions: Vec<Permission>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub owner_user_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_type_serializes_snake_case() {
        let json = serde_json::to_string(&EntryType::TransferOut).unwrap();
        assert_eq!(json, r#""transfer_out""#);
    }

    #[test]
    fn pending_deposit_has_no_counterparty() {
        let entry = StoredEntry::new_pending_deposit(
            "TXN_abc".into(),
            "wallet-1".into(),
            5000,
            Utc::now(),
        );
        assert_eq!(entry.status, EntryStatus::Pending);
        assert_eq!(entry.entry_type, EntryType::Deposit);
        assert!(entry.counterparty_wallet_number.is_none());

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("counterparty_wallet_number"));
    }
}
