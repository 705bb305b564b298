// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! redb admits one write transaction at a time, which makes a write
//! transaction the unit of serialization for every balance mutation: a
//! transfer or a webhook settlement re-reads committed wallet state inside
//! its own transaction, so two racing writers cannot both observe a stale
//! balance.
//!
//! ## Table Layout
//!
//! - `users`: user_id → serialized StoredUser
//! - `user_emails`: email → user_id
//! - `user_wallets`: user_id → wallet_id
//! - `wallets`: wallet_id → serialized StoredWallet
//! - `wallet_numbers`: wallet_number → wallet_id
//! - `entries`: reference → serialized StoredEntry
//! - `wallet_entry_index`: composite key (wallet_id|!micros|reference) → reference
//! - `api_keys`: key_id → serialized StoredApiKey
//! - `key_prefix_index`: composite key (secret_prefix|key_id) → key_id
//! - `user_key_index`: composite key (user_id|!micros|key_id) → key_id

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::records::{EntryStatus, StoredApiKey, StoredEntry, StoredUser, StoredWallet};

// =============================================================================
// Table Definitions
// =============================================================================

const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const USER_EMAILS: TableDefinition<&str, &str> = TableDefinition::new("user_emails");
const USER_WALLETS: TableDefinition<&str, &str> = TableDefinition::new("user_wallets");
const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");
const WALLET_NUMBERS: TableDefinition<&str, &str> = TableDefinition::new("wallet_numbers");
const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

/// Index: composite key → reference.
/// Key format: `wallet_id|!micros_be|reference` for descending-time scans.
const WALLET_ENTRY_INDEX: TableDefinition<&[u8], &str> =
    TableDefinition::new("wallet_entry_index");

const API_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("api_keys");

/// Index: `secret_prefix|key_id` → key_id. Lets validation fetch only the
/// candidate keys sharing a secret's public prefix.
const KEY_PREFIX_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("key_prefix_index");

/// Index: `user_id|!micros_be|key_id` → key_id for newest-first key listings.
const USER_KEY_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("user_key_index");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("insufficient balance: available {available_minor}, required {required_minor}")]
    InsufficientBalance {
        available_minor: u64,
        required_minor: u64,
    },

    #[error("balance overflow on wallet {0}")]
    BalanceOverflow(String),
}

pub type LedgerDbResult<T> = Result<T, LedgerDbError>;

/// Result of applying a webhook settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Entry marked success and the wallet credited, both in one transaction.
    Credited {
        wallet_id: String,
        amount_minor: u64,
    },
    /// Entry was already settled; nothing changed.
    AlreadySettled,
    /// No entry with that reference; nothing changed.
    UnknownReference,
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key `scope|!micros_be|suffix`.
///
/// The inverted timestamp ensures newest-first ordering when scanning forward.
fn make_index_key(scope: &str, timestamp_micros: i64, suffix: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(scope.len() + 1 + 8 + 1 + suffix.len());
    key.extend_from_slice(scope.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!(timestamp_micros as u64)).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(suffix.as_bytes());
    key
}

/// Build a composite key `scope|suffix` (no timestamp segment).
fn make_scoped_key(scope: &str, suffix: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(scope.len() + 1 + suffix.len());
    key.extend_from_slice(scope.as_bytes());
    key.push(b'|');
    key.extend_from_slice(suffix.as_bytes());
    key
}

/// Build the lower bound for a range scan over one scope.
fn make_scope_start(scope: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(scope.len() + 1);
    prefix.extend_from_slice(scope.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Build the upper bound for a range scan (prefix with 0xFF bytes appended).
fn make_scope_end(scope: &str) -> Vec<u8> {
    let mut end = make_scope_start(scope);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

fn micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Embedded ACID store for users, wallets, ledger entries, and API keys.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> LedgerDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USER_EMAILS)?;
            let _ = write_txn.open_table(USER_WALLETS)?;
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(WALLET_NUMBERS)?;
            let _ = write_txn.open_table(ENTRIES)?;
            let _ = write_txn.open_table(WALLET_ENTRY_INDEX)?;
            let _ = write_txn.open_table(API_KEYS)?;
            let _ = write_txn.open_table(KEY_PREFIX_INDEX)?;
            let _ = write_txn.open_table(USER_KEY_INDEX)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Users & Wallets
    // =========================================================================

    /// Create a user together with their wallet, atomically.
    ///
    /// Fails with `AlreadyExists` if the email or the wallet number is taken.
    pub fn create_user_with_wallet(
        &self,
        user: &StoredUser,
        wallet: &StoredWallet,
    ) -> LedgerDbResult<()> {
        let user_json = serde_json::to_vec(user)?;
        let wallet_json = serde_json::to_vec(wallet)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut emails = write_txn.open_table(USER_EMAILS)?;
            if emails.get(user.email.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "User email {}",
                    user.email
                )));
            }
            emails.insert(user.email.as_str(), user.user_id.as_str())?;

            let mut numbers = write_txn.open_table(WALLET_NUMBERS)?;
            if numbers.get(wallet.wallet_number.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "Wallet number {}",
                    wallet.wallet_number
                )));
            }
            numbers.insert(wallet.wallet_number.as_str(), wallet.wallet_id.as_str())?;

            let mut users = write_txn.open_table(USERS)?;
            users.insert(user.user_id.as_str(), user_json.as_slice())?;

            let mut wallets = write_txn.open_table(WALLETS)?;
            wallets.insert(wallet.wallet_id.as_str(), wallet_json.as_slice())?;

            let mut user_wallets = write_txn.open_table(USER_WALLETS)?;
            user_wallets.insert(user.user_id.as_str(), wallet.wallet_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> LedgerDbResult<Option<StoredUser>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn find_user_by_email(&self, email: &str) -> LedgerDbResult<Option<StoredUser>> {
        let read_txn = self.db.begin_read()?;
        let emails = read_txn.open_table(USER_EMAILS)?;
        let Some(user_id) = emails.get(email)?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        let users = read_txn.open_table(USERS)?;
        match users.get(user_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_wallet(&self, wallet_id: &str) -> LedgerDbResult<Option<StoredWallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(wallet_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up the wallet owned by a user (1:1).
    pub fn wallet_for_user(&self, user_id: &str) -> LedgerDbResult<Option<StoredWallet>> {
        let read_txn = self.db.begin_read()?;
        let user_wallets = read_txn.open_table(USER_WALLETS)?;
        let Some(wallet_id) = user_wallets.get(user_id)?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        let wallets = read_txn.open_table(WALLETS)?;
        match wallets.get(wallet_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve a public wallet number to its wallet.
    pub fn find_wallet_by_number(&self, wallet_number: &str) -> LedgerDbResult<Option<StoredWallet>> {
        let read_txn = self.db.begin_read()?;
        let numbers = read_txn.open_table(WALLET_NUMBERS)?;
        let Some(wallet_id) = numbers.get(wallet_number)?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        let wallets = read_txn.open_table(WALLETS)?;
        match wallets.get(wallet_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Ledger Entries
    // =========================================================================

    /// Insert a new ledger entry and its index row.
    ///
    /// References are globally unique; a duplicate fails with `AlreadyExists`.
    pub fn insert_entry(&self, entry: &StoredEntry) -> LedgerDbResult<()> {
        let json = serde_json::to_vec(entry)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut entries = write_txn.open_table(ENTRIES)?;
            if entries.get(entry.reference.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!(
                    "Entry {}",
                    entry.reference
                )));
            }
            entries.insert(entry.reference.as_str(), json.as_slice())?;

            let mut index = write_txn.open_table(WALLET_ENTRY_INDEX)?;
            let key = make_index_key(&entry.wallet_id, micros(entry.created_at), &entry.reference);
            index.insert(key.as_slice(), entry.reference.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_entry(&self, reference: &str) -> LedgerDbResult<Option<StoredEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        match table.get(reference)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Settle a deposit entry: mark it success and credit the owning wallet
    /// with the settled amount, both in one transaction.
    ///
    /// Unknown references and already-settled entries change nothing; the
    /// caller decides how to acknowledge them.
    pub fn settle_deposit(
        &self,
        reference: &str,
        settled_amount_minor: u64,
    ) -> LedgerDbResult<SettleOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut entries = write_txn.open_table(ENTRIES)?;
            let existing = match entries.get(reference)? {
                Some(value) => value.value().to_vec(),
                None => return Ok(SettleOutcome::UnknownReference),
            };

            let mut entry: StoredEntry = serde_json::from_slice(&existing)?;
            if entry.status == EntryStatus::Success {
                return Ok(SettleOutcome::AlreadySettled);
            }
            entry.status = EntryStatus::Success;
            let json = serde_json::to_vec(&entry)?;
            entries.insert(reference, json.as_slice())?;

            let mut wallets = write_txn.open_table(WALLETS)?;
            let wallet_bytes = {
                let wallet = wallets.get(entry.wallet_id.as_str())?.ok_or_else(|| {
                    LedgerDbError::NotFound(format!("Wallet {}", entry.wallet_id))
                })?;
                wallet.value().to_vec()
            };
            let mut wallet: StoredWallet = serde_json::from_slice(&wallet_bytes)?;
            wallet.balance_minor = wallet
                .balance_minor
                .checked_add(settled_amount_minor)
                .ok_or_else(|| LedgerDbError::BalanceOverflow(wallet.wallet_id.clone()))?;
            let wallet_json = serde_json::to_vec(&wallet)?;
            wallets.insert(entry.wallet_id.as_str(), wallet_json.as_slice())?;

            SettleOutcome::Credited {
                wallet_id: entry.wallet_id,
                amount_minor: settled_amount_minor,
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Apply a transfer: debit the sender, credit the recipient, and insert
    /// the `transfer_out`/`transfer_in` entry pair — all in one transaction.
    ///
    /// The sender balance is re-read inside the write transaction, so a
    /// racing transfer that drained the wallet after the caller's
    /// pre-validation fails here instead of overdrawing.
    pub fn apply_transfer(
        &self,
        out_entry: &StoredEntry,
        in_entry: &StoredEntry,
    ) -> LedgerDbResult<()> {
        let amount = out_entry.amount_minor;

        let write_txn = self.db.begin_write()?;
        {
            let mut wallets = write_txn.open_table(WALLETS)?;

            let sender_bytes = {
                let sender = wallets.get(out_entry.wallet_id.as_str())?.ok_or_else(|| {
                    LedgerDbError::NotFound(format!("Wallet {}", out_entry.wallet_id))
                })?;
                sender.value().to_vec()
            };
            let mut sender: StoredWallet = serde_json::from_slice(&sender_bytes)?;
            if sender.balance_minor < amount {
                return Err(LedgerDbError::InsufficientBalance {
                    available_minor: sender.balance_minor,
                    required_minor: amount,
                });
            }
            sender.balance_minor -= amount;

            let recipient_bytes = {
                let recipient = wallets.get(in_entry.wallet_id.as_str())?.ok_or_else(|| {
                    LedgerDbError::NotFound(format!("Wallet {}", in_entry.wallet_id))
                })?;
                recipient.value().to_vec()
            };
            let mut recipient: StoredWallet = serde_json::from_slice(&recipient_bytes)?;
            recipient.balance_minor = recipient
                .balance_minor
                .checked_add(amount)
                .ok_or_else(|| LedgerDbError::BalanceOverflow(recipient.wallet_id.clone()))?;

            let sender_json = serde_json::to_vec(&sender)?;
            wallets.insert(sender.wallet_id.as_str(), sender_json.as_slice())?;
            let recipient_json = serde_json::to_vec(&recipient)?;
            wallets.insert(recipient.wallet_id.as_str(), recipient_json.as_slice())?;

            let mut entries = write_txn.open_table(ENTRIES)?;
            let mut index = write_txn.open_table(WALLET_ENTRY_INDEX)?;
            for entry in [out_entry, in_entry] {
                if entries.get(entry.reference.as_str())?.is_some() {
                    return Err(LedgerDbError::AlreadyExists(format!(
                        "Entry {}",
                        entry.reference
                    )));
                }
                let json = serde_json::to_vec(entry)?;
                entries.insert(entry.reference.as_str(), json.as_slice())?;

                let key =
                    make_index_key(&entry.wallet_id, micros(entry.created_at), &entry.reference);
                index.insert(key.as_slice(), entry.reference.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All entries for a wallet, newest first.
    pub fn entries_for_wallet(&self, wallet_id: &str) -> LedgerDbResult<Vec<StoredEntry>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(WALLET_ENTRY_INDEX)?;
        let entries = read_txn.open_table(ENTRIES)?;

        let start = make_scope_start(wallet_id);
        let end = make_scope_end(wallet_id);

        let mut results = Vec::new();
        for item in index.range(start.as_slice()..end.as_slice())? {
            let item = item?;
            let reference = item.1.value().to_string();
            if let Some(value) = entries.get(reference.as_str())? {
                results.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(results)
    }

    // =========================================================================
    // API Keys
    // =========================================================================

    /// Insert a new API-key record and its prefix/owner index rows.
    pub fn insert_api_key(&self, key: &StoredApiKey) -> LedgerDbResult<()> {
        let json = serde_json::to_vec(key)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut keys = write_txn.open_table(API_KEYS)?;
            if keys.get(key.key_id.as_str())?.is_some() {
                return Err(LedgerDbError::AlreadyExists(format!("Key {}", key.key_id)));
            }
            keys.insert(key.key_id.as_str(), json.as_slice())?;

            let mut prefix_index = write_txn.open_table(KEY_PREFIX_INDEX)?;
            let prefix_key = make_scoped_key(&key.secret_prefix, &key.key_id);
            prefix_index.insert(prefix_key.as_slice(), key.key_id.as_str())?;

            let mut user_index = write_txn.open_table(USER_KEY_INDEX)?;
            let user_key = make_index_key(&key.owner_user_id, micros(key.created_at), &key.key_id);
            user_index.insert(user_key.as_slice(), key.key_id.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_api_key(&self, key_id: &str) -> LedgerDbResult<Option<StoredApiKey>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(API_KEYS)?;
        match table.get(key_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Overwrite an existing API-key record (revocation flips a flag; the
    /// indexed fields never change).
    pub fn update_api_key(&self, key: &StoredApiKey) -> LedgerDbResult<()> {
        let json = serde_json::to_vec(key)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut keys = write_txn.open_table(API_KEYS)?;
            if keys.get(key.key_id.as_str())?.is_none() {
                return Err(LedgerDbError::NotFound(format!("Key {}", key.key_id)));
            }
            keys.insert(key.key_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// All keys owned by a user, newest first.
    pub fn list_keys_for_user(&self, user_id: &str) -> LedgerDbResult<Vec<StoredApiKey>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USER_KEY_INDEX)?;
        let keys = read_txn.open_table(API_KEYS)?;

        let start = make_scope_start(user_id);
        let end = make_scope_end(user_id);

        let mut results = Vec::new();
        for item in index.range(start.as_slice()..end.as_slice())? {
            let item = item?;
            let key_id = item.1.value().to_string();
            if let Some(value) = keys.get(key_id.as_str())? {
                results.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(results)
    }

    /// Number of non-revoked keys a user holds (quota input).
    pub fn count_active_keys(&self, user_id: &str) -> LedgerDbResult<usize> {
        let keys = self.list_keys_for_user(user_id)?;
        Ok(keys.iter().filter(|key| !key.revoked).count())
    }

    /// Candidate keys sharing a secret's public prefix.
    pub fn find_keys_by_prefix(&self, secret_prefix: &str) -> LedgerDbResult<Vec<StoredApiKey>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(KEY_PREFIX_INDEX)?;
        let keys = read_txn.open_table(API_KEYS)?;

        let start = make_scope_start(secret_prefix);
        let end = make_scope_end(secret_prefix);

        let mut results = Vec::new();
        for item in index.range(start.as_slice()..end.as_slice())? {
            let item = item?;
            let key_id = item.1.value().to_string();
            if let Some(value) = keys.get(key_id.as_str())? {
                results.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(results)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Permission;
    use crate::storage::records::EntryType;
    use chrono::Duration;

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn sample_user(user_id: &str, email: &str) -> StoredUser {
        StoredUser {
            user_id: user_id.to_string(),
            email: email.to_string(),
            first_name: None,
            last_name: None,
            picture: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn sample_wallet(wallet_id: &str, number: &str, owner: &str, balance: u64) -> StoredWallet {
        StoredWallet {
            wallet_id: wallet_id.to_string(),
            wallet_number: number.to_string(),
            balance_minor: balance,
            owner_user_id: owner.to_string(),
            created_at: Utc::now(),
        }
    }

    fn transfer_pair(
        reference_out: &str,
        reference_in: &str,
        sender: &StoredWallet,
        recipient: &StoredWallet,
        amount: u64,
    ) -> (StoredEntry, StoredEntry) {
        let now = Utc::now();
        let out_entry = StoredEntry {
            reference: reference_out.to_string(),
            entry_type: EntryType::TransferOut,
            amount_minor: amount,
            status: EntryStatus::Success,
            counterparty_wallet_number: Some(recipient.wallet_number.clone()),
            wallet_id: sender.wallet_id.clone(),
            created_at: now,
        };
        let in_entry = StoredEntry {
            reference: reference_in.to_string(),
            entry_type: EntryType::TransferIn,
            amount_minor: amount,
            status: EntryStatus::Success,
            counterparty_wallet_number: Some(sender.wallet_number.clone()),
            wallet_id: recipient.wallet_id.clone(),
            created_at: now,
        };
        (out_entry, in_entry)
    }

    #[test]
    fn create_and_lookup_user_with_wallet() {
        let (db, _dir) = temp_db();
        let user = sample_user("u1", "a@example.com");
        let wallet = sample_wallet("w1", "4561234567890", "u1", 0);
        db.create_user_with_wallet(&user, &wallet).unwrap();

        assert_eq!(db.get_user("u1").unwrap().unwrap().email, "a@example.com");
        assert_eq!(
            db.find_user_by_email("a@example.com").unwrap().unwrap().user_id,
            "u1"
        );
        assert_eq!(db.wallet_for_user("u1").unwrap().unwrap().wallet_id, "w1");
        assert_eq!(
            db.find_wallet_by_number("4561234567890").unwrap().unwrap().wallet_id,
            "w1"
        );
    }

    #[test]
    fn duplicate_email_rejected() {
        let (db, _dir) = temp_db();
        db.create_user_with_wallet(
            &sample_user("u1", "dup@example.com"),
            &sample_wallet("w1", "4561111111111", "u1", 0),
        )
        .unwrap();

        let err = db
            .create_user_with_wallet(
                &sample_user("u2", "dup@example.com"),
                &sample_wallet("w2", "4562222222222", "u2", 0),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerDbError::AlreadyExists(_)));

        // Nothing from the aborted transaction is visible
        assert!(db.get_user("u2").unwrap().is_none());
        assert!(db.find_wallet_by_number("4562222222222").unwrap().is_none());
    }

    #[test]
    fn duplicate_wallet_number_rejected() {
        let (db, _dir) = temp_db();
        db.create_user_with_wallet(
            &sample_user("u1", "a@example.com"),
            &sample_wallet("w1", "4561111111111", "u1", 0),
        )
        .unwrap();

        let err = db
            .create_user_with_wallet(
                &sample_user("u2", "b@example.com"),
                &sample_wallet("w2", "4561111111111", "u2", 0),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerDbError::AlreadyExists(_)));
    }

    #[test]
    fn duplicate_entry_reference_rejected() {
        let (db, _dir) = temp_db();
        db.create_user_with_wallet(
            &sample_user("u1", "a@example.com"),
            &sample_wallet("w1", "4561111111111", "u1", 0),
        )
        .unwrap();

        let entry =
            StoredEntry::new_pending_deposit("TXN_dup".into(), "w1".into(), 5000, Utc::now());
        db.insert_entry(&entry).unwrap();
        let err = db.insert_entry(&entry).unwrap_err();
        assert!(matches!(err, LedgerDbError::AlreadyExists(_)));
    }

    #[test]
    fn entries_listed_newest_first() {
        let (db, _dir) = temp_db();
        db.create_user_with_wallet(
            &sample_user("u1", "a@example.com"),
            &sample_wallet("w1", "4561111111111", "u1", 0),
        )
        .unwrap();

        let base = Utc::now();
        for i in 0..5 {
            let entry = StoredEntry::new_pending_deposit(
                format!("TXN_{i:04}"),
                "w1".into(),
                1000,
                base + Duration::seconds(i),
            );
            db.insert_entry(&entry).unwrap();
        }

        let listed = db.entries_for_wallet("w1").unwrap();
        assert_eq!(listed.len(), 5);
        assert_eq!(listed[0].reference, "TXN_0004");
        assert_eq!(listed[4].reference, "TXN_0000");
    }

    #[test]
    fn settle_deposit_credits_once() {
        let (db, _dir) = temp_db();
        db.create_user_with_wallet(
            &sample_user("u1", "a@example.com"),
            &sample_wallet("w1", "4561111111111", "u1", 0),
        )
        .unwrap();
        db.insert_entry(&StoredEntry::new_pending_deposit(
            "TXN_dep".into(),
            "w1".into(),
            5000,
            Utc::now(),
        ))
        .unwrap();

        let first = db.settle_deposit("TXN_dep", 5000).unwrap();
        assert!(matches!(first, SettleOutcome::Credited { .. }));
        assert_eq!(db.get_wallet("w1").unwrap().unwrap().balance_minor, 5000);
        assert_eq!(
            db.get_entry("TXN_dep").unwrap().unwrap().status,
            EntryStatus::Success
        );

        // Replay is a no-op
        let second = db.settle_deposit("TXN_dep", 5000).unwrap();
        assert_eq!(second, SettleOutcome::AlreadySettled);
        assert_eq!(db.get_wallet("w1").unwrap().unwrap().balance_minor, 5000);
    }

    #[test]
    fn settle_unknown_reference_is_noop() {
        let (db, _dir) = temp_db();
        let outcome = db.settle_deposit("TXN_ghost", 5000).unwrap();
        assert_eq!(outcome, SettleOutcome::UnknownReference);
    }

    #[test]
    fn apply_transfer_moves_balance_and_records_pair() {
        let (db, _dir) = temp_db();
        let sender = sample_wallet("w1", "4561111111111", "u1", 10_000);
        let recipient = sample_wallet("w2", "4562222222222", "u2", 2_000);
        db.create_user_with_wallet(&sample_user("u1", "a@example.com"), &sender)
            .unwrap();
        db.create_user_with_wallet(&sample_user("u2", "b@example.com"), &recipient)
            .unwrap();

        let (out_entry, in_entry) =
            transfer_pair("TXN_out", "TXN_in", &sender, &recipient, 3_000);
        db.apply_transfer(&out_entry, &in_entry).unwrap();

        assert_eq!(db.get_wallet("w1").unwrap().unwrap().balance_minor, 7_000);
        assert_eq!(db.get_wallet("w2").unwrap().unwrap().balance_minor, 5_000);

        let sender_entries = db.entries_for_wallet("w1").unwrap();
        assert_eq!(sender_entries.len(), 1);
        assert_eq!(sender_entries[0].entry_type, EntryType::TransferOut);
        assert_eq!(
            sender_entries[0].counterparty_wallet_number.as_deref(),
            Some("4562222222222")
        );

        let recipient_entries = db.entries_for_wallet("w2").unwrap();
        assert_eq!(recipient_entries[0].entry_type, EntryType::TransferIn);
        assert_eq!(
            recipient_entries[0].counterparty_wallet_number.as_deref(),
            Some("4561111111111")
        );
    }

    #[test]
    fn apply_transfer_rechecks_balance_atomically() {
        let (db, _dir) = temp_db();
        let sender = sample_wallet("w1", "4561111111111", "u1", 1_000);
        let recipient = sample_wallet("w2", "4562222222222", "u2", 0);
        db.create_user_with_wallet(&sample_user("u1", "a@example.com"), &sender)
            .unwrap();
        db.create_user_with_wallet(&sample_user("u2", "b@example.com"), &recipient)
            .unwrap();

        let (out_entry, in_entry) =
            transfer_pair("TXN_out", "TXN_in", &sender, &recipient, 3_000);
        let err = db.apply_transfer(&out_entry, &in_entry).unwrap_err();
        assert!(matches!(
            err,
            LedgerDbError::InsufficientBalance {
                available_minor: 1_000,
                required_minor: 3_000
            }
        ));

        // Both balances untouched, no entries written
        assert_eq!(db.get_wallet("w1").unwrap().unwrap().balance_minor, 1_000);
        assert_eq!(db.get_wallet("w2").unwrap().unwrap().balance_minor, 0);
        assert!(db.entries_for_wallet("w1").unwrap().is_empty());
        assert!(db.entries_for_wallet("w2").unwrap().is_empty());
    }

    fn sample_key(key_id: &str, owner: &str, prefix: &str, created_at: DateTime<Utc>) -> StoredApiKey {
        StoredApiKey {
            key_id: key_id.to_string(),
            secret_hash: "pbkdf2-sha256$1$00$00".to_string(),
            secret_prefix: prefix.to_string(),
            name: "ci".to_string(),
            permissions: vec![Permission::Read],
            expires_at: created_at + Duration::hours(1),
            revoked: false,
            owner_user_id: owner.to_string(),
            created_at,
        }
    }

    #[test]
    fn api_keys_listed_newest_first() {
        let (db, _dir) = temp_db();
        let base = Utc::now();
        for i in 0..3 {
            db.insert_api_key(&sample_key(
                &format!("k{i}"),
                "u1",
                &format!("prefix{i}00000"),
                base + Duration::seconds(i),
            ))
            .unwrap();
        }

        let listed = db.list_keys_for_user("u1").unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].key_id, "k2");
        assert_eq!(listed[2].key_id, "k0");
    }

    #[test]
    fn count_active_ignores_revoked() {
        let (db, _dir) = temp_db();
        let base = Utc::now();
        db.insert_api_key(&sample_key("k1", "u1", "aaaaaaaaaaaa", base)).unwrap();
        let mut revoked = sample_key("k2", "u1", "bbbbbbbbbbbb", base);
        revoked.revoked = true;
        db.insert_api_key(&revoked).unwrap();

        assert_eq!(db.count_active_keys("u1").unwrap(), 1);
    }

    #[test]
    fn find_keys_by_prefix_scopes_to_prefix() {
        let (db, _dir) = temp_db();
        let base = Utc::now();
        db.insert_api_key(&sample_key("k1", "u1", "aaaaaaaaaaaa", base)).unwrap();
        db.insert_api_key(&sample_key("k2", "u2", "aaaaaaaaaaaa", base)).unwrap();
        db.insert_api_key(&sample_key("k3", "u1", "cccccccccccc", base)).unwrap();

        let matches = db.find_keys_by_prefix("aaaaaaaaaaaa").unwrap();
        assert_eq!(matches.len(), 2);
        assert!(db.find_keys_by_prefix("dddddddddddd").unwrap().is_empty());
    }

    #[test]
    fn make_index_key_ordering() {
        // Newer timestamps should produce smaller composite keys (descending)
        let key_old = make_index_key("w1", 1_000_000, "TXN_a");
        let key_new = make_index_key("w1", 2_000_000, "TXN_b");
        assert!(key_new < key_old, "Newer timestamps should sort first");
    }
}
