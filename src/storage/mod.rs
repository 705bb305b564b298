// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Storage Module
//!
//! Persistent state lives in a single embedded redb database under
//! `DATA_DIR`. redb gives ACID write transactions with a single writer,
//! which is the serialization point for every balance mutation.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/ledger.redb
//!   users / user_emails / user_wallets
//!   wallets / wallet_numbers
//!   entries / wallet_entry_index
//!   api_keys / key_prefix_index / user_key_index
//! ```
//!
//! Four durable relations (User, Wallet, Entry, ApiKey); everything else is
//! derived index state inside the same file.

pub mod ledger_db;
pub mod records;

pub use ledger_db::{LedgerDb, LedgerDbError, LedgerDbResult, SettleOutcome};
pub use records::{EntryStatus, EntryType, StoredApiKey, StoredEntry, StoredUser, StoredWallet};
