// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Engine
//!
//! Money movement: deposit initiation, webhook-driven settlement, and
//! peer-to-peer transfers. Every balance mutation happens inside a single
//! database write transaction, so total balance is conserved and no wallet
//! is ever observably overdrawn.
//!
//! The webhook path deliberately absorbs unknown references and replayed
//! settlements as acknowledged no-ops — the processor retries on anything
//! else, and neither condition is actionable.

pub mod money;

use std::sync::Arc;

use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;
use sha2::Sha512;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::storage::{
    EntryStatus, EntryType, LedgerDb, LedgerDbError, SettleOutcome, StoredEntry, StoredUser,
    StoredWallet,
};
use self::money::format_minor;

/// Minimum deposit: ₦100 in kobo.
pub const MIN_DEPOSIT_MINOR: u64 = 10_000;

/// Webhook event that triggers settlement.
const SETTLEMENT_EVENT: &str = "charge.success";

const WALLET_NUMBER_PREFIX: &str = "456";
const WALLET_NUMBER_ATTEMPTS: usize = 5;

type HmacSha512 = Hmac<Sha512>;

fn naira(minor: &u64) -> String {
    format_minor(*minor)
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0}")]
    InvalidAmount(String),

    #[error("Wallet not found")]
    WalletNotFound,

    #[error("Recipient wallet not found")]
    RecipientNotFound,

    #[error("Cannot transfer to yourself")]
    SelfTransfer,

    #[error("Insufficient balance. Available: ₦{}, Required: ₦{}", naira(.available_minor), naira(.required_minor))]
    InsufficientFunds {
        available_minor: u64,
        required_minor: u64,
    },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Transaction not found")]
    ReferenceNotFound,

    #[error("system entropy unavailable")]
    Entropy,

    #[error(transparent)]
    Db(#[from] LedgerDbError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// A pending deposit handed to the payment-processor call.
#[derive(Debug, Clone)]
pub struct PendingDeposit {
    pub reference: String,
    pub email: String,
    pub amount_minor: u64,
}

/// Settlement state of a deposit, for client polling.
#[derive(Debug, Clone)]
pub struct DepositStatus {
    pub reference: String,
    pub status: EntryStatus,
    pub amount_minor: u64,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    reference: String,
    /// Settled amount in minor units, as sent by the processor.
    amount: u64,
}

/// The ledger engine. Holds the store, the injected clock, and the shared
/// webhook secret.
pub struct LedgerService {
    db: Arc<LedgerDb>,
    clock: Arc<dyn Clock>,
    rng: SystemRandom,
    webhook_secret: String,
}

impl LedgerService {
    pub fn new(db: Arc<LedgerDb>, clock: Arc<dyn Clock>, webhook_secret: impl Into<String>) -> Self {
        Self {
            db,
            clock,
            rng: SystemRandom::new(),
            webhook_secret: webhook_secret.into(),
        }
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    /// Find-or-create a user and their wallet.
    ///
    /// Called by the login layer on first successful external-identity
    /// login. User and wallet are created in one transaction; the wallet
    /// number is regenerated on the (rare) collision.
    pub fn provision_user(
        &self,
        email: &str,
        first_name: Option<String>,
        last_name: Option<String>,
        picture: Option<String>,
    ) -> LedgerResult<(StoredUser, StoredWallet)> {
        let email = email.trim();

        if let Some(user) = self.db.find_user_by_email(email)? {
            let wallet = self
                .db
                .wallet_for_user(&user.user_id)?
                .ok_or(LedgerError::WalletNotFound)?;
            return Ok((user, wallet));
        }

        let now = self.clock.now();
        let user = StoredUser {
            user_id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            first_name,
            last_name,
            picture,
            is_active: true,
            created_at: now,
        };

        for _ in 0..WALLET_NUMBER_ATTEMPTS {
            let wallet = StoredWallet {
                wallet_id: uuid::Uuid::new_v4().to_string(),
                wallet_number: self.generate_wallet_number()?,
                balance_minor: 0,
                owner_user_id: user.user_id.clone(),
                created_at: now,
            };

            match self.db.create_user_with_wallet(&user, &wallet) {
                Ok(()) => {
                    info!(
                        user_id = %user.user_id,
                        wallet_number = %wallet.wallet_number,
                        "provisioned user with wallet"
                    );
                    return Ok((user, wallet));
                }
                // Wallet-number collision: try a fresh number
                Err(LedgerDbError::AlreadyExists(ref what)) if what.starts_with("Wallet number") => {
                    continue;
                }
                // Email raced into existence: return the winner
                Err(LedgerDbError::AlreadyExists(_)) => {
                    if let Some(existing) = self.db.find_user_by_email(email)? {
                        let wallet = self
                            .db
                            .wallet_for_user(&existing.user_id)?
                            .ok_or(LedgerError::WalletNotFound)?;
                        return Ok((existing, wallet));
                    }
                    return Err(LedgerError::WalletNotFound);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Db(LedgerDbError::AlreadyExists(
            "Wallet number space exhausted after retries".to_string(),
        )))
    }

    /// The wallet owned by a user.
    pub fn lookup_wallet(&self, user_id: &str) -> LedgerResult<StoredWallet> {
        self.db
            .wallet_for_user(user_id)?
            .ok_or(LedgerError::WalletNotFound)
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Create the pending deposit entry and return what the processor call
    /// needs. The entry is persisted **before** any external contact so the
    /// processor can echo the reference back; if the external call then
    /// fails, the entry stays pending and no balance was touched.
    pub fn prepare_deposit(&self, user_id: &str, amount_minor: u64) -> LedgerResult<PendingDeposit> {
        if amount_minor == 0 {
            return Err(LedgerError::InvalidAmount(
                "Amount must be greater than 0".to_string(),
            ));
        }
        if amount_minor < MIN_DEPOSIT_MINOR {
            return Err(LedgerError::InvalidAmount("Minimum deposit is ₦100".to_string()));
        }

        let wallet = self.lookup_wallet(user_id)?;
        let user = self
            .db
            .get_user(user_id)?
            .ok_or(LedgerError::WalletNotFound)?;

        let reference = self.generate_reference()?;
        let entry = StoredEntry::new_pending_deposit(
            reference.clone(),
            wallet.wallet_id,
            amount_minor,
            self.clock.now(),
        );
        self.db.insert_entry(&entry)?;

        info!(
            reference = %reference,
            user_id = %user_id,
            amount_minor,
            "deposit initialized"
        );

        Ok(PendingDeposit {
            reference,
            email: user.email,
            amount_minor,
        })
    }

    /// Verify and apply a processor webhook.
    ///
    /// The signature is HMAC-SHA512 over the raw payload bytes, hex-encoded,
    /// compared in constant time. After verification, `charge.success`
    /// settles the referenced deposit; everything else acknowledges without
    /// state change.
    pub fn settle_webhook(&self, payload: &[u8], signature: &str) -> LedgerResult<()> {
        self.verify_signature(payload, signature)?;

        let envelope: WebhookEnvelope = serde_json::from_slice(payload)
            .map_err(|e| LedgerError::InvalidPayload(e.to_string()))?;

        if envelope.event != SETTLEMENT_EVENT {
            return Ok(());
        }
        let data = envelope
            .data
            .ok_or_else(|| LedgerError::InvalidPayload("missing data object".to_string()))?;

        match self.db.settle_deposit(&data.reference, data.amount)? {
            SettleOutcome::Credited {
                wallet_id,
                amount_minor,
            } => {
                info!(
                    reference = %data.reference,
                    wallet_id = %wallet_id,
                    amount_minor,
                    "deposit settled"
                );
            }
            SettleOutcome::AlreadySettled => {
                info!(
                    reference = %data.reference,
                    "settlement already processed, ignoring webhook"
                );
            }
            SettleOutcome::UnknownReference => {
                warn!(
                    reference = %data.reference,
                    "webhook received for unknown reference"
                );
            }
        }
        Ok(())
    }

    /// Settlement state of a deposit, by reference.
    pub fn deposit_status(&self, reference: &str) -> LedgerResult<DepositStatus> {
        let entry = self
            .db
            .get_entry(reference)?
            .filter(|entry| entry.entry_type == EntryType::Deposit)
            .ok_or(LedgerError::ReferenceNotFound)?;

        Ok(DepositStatus {
            reference: entry.reference,
            status: entry.status,
            amount_minor: entry.amount_minor,
        })
    }

    // =========================================================================
    // Balance & Transfers
    // =========================================================================

    pub fn balance(&self, user_id: &str) -> LedgerResult<u64> {
        Ok(self.lookup_wallet(user_id)?.balance_minor)
    }

    /// Move funds to another wallet.
    ///
    /// Validation order is part of the contract: amount, sender wallet,
    /// sender balance, recipient wallet, self-transfer — all before any
    /// mutation. The mutation itself is one transaction: debit, credit, and
    /// the `transfer_out`/`transfer_in` entry pair commit together or not
    /// at all.
    pub fn transfer(
        &self,
        user_id: &str,
        recipient_wallet_number: &str,
        amount_minor: u64,
    ) -> LedgerResult<()> {
        if amount_minor == 0 {
            return Err(LedgerError::InvalidAmount("Invalid amount".to_string()));
        }

        let sender = self.lookup_wallet(user_id)?;

        if sender.balance_minor < amount_minor {
            return Err(LedgerError::InsufficientFunds {
                available_minor: sender.balance_minor,
                required_minor: amount_minor,
            });
        }

        let recipient = self
            .db
            .find_wallet_by_number(recipient_wallet_number)?
            .ok_or(LedgerError::RecipientNotFound)?;

        if sender.wallet_id == recipient.wallet_id {
            return Err(LedgerError::SelfTransfer);
        }

        let now = self.clock.now();
        let out_entry = StoredEntry {
            reference: self.generate_reference()?,
            entry_type: EntryType::TransferOut,
            amount_minor,
            status: EntryStatus::Success,
            counterparty_wallet_number: Some(recipient.wallet_number.clone()),
            wallet_id: sender.wallet_id.clone(),
            created_at: now,
        };
        let in_entry = StoredEntry {
            reference: self.generate_reference()?,
            entry_type: EntryType::TransferIn,
            amount_minor,
            status: EntryStatus::Success,
            counterparty_wallet_number: Some(sender.wallet_number.clone()),
            wallet_id: recipient.wallet_id.clone(),
            created_at: now,
        };

        self.db
            .apply_transfer(&out_entry, &in_entry)
            .map_err(|e| match e {
                // A racing transfer drained the wallet after pre-validation
                LedgerDbError::InsufficientBalance {
                    available_minor,
                    required_minor,
                } => LedgerError::InsufficientFunds {
                    available_minor,
                    required_minor,
                },
                other => LedgerError::Db(other),
            })?;

        info!(
            sender_wallet = %sender.wallet_number,
            recipient_wallet = %recipient.wallet_number,
            amount_minor,
            reference_out = %out_entry.reference,
            "transfer completed"
        );
        Ok(())
    }

    /// All ledger entries for the user's wallet, newest first.
    pub fn transactions(&self, user_id: &str) -> LedgerResult<Vec<StoredEntry>> {
        let wallet = self.lookup_wallet(user_id)?;
        Ok(self.db.entries_for_wallet(&wallet.wallet_id)?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn verify_signature(&self, payload: &[u8], signature: &str) -> LedgerResult<()> {
        let signature_bytes =
            hex::decode(signature.trim()).map_err(|_| LedgerError::InvalidSignature)?;

        let mut mac = HmacSha512::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| LedgerError::InvalidSignature)?;
        mac.update(payload);
        mac.verify_slice(&signature_bytes)
            .map_err(|_| LedgerError::InvalidSignature)
    }

    fn generate_reference(&self) -> LedgerResult<String> {
        let mut bytes = [0u8; 16];
        self.rng.fill(&mut bytes).map_err(|_| LedgerError::Entropy)?;
        Ok(format!("TXN_{}", hex::encode(bytes)))
    }

    fn generate_wallet_number(&self) -> LedgerResult<String> {
        let mut bytes = [0u8; 8];
        self.rng.fill(&mut bytes).map_err(|_| LedgerError::Entropy)?;
        let n = 1_000_000_000 + u64::from_be_bytes(bytes) % 9_000_000_000;
        Ok(format!("{WALLET_NUMBER_PREFIX}{n}"))
    }

    /// Hex HMAC-SHA512 of a payload. What a well-behaved processor sends.
    #[cfg(test)]
    fn sign_payload(&self, payload: &[u8]) -> String {
        let mut mac = HmacSha512::new_from_slice(self.webhook_secret.as_bytes()).unwrap();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

// =============================================================================
// Tests
// =============================================================================
