// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::clock::Clock;
use crate::keys::KeyService;
use crate::ledger::LedgerService;
use crate::providers::paystack::PaystackClient;
use crate::storage::LedgerDb;

use crate::auth::SessionAuth;

/// Shared application state: every service constructor-injected, nothing
/// global.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<LedgerDb>,
    pub ledger: Arc<LedgerService>,
    pub keys: Arc<KeyService>,
    pub session: Arc<SessionAuth>,
    /// `None` when the processor is not configured; deposit initiation then
    /// answers 503 instead of failing at startup.
    pub gateway: Option<Arc<PaystackClient>>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        db: Arc<LedgerDb>,
        ledger: Arc<LedgerService>,
        keys: Arc<KeyService>,
        session: Arc<SessionAuth>,
        gateway: Option<Arc<PaystackClient>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            ledger,
            keys,
            session,
            gateway,
            clock,
        }
    }
}
