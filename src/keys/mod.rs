// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API-Key Lifecycle
//!
//! Issues, validates, rolls over, and revokes long-lived API keys.
//!
//! ## Secret handling
//!
//! A secret is `sk_` + 64 lowercase hex characters (32 bytes from the system
//! CSPRNG). It is returned to the caller exactly once, at issue/rollover
//! time; only a salted PBKDF2-HMAC-SHA256 hash is persisted. The first 12
//! hex characters double as a public prefix indexed for lookup, so
//! validation verifies a handful of candidates instead of scanning the whole
//! table. Verification is constant-time (`ring::pbkdf2::verify`); revoked,
//! expired, and unknown keys are indistinguishable to the caller.

use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{DateTime, Days, Duration, Months, Utc};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Permission, PermissionSet};
use crate::clock::Clock;
use crate::storage::{LedgerDb, LedgerDbError, StoredApiKey};

/// Maximum non-revoked keys a user may hold at once.
pub const MAX_ACTIVE_KEYS: usize = 5;

/// PBKDF2 iteration count used for new keys.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

const SECRET_SCHEME: &str = "sk_";
const SECRET_BYTES: usize = 32;
const SECRET_HEX_LEN: usize = SECRET_BYTES * 2;
const SECRET_PREFIX_LEN: usize = 12;
const SALT_BYTES: usize = 16;
const HASH_SCHEME: &str = "pbkdf2-sha256";

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Maximum {MAX_ACTIVE_KEYS} active API keys allowed. Revoke one first.")]
    QuotaExceeded,

    #[error("At least one permission is required")]
    EmptyPermissions,

    #[error("API key not found")]
    NotFound,

    #[error("Key must be expired to rollover")]
    NotYetExpired,

    #[error("system entropy unavailable")]
    Entropy,

    #[error(transparent)]
    Db(#[from] LedgerDbError),
}

pub type KeyResult<T> = Result<T, KeyError>;

/// Symbolic key lifetime, resolved with calendar arithmetic at issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ExpiryPeriod {
    #[serde(rename = "1H")]
    OneHour,
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "1Y")]
    OneYear,
}

impl ExpiryPeriod {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1H" => Some(ExpiryPeriod::OneHour),
            "1D" => Some(ExpiryPeriod::OneDay),
            "1M" => Some(ExpiryPeriod::OneMonth),
            "1Y" => Some(ExpiryPeriod::OneYear),
            _ => None,
        }
    }

    /// Resolve against a wall-clock instant. Month and year additions are
    /// calendar-aware: Jan 31 + 1M lands on the last valid day of February.
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ExpiryPeriod::OneHour => now + Duration::hours(1),
            ExpiryPeriod::OneDay => now
                .checked_add_days(Days::new(1))
                .unwrap_or(now + Duration::days(1)),
            ExpiryPeriod::OneMonth => now
                .checked_add_months(Months::new(1))
                .unwrap_or(now + Duration::days(31)),
            ExpiryPeriod::OneYear => now
                .checked_add_months(Months::new(12))
                .unwrap_or(now + Duration::days(365)),
        }
    }
}

/// A freshly issued key. The only place the plaintext secret exists.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub key_id: String,
    pub name: String,
    pub secret: String,
    pub permissions: Vec<Permission>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Listing entry. Never carries the hash or the secret.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiKeySummary {
    pub key_id: String,
    pub name: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// Identity and permissions resolved from a matched secret.
#[derive(Debug, Clone)]
pub struct ValidatedKey {
    pub key_id: String,
    pub user_id: String,
    pub email: String,
    pub permissions: PermissionSet,
}

/// Key lifecycle manager. Quota and expiry rules live here, not in storage.
pub struct KeyService {
    db: Arc<LedgerDb>,
    clock: Arc<dyn Clock>,
    rng: SystemRandom,
    iterations: NonZeroU32,
}

impl KeyService {
    pub fn new(db: Arc<LedgerDb>, clock: Arc<dyn Clock>, iterations: u32) -> Self {
        Self {
            db,
            clock,
            rng: SystemRandom::new(),
            iterations: NonZeroU32::new(iterations)
                .or(NonZeroU32::new(DEFAULT_PBKDF2_ITERATIONS))
                .unwrap_or(NonZeroU32::MIN),
        }
    }

    /// Issue a new key. Fails with `QuotaExceeded` at 5 active keys.
    pub fn issue(
        &self,
        user_id: &str,
        name: &str,
        permissions: Vec<Permission>,
        expiry: ExpiryPeriod,
    ) -> KeyResult<IssuedKey> {
        if permissions.is_empty() {
            return Err(KeyError::EmptyPermissions);
        }
        if self.db.count_active_keys(user_id)? >= MAX_ACTIVE_KEYS {
            return Err(KeyError::QuotaExceeded);
        }

        self.mint(user_id, name.to_string(), permissions, expiry)
    }

    /// Replace an expired key with a fresh secret carrying the same
    /// permission set. The old record is left untouched.
    pub fn rollover(
        &self,
        user_id: &str,
        expired_key_id: &str,
        expiry: ExpiryPeriod,
    ) -> KeyResult<IssuedKey> {
        let old_key = self
            .db
            .get_api_key(expired_key_id)?
            .filter(|key| key.owner_user_id == user_id)
            .ok_or(KeyError::NotFound)?;

        if self.clock.now() <= old_key.expires_at {
            return Err(KeyError::NotYetExpired);
        }
        if self.db.count_active_keys(user_id)? >= MAX_ACTIVE_KEYS {
            return Err(KeyError::QuotaExceeded);
        }

        self.mint(
            user_id,
            format!("{} (rolled over)", old_key.name),
            old_key.permissions,
            expiry,
        )
    }

    /// Revoke a key. Idempotent: revoking an already-revoked key succeeds.
    pub fn revoke(&self, key_id: &str, user_id: &str) -> KeyResult<()> {
        let mut key = self
            .db
            .get_api_key(key_id)?
            .filter(|key| key.owner_user_id == user_id)
            .ok_or(KeyError::NotFound)?;

        if !key.revoked {
            key.revoked = true;
            self.db.update_api_key(&key)?;
        }
        Ok(())
    }

    /// All of a user's keys, newest first.
    pub fn list(&self, user_id: &str) -> KeyResult<Vec<ApiKeySummary>> {
        let keys = self.db.list_keys_for_user(user_id)?;
        Ok(keys
            .into_iter()
            .map(|key| ApiKeySummary {
                key_id: key.key_id,
                name: key.name,
                expires_at: key.expires_at,
                revoked: key.revoked,
                created_at: key.created_at,
            })
            .collect())
    }

    /// Match a raw secret against the stored hashes.
    ///
    /// Returns `None` for malformed secrets, no match, revoked keys, and
    /// expired keys alike.
    pub fn validate(&self, raw_secret: &str) -> KeyResult<Option<ValidatedKey>> {
        let Some(body) = parse_secret_body(raw_secret) else {
            return Ok(None);
        };
        let prefix = &body[..SECRET_PREFIX_LEN];

        let now = self.clock.now();
        for key in self.db.find_keys_by_prefix(prefix)? {
            if !verify_secret(&key.secret_hash, raw_secret) {
                continue;
            }
            if key.revoked || now > key.expires_at {
                return Ok(None);
            }
            let Some(user) = self.db.get_user(&key.owner_user_id)? else {
                return Ok(None);
            };
            return Ok(Some(ValidatedKey {
                key_id: key.key_id,
                user_id: user.user_id,
                email: user.email,
                permissions: PermissionSet::new(key.permissions),
            }));
        }
        Ok(None)
    }

    fn mint(
        &self,
        user_id: &str,
        name: String,
        permissions: Vec<Permission>,
        expiry: ExpiryPeriod,
    ) -> KeyResult<IssuedKey> {
        let now = self.clock.now();
        let secret = self.generate_secret()?;
        let secret_prefix = secret[SECRET_SCHEME.len()..SECRET_SCHEME.len() + SECRET_PREFIX_LEN]
            .to_string();
        let secret_hash = self.hash_secret(&secret)?;
        let expires_at = expiry.resolve(now);

        let record = StoredApiKey {
            key_id: uuid::Uuid::new_v4().to_string(),
            secret_hash,
            secret_prefix,
            name: name.clone(),
            permissions: permissions.clone(),
            expires_at,
            revoked: false,
            owner_user_id: user_id.to_string(),
            created_at: now,
        };
        self.db.insert_api_key(&record)?;

        tracing::info!(
            key_id = %record.key_id,
            user_id = %user_id,
            expires_at = %expires_at,
            "API key issued"
        );

        Ok(IssuedKey {
            key_id: record.key_id,
            name,
            secret,
            permissions,
            expires_at,
            created_at: now,
        })
    }

    fn generate_secret(&self) -> KeyResult<String> {
        let mut bytes = [0u8; SECRET_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| KeyError::Entropy)?;
        Ok(format!("{SECRET_SCHEME}{}", hex::encode(bytes)))
    }

    fn hash_secret(&self, raw_secret: &str) -> KeyResult<String> {
        let mut salt = [0u8; SALT_BYTES];
        self.rng.fill(&mut salt).map_err(|_| KeyError::Entropy)?;

        let mut derived = [0u8; 32];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            &salt,
            raw_secret.as_bytes(),
            &mut derived,
        );

        Ok(format!(
            "{HASH_SCHEME}${}${}${}",
            self.iterations.get(),
            hex::encode(salt),
            hex::encode(derived)
        ))
    }
}

/// Strip the `sk_` scheme and check the 64-hex-char body.
fn parse_secret_body(raw_secret: &str) -> Option<&str> {
    let body = raw_secret.strip_prefix(SECRET_SCHEME)?;
    if body.len() != SECRET_HEX_LEN {
        return None;
    }
    if !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(body)
}

/// Constant-time verification of a candidate secret against a stored hash.
fn verify_secret(stored_hash: &str, candidate: &str) -> bool {
    let mut parts = stored_hash.split('$');
    let (scheme, iterations, salt_hex, hash_hex) = match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some(scheme), Some(iterations), Some(salt), Some(hash), None) => {
            (scheme, iterations, salt, hash)
        }
        _ => return false,
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Some(iterations) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(hash_hex)) else {
        return false;
    };

    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        &salt,
        candidate.as_bytes(),
        &expected,
    )
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    use crate::storage::{StoredUser, StoredWallet};

    /// Test clock whose instant can be moved forward.
    struct TestClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl TestClock {
        fn new(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(now),
            })
        }

        fn set(&self, now: DateTime<Utc>) {
            *self.now.lock().unwrap() = now;
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn setup() -> (KeyService, Arc<LedgerDb>, Arc<TestClock>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(LedgerDb::open(&dir.path().join("keys.redb")).unwrap());
        let clock = TestClock::new(Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap());
        // Low iteration count keeps the tests fast; production uses 100k.
        let service = KeyService::new(Arc::clone(&db), clock.clone(), 10);
        (service, db, clock, dir)
    }

    fn seed_user(db: &LedgerDb, user_id: &str, email: &str) {
        let now = Utc::now();
        let number_seed: u64 = user_id.bytes().map(u64::from).sum();
        db.create_user_with_wallet(
            &StoredUser {
                user_id: user_id.to_string(),
                email: email.to_string(),
                first_name: None,
                last_name: None,
                picture: None,
                is_active: true,
                created_at: now,
            },
            &StoredWallet {
                wallet_id: format!("wallet-{user_id}"),
                wallet_number: format!("456{number_seed:010}"),
                balance_minor: 0,
                owner_user_id: user_id.to_string(),
                created_at: now,
            },
        )
        .unwrap();
    }

    #[test]
    fn issued_secret_has_expected_format_and_is_not_stored() {
        let (service, db, _clock, _dir) = setup();
        seed_user(&db, "u1", "a@example.com");

        let issued = service
            .issue("u1", "ci", vec![Permission::Read], ExpiryPeriod::OneHour)
            .unwrap();

        assert!(issued.secret.starts_with("sk_"));
        assert_eq!(issued.secret.len(), 3 + 64);
        assert!(issued.secret[3..].bytes().all(|b| b.is_ascii_hexdigit()));

        let record = db.get_api_key(&issued.key_id).unwrap().unwrap();
        assert!(!record.secret_hash.contains(&issued.secret[3..]));
        assert_eq!(record.secret_prefix, issued.secret[3..15]);
        assert!(record.secret_hash.starts_with("pbkdf2-sha256$10$"));
    }

    #[test]
    fn empty_permissions_rejected() {
        let (service, db, _clock, _dir) = setup();
        seed_user(&db, "u1", "a@example.com");

        let err = service
            .issue("u1", "ci", vec![], ExpiryPeriod::OneHour)
            .unwrap_err();
        assert!(matches!(err, KeyError::EmptyPermissions));
    }

    #[test]
    fn quota_enforced_and_released_by_revoke() {
        let (service, db, _clock, _dir) = setup();
        seed_user(&db, "u1", "a@example.com");

        let mut first_key_id = None;
        for i in 0..MAX_ACTIVE_KEYS {
            let issued = service
                .issue("u1", &format!("key-{i}"), vec![Permission::Read], ExpiryPeriod::OneDay)
                .unwrap();
            first_key_id.get_or_insert(issued.key_id);
        }

        let err = service
            .issue("u1", "one-too-many", vec![Permission::Read], ExpiryPeriod::OneDay)
            .unwrap_err();
        assert!(matches!(err, KeyError::QuotaExceeded));

        service.revoke(&first_key_id.unwrap(), "u1").unwrap();
        assert!(service
            .issue("u1", "after-revoke", vec![Permission::Read], ExpiryPeriod::OneDay)
            .is_ok());
    }

    #[test]
    fn validate_matches_only_the_right_secret() {
        let (service, db, _clock, _dir) = setup();
        seed_user(&db, "u1", "a@example.com");

        let issued = service
            .issue(
                "u1",
                "ci",
                vec![Permission::Deposit, Permission::Read],
                ExpiryPeriod::OneHour,
            )
            .unwrap();

        let validated = service.validate(&issued.secret).unwrap().unwrap();
        assert_eq!(validated.user_id, "u1");
        assert_eq!(validated.email, "a@example.com");
        assert!(validated.permissions.contains(Permission::Deposit));
        assert!(!validated.permissions.contains(Permission::Transfer));

        // Same prefix length, different secret body
        let wrong = format!("sk_{}", "0".repeat(64));
        assert!(service.validate(&wrong).unwrap().is_none());

        // Malformed secrets never match
        assert!(service.validate("sk_short").unwrap().is_none());
        assert!(service.validate("pk_something").unwrap().is_none());
    }

    #[test]
    fn validate_rejects_revoked_and_expired_alike() {
        let (service, db, clock, _dir) = setup();
        seed_user(&db, "u1", "a@example.com");

        let revoked = service
            .issue("u1", "revoked", vec![Permission::Read], ExpiryPeriod::OneDay)
            .unwrap();
        service.revoke(&revoked.key_id, "u1").unwrap();
        assert!(service.validate(&revoked.secret).unwrap().is_none());

        let short_lived = service
            .issue("u1", "short", vec![Permission::Read], ExpiryPeriod::OneHour)
            .unwrap();
        clock.set(clock.now() + Duration::hours(2));
        assert!(service.validate(&short_lived.secret).unwrap().is_none());
    }

    #[test]
    fn expiry_is_exclusive_at_the_boundary() {
        let (service, db, clock, _dir) = setup();
        seed_user(&db, "u1", "a@example.com");

        let issued = service
            .issue("u1", "ci", vec![Permission::Read], ExpiryPeriod::OneHour)
            .unwrap();

        // now == expires_at is still valid; one second past is not
        clock.set(issued.expires_at);
        assert!(service.validate(&issued.secret).unwrap().is_some());
        clock.set(issued.expires_at + Duration::seconds(1));
        assert!(service.validate(&issued.secret).unwrap().is_none());
    }

    #[test]
    fn rollover_requires_expiry_and_inherits_permissions() {
        let (service, db, clock, _dir) = setup();
        seed_user(&db, "u1", "a@example.com");

        let issued = service
            .issue(
                "u1",
                "deploy",
                vec![Permission::Transfer, Permission::Read],
                ExpiryPeriod::OneHour,
            )
            .unwrap();

        let err = service
            .rollover("u1", &issued.key_id, ExpiryPeriod::OneDay)
            .unwrap_err();
        assert!(matches!(err, KeyError::NotYetExpired));

        clock.set(clock.now() + Duration::hours(2));
        let rolled = service
            .rollover("u1", &issued.key_id, ExpiryPeriod::OneDay)
            .unwrap();

        assert_ne!(rolled.key_id, issued.key_id);
        assert_ne!(rolled.secret, issued.secret);
        assert_eq!(rolled.name, "deploy (rolled over)");
        assert_eq!(
            rolled.permissions,
            vec![Permission::Transfer, Permission::Read]
        );

        // The old record is left untouched, not revoked
        let old = db.get_api_key(&issued.key_id).unwrap().unwrap();
        assert!(!old.revoked);
    }

    #[test]
    fn rollover_of_foreign_key_is_not_found() {
        let (service, db, _clock, _dir) = setup();
        seed_user(&db, "u1", "a@example.com");
        seed_user(&db, "u2", "b@example.com");

        let issued = service
            .issue("u1", "ci", vec![Permission::Read], ExpiryPeriod::OneHour)
            .unwrap();

        let err = service
            .rollover("u2", &issued.key_id, ExpiryPeriod::OneDay)
            .unwrap_err();
        assert!(matches!(err, KeyError::NotFound));
    }

    #[test]
    fn revoke_is_idempotent_but_checks_ownership() {
        let (service, db, _clock, _dir) = setup();
        seed_user(&db, "u1", "a@example.com");

        let issued = service
            .issue("u1", "ci", vec![Permission::Read], ExpiryPeriod::OneHour)
            .unwrap();

        service.revoke(&issued.key_id, "u1").unwrap();
        service.revoke(&issued.key_id, "u1").unwrap();

        let err = service.revoke(&issued.key_id, "u2").unwrap_err();
        assert!(matches!(err, KeyError::NotFound));

        let err = service.revoke("missing-key", "u1").unwrap_err();
        assert!(matches!(err, KeyError::NotFound));
    }

    #[test]
    fn list_returns_summaries_newest_first() {
        let (service, db, clock, _dir) = setup();
        seed_user(&db, "u1", "a@example.com");

        let first = service
            .issue("u1", "first", vec![Permission::Read], ExpiryPeriod::OneDay)
            .unwrap();
        clock.set(clock.now() + Duration::seconds(5));
        let second = service
            .issue("u1", "second", vec![Permission::Read], ExpiryPeriod::OneDay)
            .unwrap();

        let listed = service.list("u1").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].key_id, second.key_id);
        assert_eq!(listed[1].key_id, first.key_id);
    }

    #[test]
    fn month_addition_clamps_to_last_valid_day() {
        let jan_31 = Utc.with_ymd_and_hms(2026, 1, 31, 9, 30, 0).unwrap();
        let resolved = ExpiryPeriod::OneMonth.resolve(jan_31);
        assert_eq!(resolved, Utc.with_ymd_and_hms(2026, 2, 28, 9, 30, 0).unwrap());

        let leap_jan_31 = Utc.with_ymd_and_hms(2028, 1, 31, 9, 30, 0).unwrap();
        let resolved = ExpiryPeriod::OneMonth.resolve(leap_jan_31);
        assert_eq!(resolved, Utc.with_ymd_and_hms(2028, 2, 29, 9, 30, 0).unwrap());
    }

    #[test]
    fn year_addition_clamps_leap_day() {
        let leap_day = Utc.with_ymd_and_hms(2028, 2, 29, 0, 0, 0).unwrap();
        let resolved = ExpiryPeriod::OneYear.resolve(leap_day);
        assert_eq!(resolved, Utc.with_ymd_and_hms(2029, 2, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn expiry_codes_parse() {
        assert_eq!(ExpiryPeriod::from_code("1H"), Some(ExpiryPeriod::OneHour));
        assert_eq!(ExpiryPeriod::from_code("1D"), Some(ExpiryPeriod::OneDay));
        assert_eq!(ExpiryPeriod::from_code("1M"), Some(ExpiryPeriod::OneMonth));
        assert_eq!(ExpiryPeriod::from_code("1Y"), Some(ExpiryPeriod::OneYear));
        assert_eq!(ExpiryPeriod::from_code("2H"), None);
        assert_eq!(ExpiryPeriod::from_code("1h"), None);
    }

    #[test]
    fn verify_secret_rejects_malformed_hashes() {
        assert!(!verify_secret("not-a-hash", "sk_whatever"));
        assert!(!verify_secret("pbkdf2-sha256$0$aa$bb", "sk_whatever"));
        assert!(!verify_secret("pbkdf2-sha256$10$zz$bb", "sk_whatever"));
        assert!(!verify_secret("bcrypt$10$aa$bb", "sk_whatever"));
    }
}
