// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Permissions granted to API keys.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Permission gating which ledger operations a credential may invoke.
///
/// Session tokens always carry all three; API keys carry the subset granted
/// at issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Initiate deposits
    Deposit,
    /// Move funds to another wallet
    Transfer,
    /// Read balances and transaction history
    Read,
}

impl Permission {
    /// Parse a permission from its wire name (case-insensitive).
    pub fn from_str(s: &str) -> Option<Permission> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(Permission::Deposit),
            "transfer" => Some(Permission::Transfer),
            "read" => Some(Permission::Read),
            _ => None,
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::Deposit => write!(f, "deposit"),
            Permission::Transfer => write!(f, "transfer"),
            Permission::Read => write!(f, "read"),
        }
    }
}

/// Ordered set of permissions held by an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct PermissionSet(Vec<Permission>);

impl PermissionSet {
    pub fn new(permissions: Vec<Permission>) -> Self {
        Self(permissions)
    }

    /// The full set a session token is granted unconditionally.
    pub fn all() -> Self {
        Self(vec![
            Permission::Deposit,
            Permission::Transfer,
            Permission::Read,
        ])
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn as_slice(&self) -> &[Permission] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_parses_known_names() {
        assert_eq!(Permission::from_str("deposit"), Some(Permission::Deposit));
        assert_eq!(Permission::from_str("TRANSFER"), Some(Permission::Transfer));
        assert_eq!(Permission::from_str("Read"), Some(Permission::Read));
        assert_eq!(Permission::from_str("admin"), None);
    }

    #[test]
    fn full_set_contains_everything() {
        let set = PermissionSet::all();
        assert!(set.contains(Permission::Deposit));
        assert!(set.contains(Permission::Transfer));
        assert!(set.contains(Permission::Read));
    }

    #[test]
    fn partial_set_gates_missing_permission() {
        let set = PermissionSet::new(vec![Permission::Read]);
        assert!(set.contains(Permission::Read));
        assert!(!set.contains(Permission::Transfer));
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&Permission::Transfer).unwrap();
        assert_eq!(json, r#""transfer""#);
    }
}
