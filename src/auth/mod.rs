// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authorization Dispatcher
//!
//! Two independent credential schemes, normalized into one identity +
//! permission set:
//!
//! 1. **Session token** — `Authorization: Bearer <jwt>`, HS256 against a
//!    shared secret, `{sub, email}` claims, 1-hour lifetime. Always carries
//!    the full permission set.
//! 2. **API key** — `x-api-key: sk_<64 hex>`, validated against hashed key
//!    records; carries the permissions granted at issuance.
//!
//! Authentication and authorization are separate gates: the `Auth`
//! extractor resolves identity, and the `Can*` extractors run the explicit
//! permission check on top of it. Either scheme may authorize; a failed
//! bearer verification falls through to the API-key scheme before the
//! request is rejected.

pub mod error;
pub mod extractor;
pub mod permissions;
pub mod session;

pub use error::AuthError;
pub use extractor::{
    authorize, Auth, AuthContext, AuthScheme, CanDeposit, CanRead, CanTransfer, SessionOnly,
    API_KEY_HEADER,
};
pub use permissions::{Permission, PermissionSet};
pub use session::{SessionAuth, SessionClaims};
