//! Account types for the session layer.

use serde::Deserialize;
use serde::Serialize;

/// Denormalized user profile captured at login time.
///
/// The profile is persisted alongside the token and is never re-fetched;
/// callers that need fresher data must log in again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    /// Display name.
    pub name: String,
    pub email: String,
    /// Plan tier label, e.g. "Starter Plan".
    pub plan: String,
}

/// An authenticated session: opaque bearer token plus the profile snapshot.
///
/// Invariant: a session always carries both fields. Storage-level state
/// where only one of token/profile survives is treated as signed-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}
