use serde::{Deserialize, Serialize};

use bottega_core::UserId;

/// Role of a console user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
}

/// The logged-in user record, as returned by the login endpoint and mirrored
/// into the `user` storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

/// An authenticated session: opaque bearer token plus the user it belongs to.
///
/// There is deliberately no expiry field; the token is used until the backend
/// rejects it with a 401.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: AuthUser,
}
