//! `bottega-auth` — bearer-token session handling for the console.
//!
//! The console authenticates with an opaque bearer token and keeps the token
//! plus the logged-in user record in local storage. There is no expiry
//! tracking: a rejected token is cleared and a fresh login is attempted.
//!
//! Concurrent callers that hit a rejected token share a **single in-flight
//! login** (see [`TokenHolder::refresh`]) instead of each triggering their
//! own, which is what the original console did.

pub mod credentials;
pub mod error;
pub mod holder;
pub mod session;

pub use credentials::{CredentialSet, Credentials};
pub use error::AuthError;
pub use holder::TokenHolder;
pub use session::{AuthSession, AuthUser, Role};
