use serde::{Deserialize, Serialize};

/// A username/password pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Ordered list of credentials tried during an automatic re-login.
///
/// The console ships with a built-in list for the shop's two accounts; a
/// deployment can override it via `BOTTEGA_CREDENTIALS`
/// (`user:pass[,user:pass...]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSet {
    entries: Vec<Credentials>,
}

impl CredentialSet {
    pub fn new(entries: Vec<Credentials>) -> Self {
        Self { entries }
    }

    /// The built-in account list.
    pub fn builtin() -> Self {
        Self::new(vec![
            Credentials::new("admin", "admin123"),
            Credentials::new("operatore", "bottega2024"),
        ])
    }

    /// Read `BOTTEGA_CREDENTIALS`, falling back to the built-in list.
    pub fn from_env() -> Self {
        match std::env::var("BOTTEGA_CREDENTIALS") {
            Ok(raw) => {
                let entries: Vec<Credentials> = raw
                    .split(',')
                    .filter_map(|pair| {
                        let (user, pass) = pair.split_once(':')?;
                        Some(Credentials::new(user.trim(), pass))
                    })
                    .collect();
                if entries.is_empty() {
                    tracing::warn!("BOTTEGA_CREDENTIALS set but empty/malformed; using built-in list");
                    Self::builtin()
                } else {
                    Self::new(entries)
                }
            }
            Err(_) => Self::builtin(),
        }
    }

    pub fn entries(&self) -> &[Credentials] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
