//! Shared in-memory state for the mock backend.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use uuid::Uuid;

use bottega_auth::{AuthSession, AuthUser, Role};
use bottega_clients::Client;
use bottega_core::UserId;
use bottega_orders::Order;

/// One configured account.
#[derive(Debug, Clone)]
pub struct Account {
    pub username: String,
    pub password: String,
    pub role: Role,
}

/// In-memory backend state. No persistence: restart loses everything, which
/// is exactly what the simulated endpoints always did.
#[derive(Debug)]
pub struct MockState {
    accounts: Mutex<Vec<Account>>,
    tokens: Mutex<HashSet<String>>,
    pub(crate) orders: Mutex<Vec<Order>>,
    pub(crate) clients: Mutex<Vec<Client>>,
    pub(crate) comunicazioni: Mutex<Vec<serde_json::Value>>,
    login_attempts: AtomicUsize,
    response_delay: Mutex<Option<std::time::Duration>>,
}

impl MockState {
    /// State with the console's built-in accounts.
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(vec![
                Account {
                    username: "admin".to_string(),
                    password: "admin123".to_string(),
                    role: Role::Admin,
                },
                Account {
                    username: "operatore".to_string(),
                    password: "bottega2024".to_string(),
                    role: Role::Operator,
                },
            ]),
            tokens: Mutex::new(HashSet::new()),
            orders: Mutex::new(Vec::new()),
            clients: Mutex::new(Vec::new()),
            comunicazioni: Mutex::new(Vec::new()),
            login_attempts: AtomicUsize::new(0),
            response_delay: Mutex::new(None),
        }
    }

    /// Replace the account list (tests).
    pub fn set_accounts(&self, accounts: Vec<Account>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    /// Validate a credential pair, issuing a fresh bearer token on success.
    pub fn login(&self, username: &str, password: &str) -> Option<AuthSession> {
        self.login_attempts.fetch_add(1, Ordering::SeqCst);

        let accounts = self.accounts.lock().unwrap();
        let account = accounts
            .iter()
            .find(|a| a.username == username && a.password == password)?;

        let token = Uuid::now_v7().simple().to_string();
        self.tokens.lock().unwrap().insert(token.clone());

        Some(AuthSession {
            token,
            user: AuthUser {
                id: UserId::new(),
                username: account.username.clone(),
                role: account.role,
            },
        })
    }

    pub fn is_token_valid(&self, token: &str) -> bool {
        self.tokens.lock().unwrap().contains(token)
    }

    /// Invalidate every issued token (simulates server-side expiry).
    pub fn revoke_all_tokens(&self) {
        self.tokens.lock().unwrap().clear();
    }

    /// Number of login attempts seen so far (test observability).
    pub fn login_attempts(&self) -> usize {
        self.login_attempts.load(Ordering::SeqCst)
    }

    /// Delay every authenticated response (simulates a slow backend).
    pub fn set_response_delay(&self, delay: std::time::Duration) {
        *self.response_delay.lock().unwrap() = Some(delay);
    }

    pub fn response_delay(&self) -> Option<std::time::Duration> {
        *self.response_delay.lock().unwrap()
    }

    pub fn orders_snapshot(&self) -> Vec<Order> {
        self.orders.lock().unwrap().clone()
    }

    pub fn seed_orders(&self, orders: Vec<Order>) {
        *self.orders.lock().unwrap() = orders;
    }

    pub fn clients_snapshot(&self) -> Vec<Client> {
        self.clients.lock().unwrap().clone()
    }
}

impl Default for MockState {
    fn default() -> Self {
        Self::new()
    }
}
