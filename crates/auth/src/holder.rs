//! Bearer token holder with single-flight refresh.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock};

use bottega_store::{KvStore, keys};

use crate::error::AuthError;
use crate::session::AuthSession;

/// Holds the current [`AuthSession`] in memory and mirrors it into the
/// `token`/`user` storage keys.
///
/// Token and user are always written in one storage transaction: after any
/// operation either both keys are present or neither is.
///
/// The `epoch` counter increments on every session change. A caller that saw
/// a 401 records the epoch it observed; if the epoch moved by the time it
/// enters [`TokenHolder::refresh`], another caller already refreshed and the
/// new token is reused instead of logging in again.
#[derive(Debug, Clone)]
pub struct TokenHolder {
    store: KvStore,
    session: Arc<RwLock<Option<AuthSession>>>,
    epoch: Arc<AtomicU64>,
    refresh_lock: Arc<Mutex<()>>,
}

impl TokenHolder {
    /// Create a holder and hydrate any persisted session.
    pub async fn load(store: KvStore) -> Self {
        let token: Option<String> = match store.get_json(keys::TOKEN).await {
            Ok(Some(value)) => serde_json::from_value(value).ok(),
            _ => None,
        };
        let user = match store.get_json(keys::USER).await {
            Ok(Some(value)) => serde_json::from_value(value).ok(),
            _ => None,
        };

        let session = match (token, user) {
            (Some(token), Some(user)) => Some(AuthSession { token, user }),
            // A half-present session is unusable; treat as logged out.
            _ => None,
        };

        Self {
            store,
            session: Arc::new(RwLock::new(session)),
            epoch: Arc::new(AtomicU64::new(0)),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Current bearer token, if logged in.
    pub async fn token(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.token.clone())
    }

    /// Current session, if logged in.
    pub async fn session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    /// Epoch observed together with a token; see [`TokenHolder::refresh`].
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Install a session, persisting token and user atomically.
    pub async fn set_session(&self, session: AuthSession) -> Result<(), AuthError> {
        self.store
            .apply_batch(vec![
                (
                    keys::TOKEN.to_string(),
                    Some(serde_json::to_value(&session.token).map_err(bottega_store::StoreError::from)?),
                ),
                (
                    keys::USER.to_string(),
                    Some(serde_json::to_value(&session.user).map_err(bottega_store::StoreError::from)?),
                ),
            ])
            .await?;

        *self.session.write().await = Some(session);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Drop the session, removing both storage keys atomically.
    pub async fn clear(&self) -> Result<(), AuthError> {
        self.store
            .apply_batch(vec![
                (keys::TOKEN.to_string(), None),
                (keys::USER.to_string(), None),
            ])
            .await?;

        *self.session.write().await = None;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Obtain a usable token after a rejection, running `login` at most once
    /// across all concurrent callers.
    ///
    /// `observed_epoch` is the value of [`TokenHolder::epoch`] at the moment
    /// the caller last read the token that was rejected (or found it absent).
    /// If the epoch has moved by the time the refresh lock is acquired, some
    /// other caller already completed a login and its token is returned
    /// directly.
    ///
    /// On login failure the session is left cleared and
    /// [`AuthError::Unauthenticated`] is returned.
    pub async fn refresh<F, Fut>(&self, observed_epoch: u64, login: F) -> Result<String, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthSession, AuthError>>,
    {
        let _guard = self.refresh_lock.lock().await;

        if self.epoch() != observed_epoch {
            if let Some(token) = self.token().await {
                tracing::debug!("reusing token refreshed by a concurrent caller");
                return Ok(token);
            }
        }

        // The rejected token is dead; clear it before attempting the login
        // so a failure leaves a clean logged-out state.
        self.clear().await?;

        match login().await {
            Ok(session) => {
                let token = session.token.clone();
                self.set_session(session).await?;
                tracing::info!("re-login succeeded");
                Ok(token)
            }
            Err(err) => {
                tracing::warn!(%err, "re-login failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use bottega_core::UserId;

    use crate::session::{AuthUser, Role};

    fn temp_store() -> KvStore {
        let path = std::env::temp_dir().join(format!("bottega-auth-{}.db", uuid::Uuid::now_v7()));
        KvStore::at_path(path)
    }

    fn session(token: &str) -> AuthSession {
        AuthSession {
            token: token.to_string(),
            user: AuthUser {
                id: UserId::new(),
                username: "admin".to_string(),
                role: Role::Admin,
            },
        }
    }

    #[tokio::test]
    async fn set_session_persists_token_and_user_together() {
        let store = temp_store();
        let holder = TokenHolder::load(store.clone()).await;

        holder.set_session(session("tok-1")).await.unwrap();

        assert!(store.get_json(keys::TOKEN).await.unwrap().is_some());
        assert!(store.get_json(keys::USER).await.unwrap().is_some());

        holder.clear().await.unwrap();

        assert!(store.get_json(keys::TOKEN).await.unwrap().is_none());
        assert!(store.get_json(keys::USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_ignores_half_present_session() {
        let store = temp_store();
        store.set(keys::TOKEN, &"orphan-token").await.unwrap();

        let holder = TokenHolder::load(store).await;
        assert!(holder.token().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_login() {
        let holder = Arc::new(TokenHolder::load(temp_store()).await);
        let logins = Arc::new(AtomicUsize::new(0));
        let observed = holder.epoch();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let holder = holder.clone();
            let logins = logins.clone();
            handles.push(tokio::spawn(async move {
                holder
                    .refresh(observed, || async move {
                        logins.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(session("fresh"))
                    })
                    .await
            }));
        }

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token, "fresh");
        }
        assert_eq!(logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_epoch_after_successful_refresh_skips_login() {
        let holder = TokenHolder::load(temp_store()).await;
        let observed = holder.epoch();

        let token = holder
            .refresh(observed, || async { Ok(session("first")) })
            .await
            .unwrap();
        assert_eq!(token, "first");

        // Second caller still holds the pre-refresh epoch; no login runs.
        let token = holder
            .refresh(observed, || async { unreachable!("login must not run again") })
            .await
            .unwrap();
        assert_eq!(token, "first");
    }

    #[tokio::test]
    async fn failed_login_leaves_no_partial_session() {
        let store = temp_store();
        let holder = TokenHolder::load(store.clone()).await;
        holder.set_session(session("stale")).await.unwrap();

        let observed = holder.epoch();
        let err = holder
            .refresh(observed, || async { Err(AuthError::Unauthenticated) })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));

        assert!(holder.token().await.is_none());
        assert!(store.get_json(keys::TOKEN).await.unwrap().is_none());
        assert!(store.get_json(keys::USER).await.unwrap().is_none());
    }
}
