//! services/client/src/app/session.rs
//!
//! The session store: the single source of truth for "is a user logged in",
//! plus the response-interception policy that turns any rejected token into
//! a logout.

use async_trait::async_trait;
use docchat_core::domain::{
    Answer, Conversation, ConversationSummary, Dataset, ManagedUser, Message, NewUser,
    UploadFile, User,
};
use docchat_core::ports::{BackendService, KeyValueStore, PortError, PortResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::adapters::storage::TOKEN_KEY;
use crate::app::active_conversation::ActiveConversation;
use crate::app::guard::View;
use crate::app::navigation::Navigator;

//=========================================================================================
// Session State
//=========================================================================================

/// A point-in-time view of the session, as read by the guard and the views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub has_token: bool,
    pub user: Option<User>,
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|user| user.is_admin)
    }
}

struct SessionState {
    user: Option<User>,
    loading: bool,
}

/// Failures surfaced to the login form.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Username and password are required")]
    MissingCredentials,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Login failed: {0}")]
    Backend(#[from] PortError),
}

//=========================================================================================
// SessionStore
//=========================================================================================

pub struct SessionStore {
    backend: Arc<dyn BackendService>,
    store: Arc<dyn KeyValueStore>,
    navigator: Arc<Navigator>,
    active_conversation: Arc<ActiveConversation>,
    state: Mutex<SessionState>,
    hydration_started: AtomicBool,
}

impl SessionStore {
    /// Creates an empty session. It is `loading` only if a persisted token is
    /// waiting to be hydrated.
    pub fn new(
        backend: Arc<dyn BackendService>,
        store: Arc<dyn KeyValueStore>,
        navigator: Arc<Navigator>,
        active_conversation: Arc<ActiveConversation>,
    ) -> Self {
        let loading = store.get(TOKEN_KEY).is_some();
        Self {
            backend,
            store,
            navigator,
            active_conversation,
            state: Mutex::new(SessionState {
                user: None,
                loading,
            }),
            hydration_started: AtomicBool::new(false),
        }
    }

    /// Token presence, read synchronously from persisted storage.
    pub fn has_token(&self) -> bool {
        self.store.get(TOKEN_KEY).is_some()
    }

    pub fn user(&self) -> Option<User> {
        self.state.lock().user.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let has_token = self.has_token();
        let state = self.state.lock();
        SessionSnapshot {
            has_token,
            user: state.user.clone(),
            loading: state.loading,
        }
    }

    pub fn navigator(&self) -> &Arc<Navigator> {
        &self.navigator
    }

    /// Resolves the persisted token into a user. Runs at most once per process;
    /// later calls return immediately.
    pub async fn hydrate(&self) {
        if self.hydration_started.swap(true, Ordering::SeqCst) {
            debug!("Session hydration already ran");
            return;
        }

        let Some(hydrating_token) = self.store.get(TOKEN_KEY) else {
            self.state.lock().loading = false;
            self.navigator.resume_pending(&self.snapshot());
            return;
        };

        info!("Hydrating session from persisted token");
        let result = self.backend.current_user().await;

        // A login or logout that finished meanwhile owns the session now; the
        // answer for the old token must not touch it.
        let token_unchanged = self.store.get(TOKEN_KEY).as_deref() == Some(hydrating_token.as_str());
        match result {
            Ok(user) => {
                let mut state = self.state.lock();
                if token_unchanged && state.user.is_none() {
                    info!(user_id = user.id, username = %user.username, "Session restored");
                    state.user = Some(user);
                } else {
                    debug!(user_id = user.id, "Discarding hydration result for a replaced token");
                }
                state.loading = false;
            }
            Err(e) => {
                if token_unchanged {
                    warn!(error = %e, "Persisted token rejected, clearing it");
                    if let Err(e) = self.store.remove(TOKEN_KEY) {
                        warn!(error = %e, "Failed to remove persisted token");
                    }
                    self.state.lock().user = None;
                } else {
                    debug!(error = %e, "Ignoring hydration failure for a replaced token");
                }
                self.state.lock().loading = false;
            }
        }

        self.navigator.resume_pending(&self.snapshot());
    }

    /// Exchanges credentials for a token and loads the user behind it.
    ///
    /// On failure the session is left exactly as it was.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, LoginError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(LoginError::MissingCredentials);
        }

        // 1. Exchange the credentials for a token
        let token = self.backend.login(username, password).await.map_err(|e| {
            warn!(%username, error = %e, "Login rejected");
            match e {
                PortError::Unauthorized => LoginError::InvalidCredentials,
                other => LoginError::Backend(other),
            }
        })?;

        // 2. Persist it so the next call carries it
        let previous_token = self.store.get(TOKEN_KEY);
        self.store.set(TOKEN_KEY, &token)?;

        // 3. Fetch the identity behind the token
        let user = match self.backend.current_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!(%username, error = %e, "Could not load user after login, rolling back");
                let restored = match previous_token {
                    Some(previous) => self.store.set(TOKEN_KEY, &previous),
                    None => self.store.remove(TOKEN_KEY),
                };
                if let Err(restore_err) = restored {
                    warn!(error = %restore_err, "Failed to restore previous token");
                }
                return Err(LoginError::Backend(e));
            }
        };

        // 4. A different account must not resume someone else's conversation
        let previous_user = {
            let mut state = self.state.lock();
            let previous = state.user.replace(user.clone());
            state.loading = false;
            previous
        };
        if previous_user.is_some_and(|previous| previous.id != user.id) {
            self.active_conversation.clear();
        }

        info!(user_id = user.id, username = %user.username, is_admin = user.is_admin, "Logged in");
        Ok(user)
    }

    /// Clears the token, the user and the active conversation, then shows the
    /// login view. Safe to call from anywhere, any number of times.
    pub fn logout(&self) {
        if let Err(e) = self.store.remove(TOKEN_KEY) {
            warn!(error = %e, "Failed to remove persisted token");
        }
        {
            let mut state = self.state.lock();
            state.user = None;
            state.loading = false;
        }
        self.active_conversation.clear();
        self.navigator.force(View::Login);
        info!("Session cleared");
    }

    /// Applies the authentication policy to a backend result: a rejected
    /// token ends the session. The result itself is passed through.
    pub fn intercept<T>(&self, result: PortResult<T>) -> PortResult<T> {
        if let Err(PortError::Unauthorized) = &result {
            warn!("Backend rejected the session token, logging out");
            self.logout();
        }
        result
    }
}

//=========================================================================================
// SessionGuardedBackend
//=========================================================================================

/// A `BackendService` decorator that runs every result through
/// `SessionStore::intercept`. All views talk to the backend through it, so the
/// "401 means logout" rule lives in exactly one place.
#[derive(Clone)]
pub struct SessionGuardedBackend {
    inner: Arc<dyn BackendService>,
    session: Arc<SessionStore>,
}

impl SessionGuardedBackend {
    pub fn new(inner: Arc<dyn BackendService>, session: Arc<SessionStore>) -> Self {
        Self { inner, session }
    }
}

#[async_trait]
impl BackendService for SessionGuardedBackend {
    /// Credentials being rejected is not a session failure, so this one is
    /// not intercepted.
    async fn login(&self, username: &str, password: &str) -> PortResult<String> {
        self.inner.login(username, password).await
    }

    async fn current_user(&self) -> PortResult<User> {
        self.session.intercept(self.inner.current_user().await)
    }

    async fn list_conversations(&self) -> PortResult<Vec<ConversationSummary>> {
        self.session.intercept(self.inner.list_conversations().await)
    }

    async fn create_conversation(&self, title: Option<&str>) -> PortResult<ConversationSummary> {
        self.session
            .intercept(self.inner.create_conversation(title).await)
    }

    async fn get_conversation(&self, conversation_id: i64) -> PortResult<Conversation> {
        self.session
            .intercept(self.inner.get_conversation(conversation_id).await)
    }

    async fn append_message(&self, conversation_id: i64, message: &Message) -> PortResult<()> {
        self.session
            .intercept(self.inner.append_message(conversation_id, message).await)
    }

    async fn delete_conversation(&self, conversation_id: i64) -> PortResult<()> {
        self.session
            .intercept(self.inner.delete_conversation(conversation_id).await)
    }

    async fn request_answer(&self, question: &str) -> PortResult<Answer> {
        self.session
            .intercept(self.inner.request_answer(question).await)
    }

    async fn list_datasets(&self) -> PortResult<Vec<Dataset>> {
        self.session.intercept(self.inner.list_datasets().await)
    }

    async fn upload_dataset(&self, file: &UploadFile) -> PortResult<()> {
        self.session.intercept(self.inner.upload_dataset(file).await)
    }

    async fn delete_dataset(&self, dataset_id: i64) -> PortResult<()> {
        self.session
            .intercept(self.inner.delete_dataset(dataset_id).await)
    }

    async fn upload_pdf(&self, file: &UploadFile) -> PortResult<i64> {
        self.session.intercept(self.inner.upload_pdf(file).await)
    }

    async fn list_users(&self) -> PortResult<Vec<ManagedUser>> {
        self.session.intercept(self.inner.list_users().await)
    }

    async fn create_user(&self, user: &NewUser) -> PortResult<ManagedUser> {
        self.session.intercept(self.inner.create_user(user).await)
    }

    async fn set_user_active(&self, user_id: i64, active: bool) -> PortResult<()> {
        self.session
            .intercept(self.inner.set_user_active(user_id, active).await)
    }

    async fn delete_user(&self, user_id: i64) -> PortResult<()> {
        self.session.intercept(self.inner.delete_user(user_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::{InMemoryStore, ACTIVE_CONVERSATION_KEY};
    use crate::app::testing::FakeBackend;

    struct Fixture {
        backend: Arc<FakeBackend>,
        store: Arc<dyn KeyValueStore>,
        navigator: Arc<Navigator>,
        active: Arc<ActiveConversation>,
        session: Arc<SessionStore>,
    }

    fn fixture(persisted_token: Option<&str>) -> Fixture {
        let backend = Arc::new(FakeBackend::new());
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        if let Some(token) = persisted_token {
            store.set(TOKEN_KEY, token).unwrap();
        }
        let navigator = Arc::new(Navigator::new(View::Chat));
        let active = Arc::new(ActiveConversation::load(store.clone()));
        let session = Arc::new(SessionStore::new(
            backend.clone(),
            store.clone(),
            navigator.clone(),
            active.clone(),
        ));
        Fixture {
            backend,
            store,
            navigator,
            active,
            session,
        }
    }

    #[tokio::test]
    async fn fresh_session_without_token_is_not_loading() {
        let f = fixture(None);
        assert_eq!(f.session.snapshot(), SessionSnapshot::default());

        f.session.hydrate().await;
        assert!(f.backend.calls().is_empty());
        assert_eq!(f.navigator.navigate(View::Chat, &f.session.snapshot()), View::Login);
        assert_eq!(f.navigator.navigate(View::Admin, &f.session.snapshot()), View::Login);
    }

    #[tokio::test]
    async fn hydration_restores_the_user() {
        let f = fixture(Some("persisted"));
        f.backend.set_user(FakeBackend::user(1, "ana", true));
        assert!(f.session.snapshot().loading);

        f.session.hydrate().await;

        let snapshot = f.session.snapshot();
        assert!(!snapshot.loading);
        assert!(snapshot.is_admin());
        assert_eq!(snapshot.user.unwrap().username, "ana");
    }

    #[tokio::test]
    async fn rejected_token_is_cleared_during_hydration() {
        let f = fixture(Some("expired"));
        f.backend.fail_next("current_user", PortError::Unauthorized);

        f.session.hydrate().await;

        let snapshot = f.session.snapshot();
        assert!(!snapshot.has_token);
        assert!(snapshot.user.is_none());
        assert!(!snapshot.loading);
        assert_eq!(f.store.get(TOKEN_KEY), None);
        assert_eq!(f.navigator.navigate(View::Admin, &snapshot), View::Login);
    }

    #[tokio::test]
    async fn hydration_runs_only_once() {
        let f = fixture(Some("persisted"));
        f.session.hydrate().await;
        f.session.hydrate().await;
        assert_eq!(f.backend.count("current_user"), 1);
    }

    #[tokio::test]
    async fn late_hydration_does_not_override_a_fresh_login() {
        let f = fixture(Some("old-token"));
        f.backend.set_user(FakeBackend::user(1, "alice", true));
        let release = f.backend.hold_next("current_user");

        let session = f.session.clone();
        let hydration = tokio::spawn(async move { session.hydrate().await });
        for _ in 0..200 {
            if f.backend.count("current_user") == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        f.backend.set_user(FakeBackend::user(2, "bob", false));
        f.session.login("bob", "secret").await.unwrap();
        release.send(()).unwrap();
        hydration.await.unwrap();

        let snapshot = f.session.snapshot();
        assert_eq!(snapshot.user.as_ref().map(|u| u.id), Some(2));
        assert!(!snapshot.is_admin());
        assert!(!snapshot.loading);
        assert_eq!(f.store.get(TOKEN_KEY).as_deref(), Some(FakeBackend::TOKEN));
    }

    #[tokio::test]
    async fn late_hydration_failure_keeps_the_new_token() {
        let f = fixture(Some("old-token"));
        f.backend.fail_next("current_user", PortError::Unauthorized);
        let release = f.backend.hold_next("current_user");

        let session = f.session.clone();
        let hydration = tokio::spawn(async move { session.hydrate().await });
        for _ in 0..200 {
            if f.backend.count("current_user") == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        f.session.login("bob", "secret").await.unwrap();
        release.send(()).unwrap();
        hydration.await.unwrap();

        assert_eq!(f.store.get(TOKEN_KEY).as_deref(), Some(FakeBackend::TOKEN));
        assert!(f.session.user().is_some());
    }

    #[tokio::test]
    async fn pending_admin_navigation_resumes_after_hydration() {
        let f = fixture(Some("persisted"));
        f.backend.set_user(FakeBackend::user(1, "ana", true));

        assert_eq!(f.navigator.navigate(View::Admin, &f.session.snapshot()), View::Chat);
        f.session.hydrate().await;
        assert_eq!(f.navigator.current(), View::Admin);
    }

    #[tokio::test]
    async fn login_persists_token_and_user() {
        let f = fixture(None);
        f.backend.set_user(FakeBackend::user(5, "bob", false));

        let user = f.session.login("bob", "secret").await.unwrap();

        assert_eq!(user.id, 5);
        assert_eq!(f.store.get(TOKEN_KEY).as_deref(), Some(FakeBackend::TOKEN));
        assert_eq!(f.session.user(), Some(user));
        assert_eq!(f.navigator.navigate(View::Admin, &f.session.snapshot()), View::Chat);
    }

    #[tokio::test]
    async fn failed_login_leaves_the_session_unchanged() {
        let f = fixture(None);
        f.backend.fail_next("login", PortError::Unauthorized);
        let err = f.session.login("bob", "wrong").await.unwrap_err();
        assert!(matches!(err, LoginError::InvalidCredentials));
        assert_eq!(f.session.snapshot(), SessionSnapshot::default());

        f.backend.fail_next("current_user", PortError::Unexpected("boom".to_string()));
        let err = f.session.login("bob", "secret").await.unwrap_err();
        assert!(matches!(err, LoginError::Backend(_)));
        assert_eq!(f.store.get(TOKEN_KEY), None);
        assert_eq!(f.session.user(), None);

        let err = f.session.login("  ", "secret").await.unwrap_err();
        assert!(matches!(err, LoginError::MissingCredentials));
    }

    #[tokio::test]
    async fn logout_clears_everything_and_shows_login() {
        let f = fixture(None);
        f.session.login("bob", "secret").await.unwrap();
        f.active.set(12);

        f.session.logout();

        assert_eq!(f.session.snapshot(), SessionSnapshot::default());
        assert_eq!(f.store.get(ACTIVE_CONVERSATION_KEY), None);
        assert_eq!(f.active.get(), None);
        assert_eq!(f.navigator.current(), View::Login);
    }

    #[tokio::test]
    async fn guarded_backend_logs_out_on_rejected_token() {
        let f = fixture(None);
        f.session.login("bob", "secret").await.unwrap();
        let guarded = SessionGuardedBackend::new(f.backend.clone(), f.session.clone());

        f.backend.fail_next("list_datasets", PortError::Unauthorized);
        let result = guarded.list_datasets().await;

        assert_eq!(result.unwrap_err(), PortError::Unauthorized);
        assert!(!f.session.has_token());
        assert_eq!(f.navigator.current(), View::Login);
    }

    #[tokio::test]
    async fn guarded_backend_leaves_other_failures_alone() {
        let f = fixture(None);
        f.session.login("bob", "secret").await.unwrap();
        let guarded = SessionGuardedBackend::new(f.backend.clone(), f.session.clone());

        f.backend
            .fail_next("list_users", PortError::Unexpected("down".to_string()));
        assert!(guarded.list_users().await.is_err());
        assert!(f.session.has_token());
    }
}
