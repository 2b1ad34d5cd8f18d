//! services/client/src/app/mod.rs
//!
//! The client's application layer: session, navigation and the views, wired
//! together around one backend and one persisted store.

pub mod active_conversation;
pub mod admin;
pub mod chat;
pub mod conversation_list;
pub mod guard;
pub mod navigation;
pub mod quick_ask;
pub mod session;
pub mod signal;

#[cfg(test)]
pub(crate) mod testing;

use docchat_core::ports::{BackendService, KeyValueStore};
use std::sync::Arc;

use active_conversation::ActiveConversation;
use admin::{DatasetAdmin, UserAdmin};
use chat::ChatView;
use conversation_list::ConversationListProvider;
use guard::View;
use navigation::Navigator;
use quick_ask::QuickAskView;
use session::{SessionGuardedBackend, SessionStore};
use signal::RefreshSignal;

//=========================================================================================
// App (Shared Across All Views)
//=========================================================================================

/// Everything a front-end needs, created once at startup.
///
/// `api` is the session-guarded backend; the views only ever see that one, so
/// a rejected token anywhere ends the session.
#[derive(Clone)]
pub struct App {
    pub store: Arc<dyn KeyValueStore>,
    pub navigator: Arc<Navigator>,
    pub active_conversation: Arc<ActiveConversation>,
    pub session: Arc<SessionStore>,
    pub api: Arc<dyn BackendService>,
    pub signal: RefreshSignal,
    pub conversations: Arc<ConversationListProvider>,
    pub chat: Arc<ChatView>,
    pub datasets: Arc<DatasetAdmin>,
    pub users: Arc<UserAdmin>,
    pub quick_ask: Arc<QuickAskView>,
}

impl App {
    pub fn new(backend: Arc<dyn BackendService>, store: Arc<dyn KeyValueStore>) -> Self {
        let navigator = Arc::new(Navigator::new(View::Login));
        let active_conversation = Arc::new(ActiveConversation::load(store.clone()));
        let session = Arc::new(SessionStore::new(
            backend.clone(),
            store.clone(),
            navigator.clone(),
            active_conversation.clone(),
        ));
        let api: Arc<dyn BackendService> =
            Arc::new(SessionGuardedBackend::new(backend, session.clone()));

        let signal = RefreshSignal::new();
        let conversations = Arc::new(ConversationListProvider::new(api.clone(), signal.clone()));
        let chat = Arc::new(ChatView::new(
            api.clone(),
            active_conversation.clone(),
            conversations.clone(),
            signal.clone(),
        ));

        Self {
            datasets: Arc::new(DatasetAdmin::new(api.clone())),
            users: Arc::new(UserAdmin::new(api.clone())),
            quick_ask: Arc::new(QuickAskView::new(api.clone())),
            store,
            navigator,
            active_conversation,
            session,
            api,
            signal,
            conversations,
            chat,
        }
    }

    /// Navigates through the guard using the current session.
    pub fn go(&self, view: View) -> View {
        self.navigator.navigate(view, &self.session.snapshot())
    }

    /// Requests the initial view, then resolves any persisted token. A
    /// navigation to the admin view waits for hydration to finish; a token
    /// rejected during hydration sends the current view back through the guard.
    pub async fn start(&self, initial: View) -> View {
        self.go(initial);
        self.session.hydrate().await;
        self.go(self.navigator.current())
    }
}
