//! services/client/src/app/conversation_list.rs
//!
//! Fetches and caches the conversations of the current session (the sidebar's
//! data), and refetches them whenever the refresh signal fires while mounted.

use docchat_core::domain::ConversationSummary;
use docchat_core::ports::{BackendService, PortResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::signal::{RefreshSignal, Subscription};

pub struct ConversationListProvider {
    backend: Arc<dyn BackendService>,
    signal: RefreshSignal,
    conversations: Mutex<Vec<ConversationSummary>>,
}

impl ConversationListProvider {
    pub fn new(backend: Arc<dyn BackendService>, signal: RefreshSignal) -> Self {
        Self {
            backend,
            signal,
            conversations: Mutex::new(Vec::new()),
        }
    }

    /// The cached list, in the order the backend returned it.
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.conversations.lock().clone()
    }

    /// Refetches the whole list and replaces the cache with it.
    ///
    /// Overlapping refreshes are not serialized: whichever completes last
    /// decides the cached list.
    pub async fn refresh(&self) -> PortResult<Vec<ConversationSummary>> {
        let list = self.backend.list_conversations().await?;
        debug!(count = list.len(), "Conversation list refreshed");
        *self.conversations.lock() = list.clone();
        Ok(list)
    }

    /// Creates a conversation and refetches the list instead of splicing the
    /// new entry in, so the order always matches the backend's.
    /// Returns the id of the new conversation.
    pub async fn create_conversation(&self, title: Option<&str>) -> PortResult<i64> {
        let created = self.backend.create_conversation(title).await?;
        info!(conversation_id = created.id, "Conversation created");

        match self.refresh().await {
            Ok(_) => {}
            Err(e) if e.is_unauthorized() => return Err(e),
            Err(e) => warn!(error = %e, "Conversation created but the list could not be refreshed"),
        }
        Ok(created.id)
    }

    pub async fn delete_conversation(&self, conversation_id: i64) -> PortResult<()> {
        self.backend.delete_conversation(conversation_id).await?;
        info!(conversation_id, "Conversation deleted");
        self.refresh().await?;
        Ok(())
    }

    /// Starts listening to the refresh signal and performs the initial fetch.
    ///
    /// The provider stays subscribed until the returned handle is dropped or
    /// unmounted; a refresh still in flight at that point is abandoned rather
    /// than written into the cache. Must be called inside a tokio runtime.
    pub fn mount(self: &Arc<Self>) -> MountedList {
        let wake = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let listener_wake = Arc::clone(&wake);
        let subscription = self.signal.subscribe(move || listener_wake.notify_one());
        // Initial fetch, like any freshly mounted sidebar.
        wake.notify_one();

        let provider = Arc::clone(self);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = wake.notified() => {
                        tokio::select! {
                            _ = task_cancel.cancelled() => break,
                            result = provider.refresh() => {
                                if let Err(e) = result {
                                    warn!(error = %e, "Signalled conversation refresh failed");
                                }
                            }
                        }
                    }
                }
            }
            debug!("Conversation list unmounted");
        });

        MountedList {
            _subscription: subscription,
            cancel,
            task: Some(task),
        }
    }
}

/// Keeps a `ConversationListProvider` subscribed to the refresh signal.
pub struct MountedList {
    _subscription: Subscription,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MountedList {
    /// Unsubscribes and waits for the background refresher to stop.
    pub async fn unmount(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Conversation refresher ended abnormally");
            }
        }
    }
}

impl Drop for MountedList {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
