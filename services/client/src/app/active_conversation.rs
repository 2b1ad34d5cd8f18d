//! services/client/src/app/active_conversation.rs
//!
//! The pointer to the conversation the chat view is currently showing.
//! Persisted so that a restart resumes the same conversation.

use docchat_core::ports::KeyValueStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

use crate::adapters::storage::ACTIVE_CONVERSATION_KEY;

pub struct ActiveConversation {
    store: Arc<dyn KeyValueStore>,
    current: Mutex<Option<i64>>,
}

impl ActiveConversation {
    /// Restores the pointer from storage. An unparsable value is discarded.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let current = store.get(ACTIVE_CONVERSATION_KEY).and_then(|raw| {
            raw.trim()
                .parse::<i64>()
                .map_err(|e| warn!(value = %raw, error = %e, "Ignoring invalid active conversation id"))
                .ok()
        });
        Self {
            store,
            current: Mutex::new(current),
        }
    }

    pub fn get(&self) -> Option<i64> {
        *self.current.lock()
    }

    pub fn set(&self, conversation_id: i64) {
        *self.current.lock() = Some(conversation_id);
        if let Err(e) = self
            .store
            .set(ACTIVE_CONVERSATION_KEY, &conversation_id.to_string())
        {
            warn!(error = %e, conversation_id, "Failed to persist active conversation");
        }
    }

    pub fn clear(&self) {
        *self.current.lock() = None;
        if let Err(e) = self.store.remove(ACTIVE_CONVERSATION_KEY) {
            warn!(error = %e, "Failed to clear persisted active conversation");
        }
    }
}
