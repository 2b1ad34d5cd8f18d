//! services/client/src/app/chat.rs
//!
//! The conversation view: shows the transcript of the active conversation and
//! runs the send workflow (ensure a conversation, persist the question, fetch
//! the answer, persist the answer, signal the sidebar).

use docchat_core::domain::{Message, Role};
use docchat_core::ports::{BackendService, PortError, PortResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::app::active_conversation::ActiveConversation;
use crate::app::conversation_list::ConversationListProvider;
use crate::app::signal::RefreshSignal;

/// Shown (and persisted) in place of an answer that could not be fetched.
pub const ANSWER_PLACEHOLDER: &str = "Error retrieving an answer from the server.";

//=========================================================================================
// Send Workflow Types
//=========================================================================================

/// Where a send currently is. `Idle` whenever no send is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Idle,
    EnsuringConversation,
    PersistingUserMessage,
    AwaitingAnswer,
    PersistingAnswer,
}

/// How a send ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The input was blank; nothing was sent.
    Ignored,
    Answered,
    /// The answer could not be fetched and the placeholder was shown instead.
    Placeholder,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("A message is already being sent")]
    Busy,
    #[error("The session has expired, please log in again")]
    SessionEnded,
    #[error("Could not send the message: {0}")]
    Backend(PortError),
}

impl From<PortError> for SendError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::Unauthorized => SendError::SessionEnded,
            other => SendError::Backend(other),
        }
    }
}

/// The locally displayed transcript. `confirmed` is the last server history
/// fetched for `conversation_id`; `provisional` holds messages appended since,
/// and is thrown away by the next successful fetch.
#[derive(Default)]
struct Transcript {
    conversation_id: Option<i64>,
    confirmed: Vec<Message>,
    provisional: Vec<Message>,
}

impl Transcript {
    fn reset(&mut self, conversation_id: Option<i64>) {
        self.conversation_id = conversation_id;
        self.confirmed.clear();
        self.provisional.clear();
    }
}

//=========================================================================================
// ChatView
//=========================================================================================

pub struct ChatView {
    backend: Arc<dyn BackendService>,
    active: Arc<ActiveConversation>,
    conversations: Arc<ConversationListProvider>,
    signal: RefreshSignal,
    transcript: Mutex<Transcript>,
    sending: AtomicBool,
    phase: Mutex<SendPhase>,
}

/// Clears the `sending` flag however the send ends.
struct SendingGuard<'a> {
    view: &'a ChatView,
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        *self.view.phase.lock() = SendPhase::Idle;
        self.view.sending.store(false, Ordering::SeqCst);
    }
}

impl ChatView {
    pub fn new(
        backend: Arc<dyn BackendService>,
        active: Arc<ActiveConversation>,
        conversations: Arc<ConversationListProvider>,
        signal: RefreshSignal,
    ) -> Self {
        Self {
            backend,
            active,
            conversations,
            signal,
            transcript: Mutex::new(Transcript::default()),
            sending: AtomicBool::new(false),
            phase: Mutex::new(SendPhase::Idle),
        }
    }

    /// The transcript as displayed: server history followed by local appends.
    pub fn messages(&self) -> Vec<Message> {
        let transcript = self.transcript.lock();
        transcript
            .confirmed
            .iter()
            .chain(transcript.provisional.iter())
            .cloned()
            .collect()
    }

    /// The conversation whose transcript is displayed.
    pub fn conversation_id(&self) -> Option<i64> {
        self.transcript.lock().conversation_id
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> SendPhase {
        *self.phase.lock()
    }

    /// Selects a conversation and loads its history wholesale. If the server
    /// no longer has it, neither the pointer nor the view keeps it selected.
    pub async fn open(&self, conversation_id: i64) -> PortResult<()> {
        self.active.set(conversation_id);
        self.transcript.lock().reset(Some(conversation_id));
        let result = self.reload(conversation_id).await;
        if let Err(PortError::NotFound(detail)) = &result {
            warn!(conversation_id, %detail, "Conversation no longer exists");
            if self.active.get() == Some(conversation_id) {
                self.active.clear();
            }
            let mut transcript = self.transcript.lock();
            if transcript.conversation_id == Some(conversation_id) {
                transcript.reset(None);
            }
        }
        result
    }

    /// Reopens the persisted active conversation, if any. A pointer to a
    /// conversation the backend no longer knows is cleared.
    pub async fn resume(&self) -> PortResult<()> {
        let Some(conversation_id) = self.active.get() else {
            self.transcript.lock().reset(None);
            return Ok(());
        };
        match self.open(conversation_id).await {
            Err(PortError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    /// Starts a new conversation and shows it.
    pub async fn start_new(&self, title: Option<&str>) -> PortResult<i64> {
        let conversation_id = self.conversations.create_conversation(title).await?;
        self.open(conversation_id).await?;
        Ok(conversation_id)
    }

    /// Deletes a conversation; deleting the displayed one empties the view.
    pub async fn delete_conversation(&self, conversation_id: i64) -> PortResult<()> {
        self.conversations.delete_conversation(conversation_id).await?;
        if self.active.get() == Some(conversation_id) {
            self.active.clear();
        }
        let mut transcript = self.transcript.lock();
        if transcript.conversation_id == Some(conversation_id) {
            transcript.reset(None);
        }
        Ok(())
    }

    /// Fetches the server history and replaces the transcript with it, unless
    /// another conversation was selected in the meantime.
    async fn reload(&self, conversation_id: i64) -> PortResult<()> {
        let conversation = self.backend.get_conversation(conversation_id).await?;
        let mut transcript = self.transcript.lock();
        if transcript.conversation_id != Some(conversation_id) {
            debug!(conversation_id, "Discarding history of a conversation no longer shown");
            return Ok(());
        }
        transcript.confirmed = conversation.messages;
        transcript.provisional.clear();
        debug!(conversation_id, messages = transcript.confirmed.len(), "Transcript loaded");
        Ok(())
    }

    fn push_provisional(&self, conversation_id: i64, message: Message) {
        let mut transcript = self.transcript.lock();
        if transcript.conversation_id == Some(conversation_id) {
            transcript.provisional.push(message);
        }
    }

    fn drop_last_provisional(&self, conversation_id: i64) {
        let mut transcript = self.transcript.lock();
        if transcript.conversation_id == Some(conversation_id) {
            transcript.provisional.pop();
        }
    }

    fn enter_phase(&self, phase: SendPhase) {
        debug!(?phase, "Send workflow");
        *self.phase.lock() = phase;
    }

    fn begin_send(&self) -> Result<SendingGuard<'_>, SendError> {
        if self
            .sending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SendError::Busy);
        }
        Ok(SendingGuard { view: self })
    }

    /// Sends `text` as a question in the active conversation, creating one
    /// first if none is active.
    ///
    /// A rejected token aborts the workflow on the spot: the session has
    /// already been cleared by the guarded backend and nothing else is
    /// persisted or broadcast. Every completed send broadcasts exactly once.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, SendError> {
        let question = text.trim();
        if question.is_empty() {
            return Ok(SendOutcome::Ignored);
        }
        let _sending = self.begin_send()?;

        // --- 1. Ensure a conversation exists ---
        self.enter_phase(SendPhase::EnsuringConversation);
        let conversation_id = match self.active.get() {
            Some(id) => id,
            None => {
                let id = self.conversations.create_conversation(None).await?;
                self.active.set(id);
                id
            }
        };
        {
            let mut transcript = self.transcript.lock();
            if transcript.conversation_id != Some(conversation_id) {
                transcript.reset(Some(conversation_id));
            }
        }

        // --- 2. Show the question, then persist it ---
        self.enter_phase(SendPhase::PersistingUserMessage);
        let user_message = Message::user(question);
        self.push_provisional(conversation_id, user_message.clone());
        if let Err(e) = self.backend.append_message(conversation_id, &user_message).await {
            warn!(conversation_id, error = %e, "Could not persist the question");
            self.drop_last_provisional(conversation_id);
            return Err(e.into());
        }

        // --- 3. Ask the backend ---
        self.enter_phase(SendPhase::AwaitingAnswer);
        let (reply, outcome) = match self.backend.request_answer(question).await {
            Ok(answer) => {
                let mut reply = Message::assistant(answer.answer);
                reply.sources = answer.sources;
                (reply, SendOutcome::Answered)
            }
            Err(PortError::Unauthorized) => return Err(SendError::SessionEnded),
            Err(e) => {
                warn!(conversation_id, error = %e, "Answer request failed, showing placeholder");
                (Message::assistant(ANSWER_PLACEHOLDER), SendOutcome::Placeholder)
            }
        };
        self.push_provisional(conversation_id, reply.clone());

        // --- 4. Persist the answer ---
        self.enter_phase(SendPhase::PersistingAnswer);
        match self.backend.append_message(conversation_id, &reply).await {
            Ok(()) => {}
            Err(PortError::Unauthorized) => return Err(SendError::SessionEnded),
            Err(e) => warn!(
                conversation_id,
                role = reply.role.as_str(),
                error = %e,
                "Could not persist the reply, it stays visible locally"
            ),
        }

        // --- 5. Let the sidebar pick up the new title and order ---
        self.signal.broadcast();
        info!(conversation_id, ?outcome, "Message sent");
        Ok(outcome)
    }

    /// Messages of the displayed transcript written by `role`.
    pub fn messages_by(&self, role: Role) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|m| m.role == role)
            .collect()
    }
}
