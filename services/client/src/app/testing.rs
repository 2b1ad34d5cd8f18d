//! services/client/src/app/testing.rs
//!
//! Shared test helpers for the view unit tests.
//!
//! Provides `FakeBackend`, an in-memory implementation of [`BackendService`]
//! that records every call in issue order, can fail or hold back the next
//! call to a given method, and can script the responses of the list endpoint.

use async_trait::async_trait;
use docchat_core::domain::{
    Answer, Conversation, ConversationSummary, Dataset, ManagedUser, Message, NewUser,
    UploadFile, User,
};
use docchat_core::ports::{BackendService, KeyValueStore, PortError, PortResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::adapters::storage::InMemoryStore;
use crate::app::guard::View;
use crate::app::App;

struct FakeState {
    calls: Vec<String>,
    user: User,
    conversations: Vec<ConversationSummary>,
    histories: HashMap<i64, Vec<Message>>,
    next_id: i64,
    answer: Answer,
    datasets: Vec<Dataset>,
    users: Vec<ManagedUser>,
    uploaded: Vec<String>,
    failures: HashMap<&'static str, VecDeque<Option<PortError>>>,
    gates: HashMap<&'static str, VecDeque<oneshot::Receiver<()>>>,
    scripted_lists: VecDeque<Vec<ConversationSummary>>,
}

pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub const TOKEN: &'static str = "fake-token";

    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                calls: Vec::new(),
                user: Self::user(1, "tester", false),
                conversations: Vec::new(),
                histories: HashMap::new(),
                next_id: 1,
                answer: Answer {
                    answer: "42".to_string(),
                    sources: Vec::new(),
                },
                datasets: Vec::new(),
                users: Vec::new(),
                uploaded: Vec::new(),
                failures: HashMap::new(),
                gates: HashMap::new(),
                scripted_lists: VecDeque::new(),
            }),
        }
    }

    pub fn user(id: i64, username: &str, is_admin: bool) -> User {
        User {
            id,
            username: username.to_string(),
            name: None,
            is_admin,
        }
    }

    pub fn summary(id: i64, title: &str) -> ConversationSummary {
        ConversationSummary {
            id,
            title: title.to_string(),
            created_at: None,
        }
    }

    pub fn set_user(&self, user: User) {
        self.state.lock().user = user;
    }

    pub fn set_answer(&self, answer: &str, sources: &[&str]) {
        self.state.lock().answer = Answer {
            answer: answer.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        };
    }

    pub fn add_conversation(&self, id: i64, title: &str, messages: Vec<Message>) {
        let mut state = self.state.lock();
        state.conversations.push(Self::summary(id, title));
        state.histories.insert(id, messages);
        state.next_id = state.next_id.max(id + 1);
    }

    pub fn add_user(&self, username: &str, is_admin: bool) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.users.push(ManagedUser {
            id,
            username: username.to_string(),
            name: None,
            is_admin,
            active: true,
        });
        id
    }

    pub fn history(&self, conversation_id: i64) -> Vec<Message> {
        self.state
            .lock()
            .histories
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.state.lock().uploaded.clone()
    }

    /// Makes the next call to `method` fail with `error`.
    pub fn fail_next(&self, method: &'static str, error: PortError) {
        self.state
            .lock()
            .failures
            .entry(method)
            .or_default()
            .push_back(Some(error));
    }

    /// Lets the next call to `method` through; used to target a later call
    /// with `fail_next`.
    pub fn succeed_next(&self, method: &'static str) {
        self.state
            .lock()
            .failures
            .entry(method)
            .or_default()
            .push_back(None);
    }

    /// Holds the next call to `method` until the returned sender fires or is dropped.
    pub fn hold_next(&self, method: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state
            .lock()
            .gates
            .entry(method)
            .or_default()
            .push_back(rx);
        tx
    }

    /// Queues a response for a future `list_conversations` call.
    pub fn script_list(&self, conversations: Vec<ConversationSummary>) {
        self.state.lock().scripted_lists.push_back(conversations);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Calls whose method name is `method`.
    pub fn count(&self, method: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.split(':').next() == Some(method))
            .count()
    }

    /// Records the call, then waits on its gate and reports a queued failure.
    async fn enter(&self, method: &'static str, detail: String) -> PortResult<()> {
        let (gate, failure) = {
            let mut state = self.state.lock();
            let call = if detail.is_empty() {
                method.to_string()
            } else {
                format!("{}:{}", method, detail)
            };
            state.calls.push(call);
            let gate = state.gates.get_mut(method).and_then(|q| q.pop_front());
            let failure = state
                .failures
                .get_mut(method)
                .and_then(|q| q.pop_front())
                .flatten();
            (gate, failure)
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BackendService for FakeBackend {
    async fn login(&self, username: &str, _password: &str) -> PortResult<String> {
        self.enter("login", username.to_string()).await?;
        Ok(Self::TOKEN.to_string())
    }

    async fn current_user(&self) -> PortResult<User> {
        // The identity is the one configured when the call was issued.
        let user = self.state.lock().user.clone();
        self.enter("current_user", String::new()).await?;
        Ok(user)
    }

    async fn list_conversations(&self) -> PortResult<Vec<ConversationSummary>> {
        let scripted = self.state.lock().scripted_lists.pop_front();
        self.enter("list_conversations", String::new()).await?;
        match scripted {
            Some(list) => Ok(list),
            None => Ok(self.state.lock().conversations.clone()),
        }
    }

    async fn create_conversation(&self, title: Option<&str>) -> PortResult<ConversationSummary> {
        self.enter("create_conversation", title.unwrap_or_default().to_string())
            .await?;
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let summary = Self::summary(id, title.unwrap_or("New conversation"));
        state.conversations.push(summary.clone());
        state.histories.insert(id, Vec::new());
        Ok(summary)
    }

    async fn get_conversation(&self, conversation_id: i64) -> PortResult<Conversation> {
        self.enter("get_conversation", conversation_id.to_string())
            .await?;
        let state = self.state.lock();
        let title = state
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .map(|c| c.title.clone())
            .ok_or_else(|| PortError::NotFound(format!("conversation {}", conversation_id)))?;
        Ok(Conversation {
            id: conversation_id,
            title,
            messages: state
                .histories
                .get(&conversation_id)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn append_message(&self, conversation_id: i64, message: &Message) -> PortResult<()> {
        let detail = format!(
            "{}:{}:{}",
            conversation_id,
            message.role.as_str(),
            message.content
        );
        self.enter("append_message", detail).await?;
        let mut state = self.state.lock();
        state
            .histories
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        // The backend derives a title from the first user message.
        if let Some(summary) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id && c.title == "New conversation")
        {
            summary.title = message.content.clone();
        }
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: i64) -> PortResult<()> {
        self.enter("delete_conversation", conversation_id.to_string())
            .await?;
        let mut state = self.state.lock();
        state.conversations.retain(|c| c.id != conversation_id);
        state.histories.remove(&conversation_id);
        Ok(())
    }

    async fn request_answer(&self, question: &str) -> PortResult<Answer> {
        self.enter("request_answer", question.to_string()).await?;
        Ok(self.state.lock().answer.clone())
    }

    async fn list_datasets(&self) -> PortResult<Vec<Dataset>> {
        self.enter("list_datasets", String::new()).await?;
        Ok(self.state.lock().datasets.clone())
    }

    async fn upload_dataset(&self, file: &UploadFile) -> PortResult<()> {
        self.enter("upload_dataset", file.file_name.clone()).await?;
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.datasets.push(Dataset {
            id,
            name: file.file_name.clone(),
            uploaded_at: None,
        });
        state.uploaded.push(file.file_name.clone());
        Ok(())
    }

    async fn delete_dataset(&self, dataset_id: i64) -> PortResult<()> {
        self.enter("delete_dataset", dataset_id.to_string()).await?;
        self.state.lock().datasets.retain(|d| d.id != dataset_id);
        Ok(())
    }

    async fn upload_pdf(&self, file: &UploadFile) -> PortResult<i64> {
        self.enter("upload_pdf", file.file_name.clone()).await?;
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.uploaded.push(file.file_name.clone());
        Ok(id)
    }

    async fn list_users(&self) -> PortResult<Vec<ManagedUser>> {
        self.enter("list_users", String::new()).await?;
        Ok(self.state.lock().users.clone())
    }

    async fn create_user(&self, user: &NewUser) -> PortResult<ManagedUser> {
        self.enter("create_user", user.username.clone()).await?;
        let mut state = self.state.lock();
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(PortError::Conflict("El usuario ya existe".to_string()));
        }
        let created = ManagedUser {
            id: state.next_id,
            username: user.username.clone(),
            name: user.name.clone(),
            is_admin: user.is_admin,
            active: true,
        };
        state.next_id += 1;
        state.users.push(created.clone());
        Ok(created)
    }

    async fn set_user_active(&self, user_id: i64, active: bool) -> PortResult<()> {
        self.enter("set_user_active", format!("{}:{}", user_id, active))
            .await?;
        let mut state = self.state.lock();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("user {}", user_id)))?;
        user.active = active;
        Ok(())
    }

    async fn delete_user(&self, user_id: i64) -> PortResult<()> {
        self.enter("delete_user", user_id.to_string()).await?;
        self.state.lock().users.retain(|u| u.id != user_id);
        Ok(())
    }
}

/// An `App` over a fresh `FakeBackend` and in-memory store, already logged in
/// and showing its default view.
pub async fn signed_in_app(is_admin: bool) -> (Arc<FakeBackend>, App) {
    let backend = Arc::new(FakeBackend::new());
    backend.set_user(FakeBackend::user(1, "tester", is_admin));
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let app = App::new(backend.clone(), store);
    app.session
        .login("tester", "secret")
        .await
        .expect("fake login succeeds");
    let view = if is_admin { View::Admin } else { View::Chat };
    app.go(view);
    (backend, app)
}
