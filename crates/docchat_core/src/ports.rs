//! crates/docchat_core/src/ports.rs
//!
//! Defines the service contracts (traits) the client core depends on.
//! The backend REST API and the persisted key-value storage are both reached
//! only through these ports, so views can be exercised against in-memory fakes.

use async_trait::async_trait;

use crate::domain::{
    Answer, Conversation, ConversationSummary, Dataset, ManagedUser, Message, NewUser,
    UploadFile, User,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// Classifies backend failures into the categories the views react to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// The backend rejected the credentials or the bearer token (HTTP 401-class).
    #[error("Unauthorized")]
    Unauthorized,
    /// The request clashes with existing state, e.g. a duplicate username (HTTP 409).
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PortError::Unauthorized)
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The chatbot backend, as consumed by the client.
#[async_trait]
pub trait BackendService: Send + Sync {
    // --- Authentication ---
    /// Exchanges credentials for a bearer token.
    async fn login(&self, username: &str, password: &str) -> PortResult<String>;

    async fn current_user(&self) -> PortResult<User>;

    // --- Conversations ---
    async fn list_conversations(&self) -> PortResult<Vec<ConversationSummary>>;

    async fn create_conversation(&self, title: Option<&str>) -> PortResult<ConversationSummary>;

    async fn get_conversation(&self, conversation_id: i64) -> PortResult<Conversation>;

    async fn append_message(&self, conversation_id: i64, message: &Message) -> PortResult<()>;

    async fn delete_conversation(&self, conversation_id: i64) -> PortResult<()>;

    // --- Question Answering ---
    async fn request_answer(&self, question: &str) -> PortResult<Answer>;

    // --- Datasets ---
    async fn list_datasets(&self) -> PortResult<Vec<Dataset>>;

    async fn upload_dataset(&self, file: &UploadFile) -> PortResult<()>;

    async fn delete_dataset(&self, dataset_id: i64) -> PortResult<()>;

    /// Standalone upload used by the proof-of-concept front-end.
    /// Returns the id of the stored document.
    async fn upload_pdf(&self, file: &UploadFile) -> PortResult<i64>;

    // --- User Administration ---
    async fn list_users(&self) -> PortResult<Vec<ManagedUser>>;

    async fn create_user(&self, user: &NewUser) -> PortResult<ManagedUser>;

    async fn set_user_active(&self, user_id: i64, active: bool) -> PortResult<()>;

    async fn delete_user(&self, user_id: i64) -> PortResult<()>;
}

/// Simple persisted key-value storage that survives restarts.
///
/// Reads are synchronous so that token presence can be checked without
/// waiting on anything.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> PortResult<()>;

    fn remove(&self, key: &str) -> PortResult<()>;
}
