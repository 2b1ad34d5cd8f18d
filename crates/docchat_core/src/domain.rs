//! crates/docchat_core/src/domain.rs
//!
//! Defines the pure, core data structures for the chatbot client.
//! These structs are independent of the wire format used by the backend.

use bytes::Bytes;
use chrono::NaiveDateTime;

/// The identity of the logged-in user, as returned by the backend's `/me`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: Option<String>,
    pub is_admin: bool,
}

/// One entry of the sidebar's conversation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: i64,
    pub title: String,
    pub created_at: Option<NaiveDateTime>,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message within a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Document names the answer was grounded on. Empty for user messages.
    pub sources: Vec<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources: Vec::new(),
        }
    }
}

/// A conversation together with its ordered message history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub messages: Vec<Message>,
}

/// The result of the question-answering endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<String>,
}

/// A PDF dataset that has been ingested by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub id: i64,
    pub name: String,
    pub uploaded_at: Option<NaiveDateTime>,
}

/// A user account as seen from the administration panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedUser {
    pub id: i64,
    pub username: String,
    pub name: Option<String>,
    pub is_admin: bool,
    pub active: bool,
}

// Only used when creating accounts - contains the plain password
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub name: Option<String>,
    pub is_admin: bool,
}

/// A file selected for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    /// MIME type as reported by the source of the file, if known.
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadFile {
    pub const PDF_MIME: &'static str = "application/pdf";

    pub fn is_pdf(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|mime| mime.eq_ignore_ascii_case(Self::PDF_MIME))
    }
}
