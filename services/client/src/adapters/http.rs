//! services/client/src/adapters/http.rs
//!
//! This module contains the HTTP adapter, which is the concrete implementation
//! of the `BackendService` port from the `core` crate. It talks to the chatbot
//! backend's REST API using `reqwest` and classifies every failure into a
//! `PortError`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use docchat_core::domain::{
    Answer, Conversation, ConversationSummary, Dataset, ManagedUser, Message, NewUser, Role,
    UploadFile, User,
};
use docchat_core::ports::{BackendService, KeyValueStore, PortError, PortResult};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapters::storage::TOKEN_KEY;
use crate::config::Config;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `BackendService` over the backend's REST API.
///
/// The bearer token is read from the persisted store on every request, so a
/// login or logout anywhere in the client is picked up by the next call.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    store: Arc<dyn KeyValueStore>,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` from the loaded configuration.
    pub fn new(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, &config.api_base_url, store))
    }

    /// Creates a new `HttpBackend` around an existing `reqwest` client.
    pub fn with_client(client: Client, base_url: &str, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attaches the persisted bearer token, if there is one.
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.store.get(TOKEN_KEY) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request and turns non-success statuses into `PortError`s.
    async fn send(&self, builder: RequestBuilder) -> PortResult<Response> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Request failed: {}", e)))?;

        let status = response.status();
        debug!(%status, url = %response.url(), "Backend responded");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> PortResult<T> {
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed response body: {}", e)))
    }

    fn upload_form(field: &str, file: &UploadFile) -> PortResult<reqwest::multipart::Form> {
        let mime = file.content_type.as_deref().unwrap_or(UploadFile::PDF_MIME);
        let part = reqwest::multipart::Part::stream(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(mime)
            .map_err(|e| PortError::InvalidInput(format!("Invalid content type: {}", e)))?;
        Ok(reqwest::multipart::Form::new().part(field.to_string(), part))
    }
}

/// Maps an HTTP failure status onto the error categories the views react to.
fn classify_failure(status: StatusCode, body: &str) -> PortError {
    let detail = extract_detail(body);
    match status {
        StatusCode::UNAUTHORIZED => PortError::Unauthorized,
        StatusCode::CONFLICT => PortError::Conflict(detail),
        StatusCode::NOT_FOUND => PortError::NotFound(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PortError::InvalidInput(detail)
        }
        _ => {
            warn!(%status, %detail, "Backend call failed");
            PortError::Unexpected(format!("{}: {}", status, detail))
        }
    }
}

/// Pulls the human-readable message out of a FastAPI style `{"detail": ...}` body.
fn extract_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| match value.get("detail") {
            Some(serde_json::Value::String(detail)) => Some(detail.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Accepts both naive ISO timestamps and RFC 3339 ones.
fn parse_timestamp(raw: Option<String>) -> Option<NaiveDateTime> {
    let raw = raw?;
    raw.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(&raw).ok().map(|dt| dt.naive_utc()))
}

//=========================================================================================
// Wire Records
//=========================================================================================
// The backend emits Spanish field names (`titulo`, `mensajes`, `rol`, ...); the
// aliases let the records accept those as well as the English ones.

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenRecord {
    access_token: String,
}

#[derive(Deserialize)]
struct UserRecord {
    id: i64,
    username: String,
    #[serde(default, alias = "nombre")]
    name: Option<String>,
    #[serde(default, alias = "isAdmin")]
    is_admin: bool,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            name: self.name,
            is_admin: self.is_admin,
        }
    }
}

#[derive(Deserialize)]
struct ConversationSummaryRecord {
    id: i64,
    #[serde(default, alias = "titulo")]
    title: Option<String>,
    #[serde(default, alias = "fecha_creacion", alias = "createdAt")]
    created_at: Option<String>,
}
impl ConversationSummaryRecord {
    fn to_domain(self) -> ConversationSummary {
        ConversationSummary {
            id: self.id,
            title: self.title.unwrap_or_default(),
            created_at: parse_timestamp(self.created_at),
        }
    }
}

#[derive(Deserialize)]
struct MessageRecord {
    #[serde(alias = "rol")]
    role: String,
    #[serde(default, alias = "contenido")]
    content: Option<String>,
    #[serde(default, alias = "fuentes")]
    sources: Option<Vec<String>>,
}
impl MessageRecord {
    fn to_domain(self) -> Message {
        let role = if self.role.eq_ignore_ascii_case("user") {
            Role::User
        } else {
            Role::Assistant
        };
        Message {
            role,
            content: self.content.unwrap_or_default(),
            sources: self.sources.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct MessageBody<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ConversationRecord {
    id: i64,
    #[serde(default, alias = "titulo")]
    title: Option<String>,
    #[serde(default, alias = "mensajes")]
    messages: Option<Vec<MessageRecord>>,
}
impl ConversationRecord {
    fn to_domain(self) -> Conversation {
        Conversation {
            id: self.id,
            title: self.title.unwrap_or_default(),
            messages: self
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(MessageRecord::to_domain)
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct AnswerRecord {
    #[serde(default, alias = "respuesta")]
    answer: Option<String>,
    #[serde(default, alias = "fuentes")]
    sources: Option<Vec<String>>,
}
impl AnswerRecord {
    fn to_domain(self) -> Answer {
        Answer {
            answer: self.answer.unwrap_or_default(),
            sources: self.sources.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct DatasetRecord {
    id: i64,
    #[serde(default, alias = "nombre", alias = "nombre_archivo")]
    name: Option<String>,
    #[serde(default, alias = "fecha_subida")]
    uploaded_at: Option<String>,
}
impl DatasetRecord {
    fn to_domain(self) -> Dataset {
        Dataset {
            id: self.id,
            name: self.name.unwrap_or_default(),
            uploaded_at: parse_timestamp(self.uploaded_at),
        }
    }
}

#[derive(Deserialize)]
struct UploadedDocumentRecord {
    id: i64,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
struct ManagedUserRecord {
    id: i64,
    username: String,
    #[serde(default, alias = "nombre")]
    name: Option<String>,
    #[serde(default, alias = "isAdmin")]
    is_admin: bool,
    #[serde(default = "default_active", alias = "activo")]
    active: bool,
}
impl ManagedUserRecord {
    fn to_domain(self) -> ManagedUser {
        ManagedUser {
            id: self.id,
            username: self.username,
            name: self.name,
            is_admin: self.is_admin,
            active: self.active,
        }
    }
}

#[derive(Serialize)]
struct NewUserBody<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(rename = "nombre", skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    is_admin: bool,
}

//=========================================================================================
// `BackendService` Trait Implementation
//=========================================================================================

#[async_trait]
impl BackendService for HttpBackend {
    async fn login(&self, username: &str, password: &str) -> PortResult<String> {
        let request = self
            .client
            .post(self.url("/login"))
            .json(&LoginRequest { username, password });
        let record: TokenRecord = self.send_json(request).await?;
        Ok(record.access_token)
    }

    async fn current_user(&self) -> PortResult<User> {
        let record: UserRecord = self.send_json(self.client.get(self.url("/me"))).await?;
        Ok(record.to_domain())
    }

    async fn list_conversations(&self) -> PortResult<Vec<ConversationSummary>> {
        let records: Vec<ConversationSummaryRecord> = self
            .send_json(self.client.get(self.url("/conversaciones")))
            .await?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_conversation(&self, title: Option<&str>) -> PortResult<ConversationSummary> {
        let mut request = self.client.post(self.url("/conversaciones/"));
        if let Some(title) = title {
            request = request.query(&[("titulo", title)]);
        }
        let record: ConversationSummaryRecord = self.send_json(request).await?;
        Ok(record.to_domain())
    }

    async fn get_conversation(&self, conversation_id: i64) -> PortResult<Conversation> {
        let url = self.url(&format!("/conversaciones/{}", conversation_id));
        let record: ConversationRecord = self.send_json(self.client.get(url)).await?;
        Ok(record.to_domain())
    }

    async fn append_message(&self, conversation_id: i64, message: &Message) -> PortResult<()> {
        let url = self.url(&format!("/conversaciones/{}/mensaje", conversation_id));
        let body = MessageBody {
            role: message.role.as_str(),
            content: &message.content,
        };
        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: i64) -> PortResult<()> {
        let url = self.url(&format!("/conversaciones/{}", conversation_id));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn request_answer(&self, question: &str) -> PortResult<Answer> {
        let request = self
            .client
            .get(self.url("/buscar"))
            .query(&[("pregunta", question)]);
        let record: AnswerRecord = self.send_json(request).await?;
        Ok(record.to_domain())
    }

    async fn list_datasets(&self) -> PortResult<Vec<Dataset>> {
        let records: Vec<DatasetRecord> = self
            .send_json(self.client.get(self.url("/listar-datasets")))
            .await?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn upload_dataset(&self, file: &UploadFile) -> PortResult<()> {
        let form = Self::upload_form("archivo", file)?;
        self.send(self.client.post(self.url("/upload")).multipart(form))
            .await?;
        Ok(())
    }

    async fn delete_dataset(&self, dataset_id: i64) -> PortResult<()> {
        let url = self.url(&format!("/eliminar-dataset/{}", dataset_id));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn upload_pdf(&self, file: &UploadFile) -> PortResult<i64> {
        let form = Self::upload_form("file", file)?;
        let record: UploadedDocumentRecord = self
            .send_json(self.client.post(self.url("/upload-pdf")).multipart(form))
            .await?;
        Ok(record.id)
    }

    async fn list_users(&self) -> PortResult<Vec<ManagedUser>> {
        let records: Vec<ManagedUserRecord> = self
            .send_json(self.client.get(self.url("/admin/users")))
            .await?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_user(&self, user: &NewUser) -> PortResult<ManagedUser> {
        let body = NewUserBody {
            username: &user.username,
            password: &user.password,
            name: user.name.as_deref(),
            is_admin: user.is_admin,
        };
        let record: ManagedUserRecord = self
            .send_json(self.client.post(self.url("/admin/users")).json(&body))
            .await?;
        Ok(record.to_domain())
    }

    async fn set_user_active(&self, user_id: i64, active: bool) -> PortResult<()> {
        let url = self.url(&format!("/admin/users/{}/estado", user_id));
        let request = self
            .client
            .patch(url)
            .query(&[("activo", if active { "true" } else { "false" })]);
        self.send(request).await?;
        Ok(())
    }

    async fn delete_user(&self, user_id: i64) -> PortResult<()> {
        let url = self.url(&format!("/admin/users/{}", user_id));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}
