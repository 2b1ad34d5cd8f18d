//! services/client/src/app/admin.rs
//!
//! The admin view: dataset and user management. Self-contained; access is
//! decided by the guard before any of this runs. Every mutation refetches the
//! affected list rather than patching the cached one.

use bytes::Bytes;
use docchat_core::domain::{Dataset, ManagedUser, NewUser, UploadFile};
use docchat_core::ports::{BackendService, PortError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Only PDF files are accepted: '{file_name}' is {detected}")]
    NotPdf { file_name: String, detected: String },
    #[error("A user named '{0}' already exists")]
    DuplicateUsername(String),
    #[error("Username and password are required")]
    MissingFields,
    #[error("Could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Backend(#[from] PortError),
}

/// Reads a file from disk for upload. The MIME type is sniffed from the
/// content, so a renamed file is still recognized for what it is.
pub async fn read_upload(path: &Path) -> Result<UploadFile, AdminError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| AdminError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let content_type = infer::get(&bytes).map(|kind| kind.mime_type().to_string());
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadFile {
        file_name,
        content_type,
        bytes: Bytes::from(bytes),
    })
}

/// Rejects anything that is not a PDF before it reaches the network.
pub fn ensure_pdf(file: &UploadFile) -> Result<(), AdminError> {
    if file.is_pdf() {
        return Ok(());
    }
    Err(AdminError::NotPdf {
        file_name: file.file_name.clone(),
        detected: file
            .content_type
            .clone()
            .unwrap_or_else(|| "of an unknown type".to_string()),
    })
}

//=========================================================================================
// Datasets
//=========================================================================================

pub struct DatasetAdmin {
    backend: Arc<dyn BackendService>,
    datasets: Mutex<Vec<Dataset>>,
}

impl DatasetAdmin {
    pub fn new(backend: Arc<dyn BackendService>) -> Self {
        Self {
            backend,
            datasets: Mutex::new(Vec::new()),
        }
    }

    pub fn datasets(&self) -> Vec<Dataset> {
        self.datasets.lock().clone()
    }

    pub async fn refresh(&self) -> Result<Vec<Dataset>, AdminError> {
        let datasets = self.backend.list_datasets().await?;
        *self.datasets.lock() = datasets.clone();
        Ok(datasets)
    }

    pub async fn upload(&self, file: &UploadFile) -> Result<(), AdminError> {
        ensure_pdf(file)?;
        self.backend.upload_dataset(file).await?;
        info!(file_name = %file.file_name, size = file.bytes.len(), "Dataset uploaded");
        self.refresh().await?;
        Ok(())
    }

    pub async fn upload_path(&self, path: &Path) -> Result<(), AdminError> {
        let file = read_upload(path).await?;
        self.upload(&file).await
    }

    pub async fn delete(&self, dataset_id: i64) -> Result<(), AdminError> {
        self.backend.delete_dataset(dataset_id).await?;
        info!(dataset_id, "Dataset deleted");
        self.refresh().await?;
        Ok(())
    }
}

//=========================================================================================
// Users
//=========================================================================================

pub struct UserAdmin {
    backend: Arc<dyn BackendService>,
    users: Mutex<Vec<ManagedUser>>,
}

impl UserAdmin {
    pub fn new(backend: Arc<dyn BackendService>) -> Self {
        Self {
            backend,
            users: Mutex::new(Vec::new()),
        }
    }

    pub fn users(&self) -> Vec<ManagedUser> {
        self.users.lock().clone()
    }

    pub async fn refresh(&self) -> Result<Vec<ManagedUser>, AdminError> {
        let users = self.backend.list_users().await?;
        *self.users.lock() = users.clone();
        Ok(users)
    }

    /// Creates an account. A duplicate username is reported as
    /// `DuplicateUsername` and is not retried.
    pub async fn create(&self, new_user: NewUser) -> Result<ManagedUser, AdminError> {
        if new_user.username.trim().is_empty() || new_user.password.is_empty() {
            return Err(AdminError::MissingFields);
        }
        let created = match self.backend.create_user(&new_user).await {
            Ok(created) => created,
            Err(PortError::Conflict(detail)) => {
                warn!(username = %new_user.username, %detail, "Username already taken");
                return Err(AdminError::DuplicateUsername(new_user.username));
            }
            Err(e) => return Err(e.into()),
        };
        info!(user_id = created.id, username = %created.username, is_admin = created.is_admin, "User created");
        self.refresh().await?;
        Ok(created)
    }

    pub async fn set_active(&self, user_id: i64, active: bool) -> Result<(), AdminError> {
        self.backend.set_user_active(user_id, active).await?;
        info!(user_id, active, "User status changed");
        self.refresh().await?;
        Ok(())
    }

    pub async fn delete(&self, user_id: i64) -> Result<(), AdminError> {
        self.backend.delete_user(user_id).await?;
        info!(user_id, "User deleted");
        self.refresh().await?;
        Ok(())
    }
}
