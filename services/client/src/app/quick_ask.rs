//! services/client/src/app/quick_ask.rs
//!
//! The first, single-page front-end: upload one PDF, ask one question at a
//! time. No conversation history is kept.

use docchat_core::domain::UploadFile;
use docchat_core::ports::BackendService;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::admin::{ensure_pdf, read_upload};

pub const NO_ANSWER: &str = "No answer found.";
pub const ASK_FAILED: &str = "Error processing the question.";
pub const NO_FILE: &str = "Select a PDF file.";
pub const UPLOAD_FAILED: &str = "Error uploading the PDF.";

/// Clears the busy flag when dropped, including when the asking future is
/// cancelled mid-request.
struct BusyGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

pub struct QuickAskView {
    backend: Arc<dyn BackendService>,
    busy: AtomicBool,
    answer: Mutex<String>,
    status: Mutex<String>,
}

impl QuickAskView {
    pub fn new(backend: Arc<dyn BackendService>) -> Self {
        Self {
            backend,
            busy: AtomicBool::new(false),
            answer: Mutex::new(String::new()),
            status: Mutex::new(String::new()),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// The last answer shown, or an empty string.
    pub fn answer(&self) -> String {
        self.answer.lock().clone()
    }

    /// The last upload status line.
    pub fn status(&self) -> String {
        self.status.lock().clone()
    }

    /// Asks a single question. Returns the text shown as the answer, or
    /// `None` if the question was blank or another one is still running.
    pub async fn ask(&self, question: &str) -> Option<String> {
        let question = question.trim();
        if question.is_empty() {
            return None;
        }
        if self.busy.swap(true, Ordering::SeqCst) {
            return None;
        }
        let _busy = BusyGuard { busy: &self.busy };
        self.answer.lock().clear();

        let shown = match self.backend.request_answer(question).await {
            Ok(answer) if answer.answer.trim().is_empty() => NO_ANSWER.to_string(),
            Ok(answer) => answer.answer,
            Err(e) => {
                warn!(error = %e, "Quick question failed");
                ASK_FAILED.to_string()
            }
        };

        *self.answer.lock() = shown.clone();
        Some(shown)
    }

    /// Uploads a PDF to the single-document endpoint and returns the status
    /// line shown to the user.
    pub async fn upload_pdf(&self, file: Option<&UploadFile>) -> String {
        let status = match file {
            None => NO_FILE.to_string(),
            Some(file) => match ensure_pdf(file) {
                Err(e) => e.to_string(),
                Ok(()) => match self.backend.upload_pdf(file).await {
                    Ok(document_id) => {
                        info!(document_id, file_name = %file.file_name, "PDF uploaded");
                        format!("PDF uploaded successfully (ID: {})", document_id)
                    }
                    Err(e) => {
                        warn!(error = %e, file_name = %file.file_name, "PDF upload failed");
                        UPLOAD_FAILED.to_string()
                    }
                },
            },
        };
        *self.status.lock() = status.clone();
        status
    }

    pub async fn upload_pdf_path(&self, path: Option<&Path>) -> String {
        let file = match path {
            Some(path) => match read_upload(path).await {
                Ok(file) => Some(file),
                Err(e) => {
                    let status = e.to_string();
                    *self.status.lock() = status.clone();
                    return status;
                }
            },
            None => None,
        };
        self.upload_pdf(file.as_ref()).await
    }
}
