//! Queue item and its lifecycle states

use crate::protocol::{ErrorKind, GeneratedOutput, GenerationResponse};
use crate::providers::catalog::ModelId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle of a queued job
///
/// `InProgress` is the only non-terminal state. An item leaves it exactly
/// once, either through its own completion or through cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    InProgress,
    Successful,
    Failed,
}

impl QueueStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, QueueStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::InProgress => "in_progress",
            QueueStatus::Successful => "successful",
            QueueStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted job as observed by callers
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: Uuid,
    pub model: ModelId,
    pub prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: QueueStatus,
    /// Identifier minted for a successful result
    pub result_id: Option<Uuid>,
    pub output: Option<Arc<GeneratedOutput>>,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    cancel: CancellationToken,
}

impl QueueItem {
    pub(crate) fn new(model: ModelId, prompt: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model,
            prompt,
            created_at: Utc::now(),
            status: QueueStatus::InProgress,
            result_id: None,
            output: None,
            error_message: None,
            error_kind: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == QueueStatus::InProgress
    }

    /// Token observed by the job's unit of work
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Move to the terminal state matching `response`
    pub(crate) fn settle(&mut self, response: GenerationResponse) {
        match response {
            GenerationResponse::Generated(output) => {
                self.status = QueueStatus::Successful;
                self.result_id = Some(Uuid::new_v4());
                self.output = Some(Arc::new(output));
            }
            GenerationResponse::Failed(failure) => self.fail(failure.kind, failure.message),
        }
    }

    pub(crate) fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.status = QueueStatus::Failed;
        self.error_kind = Some(kind);
        self.error_message = Some(message.into());
    }

    pub(crate) fn cancel(&mut self) {
        self.cancel.cancel();
        self.fail(ErrorKind::Cancelled, "Cancelled by user");
    }

    pub(crate) fn abandon(&self) {
        self.cancel.cancel();
    }
}
