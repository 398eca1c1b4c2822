use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Which submission path created a task. The provider keeps text-driven and
/// image-driven jobs under separate routes, so polls must carry this along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    Text,
    Image,
}

impl TaskSource {
    pub(crate) fn route(self) -> &'static str {
        match self {
            TaskSource::Text => "text-to-3d",
            TaskSource::Image => "image-to-3d",
        }
    }
}

/// Task status as reported by the mesh provider. Unknown vocabulary is kept
/// verbatim in `Other` and treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
    Other(String),
}

impl TaskStatus {
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "PENDING" => TaskStatus::Pending,
            "IN_PROGRESS" => TaskStatus::InProgress,
            "SUCCEEDED" => TaskStatus::Succeeded,
            "FAILED" => TaskStatus::Failed,
            "CANCELED" => TaskStatus::Canceled,
            other => TaskStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Canceled => "CANCELED",
            TaskStatus::Other(raw) => raw.as_str(),
        }
    }

    /// No further state change is expected after a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One asynchronous mesh-generation job. Created on successful submission and
/// refreshed by each poll; discarded when the caller resets or resubmits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    pub task_id: String,
    pub source: TaskSource,
    pub status: TaskStatus,
    /// Base URL that accepted the submission. Sticky: subsequent polls prefer
    /// this base because task state may not be replicated across shards.
    pub accepted_endpoint: Option<String>,
    pub mesh_url: Option<String>,
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TextTaskRequest {
    pub prompt: String,
    pub style: Option<String>,
    pub topology: Option<String>,
    pub mode: Option<String>,
}

impl TextTaskRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageTaskRequest {
    /// Raw image bytes; cloned cheaply when the multipart form is rebuilt
    /// for each fallback attempt.
    pub image: Bytes,
    pub image_mime_type: String,
    pub prompt: Option<String>,
    pub style: Option<String>,
    pub topology: Option<String>,
    pub mode: Option<String>,
}

impl ImageTaskRequest {
    pub fn new(image: impl Into<Bytes>, image_mime_type: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            image_mime_type: image_mime_type.into(),
            ..Self::default()
        }
    }
}

/// Input for the image-understanding path.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub image: Bytes,
    pub mime_type: String,
    pub notes: Option<String>,
}
