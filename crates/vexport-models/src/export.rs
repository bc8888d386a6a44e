//! Export records and their lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for an export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ExportId(pub String);

impl ExportId {
    /// Generate a new random export ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Export lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    /// Created, waiting for a render slot
    #[default]
    Pending,
    /// The renderer is running
    InProgress,
    /// Render finished, artifact available
    Completed,
    /// Render failed (retryable via explicit retry)
    Failed,
    /// Cancelled before the render started
    Cancelled,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::InProgress => "in_progress",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
            ExportStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal for the normal flow (retry re-opens `Failed`).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExportStatus::Completed | ExportStatus::Failed | ExportStatus::Cancelled
        )
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, ExportStatus::Pending | ExportStatus::InProgress)
    }

    pub fn can_retry(&self) -> bool {
        matches!(self, ExportStatus::Failed)
    }

    /// Whether the lifecycle permits moving from `self` to `to`.
    pub fn can_transition_to(&self, to: ExportStatus) -> bool {
        use ExportStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Pending, Cancelled)
                | (InProgress, Cancelled)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attempted status change the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid export transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ExportStatus,
    pub to: ExportStatus,
}

/// Caller-supplied description of what to render. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExportRequest {
    /// Remote service hosting the video
    pub service: String,
    /// Owner of the video on that service
    pub owner_id: String,
    /// Video to render
    pub video_id: String,
    /// Aspect ratio key (validated against the catalog at submission)
    pub aspect_ratio: String,
    /// Resolution key (validated against the catalog at submission)
    pub resolution: String,
    /// Whether the caller asked for the outro (operator force_outro can override)
    #[serde(default)]
    pub outro: bool,
}

/// An export tracked through its lifecycle.
///
/// The orchestrator is the sole writer while a record is in flight; the
/// transition methods refuse any status change the lifecycle forbids.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExportRecord {
    /// Unique export ID, stable for the record's life
    pub id: ExportId,

    /// The request this export was created from
    pub request: ExportRequest,

    /// Lifecycle status
    #[serde(default)]
    pub status: ExportStatus,

    /// Externally reachable artifact reference, set only on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,

    /// Merged stdout/stderr captured from the last run attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_output: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ExportRecord {
    /// Create a new pending record.
    pub fn new(request: ExportRequest) -> Self {
        let now = Utc::now();
        Self {
            id: ExportId::new(),
            request,
            status: ExportStatus::Pending,
            artifact_url: None,
            process_output: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, to: ExportStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(to) {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Start the render: `pending -> in_progress`.
    pub fn begin(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ExportStatus::InProgress)
    }

    /// Record a successful run: `in_progress -> completed`.
    pub fn complete(
        &mut self,
        artifact_url: impl Into<String>,
        output: impl Into<String>,
    ) -> Result<(), InvalidTransition> {
        self.transition(ExportStatus::Completed)?;
        self.artifact_url = Some(artifact_url.into());
        self.process_output = Some(output.into());
        Ok(())
    }

    /// Record a failed run: `in_progress -> failed`.
    pub fn fail(&mut self, output: Option<String>) -> Result<(), InvalidTransition> {
        self.transition(ExportStatus::Failed)?;
        self.process_output = output;
        Ok(())
    }

    /// Cancel before completion: `pending|in_progress -> cancelled`.
    ///
    /// Leaves any artifact reference untouched (none exists for these
    /// states by invariant).
    pub fn cancel(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ExportStatus::Cancelled)
    }

    /// Re-open a failed export: `failed -> pending`, discarding the old
    /// artifact reference and captured output.
    pub fn reset_for_retry(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ExportStatus::Pending)?;
        self.artifact_url = None;
        self.process_output = None;
        Ok(())
    }
}
