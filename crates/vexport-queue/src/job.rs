//! Queue payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vexport_models::{ExportId, ExportRequest};

/// One render attempt for an existing export record.
///
/// The export id is always present: the record is created before the job
/// is enqueued, and the worker refuses to guess which record a job
/// belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderExportJob {
    /// Unique id of this enqueue (distinct from the export id so a retry
    /// is traceable as its own attempt)
    pub job_id: String,
    /// The export record to run
    pub export_id: ExportId,
    /// Copy of the request, for logging and artifact naming
    pub request: ExportRequest,
    /// When the job was enqueued
    pub created_at: DateTime<Utc>,
}

impl RenderExportJob {
    /// Create a job for an export record.
    pub fn new(export_id: ExportId, request: ExportRequest) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            export_id,
            request,
            created_at: Utc::now(),
        }
    }
}
