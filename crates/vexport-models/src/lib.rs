//! Shared data models for the VExport backend.
//!
//! This crate provides Serde-serializable types for:
//! - Export requests and records with lifecycle transitions
//! - Operator-configurable settings (renderer options, catalogs, retention)

pub mod export;
pub mod settings;

// Re-export common types
pub use export::{ExportId, ExportRecord, ExportRequest, ExportStatus, InvalidTransition};
pub use settings::{
    default_aspect_ratios, default_resolutions, keys, Catalog, RendererSettings,
    SettingsSnapshot, DEFAULT_PURGE_AFTER_MINUTES,
};
