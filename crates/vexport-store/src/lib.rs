//! Persistence for export records and operator settings.
//!
//! This crate provides:
//! - `ExportRepository`: durable export records (Redis or in-memory)
//! - `SettingsProvider`: read-through cached key/value settings with
//!   immediate invalidation on write

pub mod error;
pub mod repository;
pub mod settings;

pub use error::{StoreError, StoreResult};
pub use repository::{ExportRepository, MemoryExportRepository, RedisExportRepository};
pub use settings::{
    MemorySettingsStore, RedisSettingsStore, SettingsProvider, SettingsStore,
};
