//! GoExport CLI wrapper.
//!
//! This crate provides:
//! - `RendererCommand`: deterministic argument/environment construction
//! - `RendererRunner`: one-shot process execution with a hard ceiling
//!
//! The renderer exclusively owns the virtual display and audio sink it
//! captures from; callers are responsible for never running two commands
//! at once (see the worker's single-permit executor).

pub mod command;
pub mod error;
pub mod runner;

pub use command::{RendererCommand, FALLBACK_PATH, PULSE_AUDIO_SINK, RENDER_DISPLAY};
pub use error::{RendererError, RendererResult};
pub use runner::{
    CommandRunner, RendererRunner, RunOutcome, DEFAULT_RUN_CEILING, MAX_CAPTURED_OUTPUT,
};
