//! Request handlers.

pub mod exports;
pub mod health;
pub mod settings;

pub use health::{health, ready};
