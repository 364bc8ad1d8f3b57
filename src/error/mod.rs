//! Error handling built on `thiserror` and `anyhow`.
//!
//! Domain-specific error types give precise handling in the audio and UI
//! layers, while the operational helpers attach context and report failures
//! to the log and to the user.

pub mod domain;
pub mod operational;

pub use {
    domain::{AudioError, UiError},
    operational::{ErrorReporter, ResultExt},
};
