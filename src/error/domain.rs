//! Domain-specific error types using `thiserror`.
//!
//! Two domains exist: audio (decoding, output, metadata, artwork) and the
//! user interface.

use thiserror::Error;

use crate::audio::{
    artwork::ArtworkError, decoder::DecoderError, metadata::MetadataError, output::OutputError,
    resampler::ResamplingError,
};

/// Audio-related errors.
#[derive(Error, Debug)]
pub enum AudioError {
    /// Decoder error from the audio decoder module.
    #[error("Decoder error: {0}")]
    DecoderError(#[from] DecoderError),
    /// Output error from the audio output module.
    #[error("Output error: {0}")]
    OutputError(#[from] OutputError),
    /// Metadata error from the metadata extraction module.
    #[error("Metadata error: {0}")]
    MetadataError(#[from] MetadataError),
    /// Artwork extraction error.
    #[error("Artwork error: {0}")]
    ArtworkError(#[from] ArtworkError),
    /// Sample rate conversion error.
    #[error("Resampling error: {0}")]
    ResamplingError(#[from] ResamplingError),
    /// The selected file cannot be opened for reading.
    #[error("Cannot access {path}: {reason}")]
    AccessDenied { path: String, reason: String },
    /// Invalid operation for current state.
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },
    /// The engine's control thread is gone.
    #[error("Playback engine is shut down")]
    EngineShutDown,
}

/// UI-related errors.
#[derive(Error, Debug)]
pub enum UiError {
    /// GTK/Libadwaita initialization error.
    #[error("UI initialization error: {0}")]
    InitializationError(String),
    /// Artwork bytes could not be turned into a texture.
    #[error("Image decoding error: {0}")]
    ImageDecodeError(String),
}
