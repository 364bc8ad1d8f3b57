//! Pickplay - a single-screen audio player
//!
//! Pick one audio file, play it, see its embedded cover art, pause and
//! resume at the exact offset and seek with a slider. Decoding runs on
//! Symphonia and output on CPAL, with a Libadwaita user interface.

pub mod audio;
pub mod config;
pub mod error;
pub mod state;
pub mod ui;

// Re-export key types for convenience
pub use {
    audio::{
        backend::{CpalBackend, MediaBackend, MediaPlayer, TrackDetails},
        engine::AudioEngine,
    },
    config::{SettingsManager, UserSettings},
    error::{AudioError, UiError},
    state::{PlaybackState, PlayerController, PlayerEvent},
    ui::PickplayApplication,
};
