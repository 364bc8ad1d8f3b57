//! Screen state: the playback state machine the UI drives.

#[cfg(test)]
mod player_controller_tests;

pub mod player_controller;

pub use player_controller::{
    ArtworkUpdate, ControllerSettings, PlayOutcome, PlaybackState, PlayerController, PlayerEvent,
};
