//! Playback backend abstraction.
//!
//! The player controller only needs a handful of transport operations and a
//! way to read a file's details. These traits keep it independent of `cpal`
//! so the state machine can be driven by a scripted backend in tests.

use std::path::Path;

use tracing::{debug, warn};

use crate::{
    audio::{
        artwork::Artwork,
        engine::{AudioEngine, EngineState},
        metadata::{TagReader, TechnicalMetadata},
        output::OutputConfig,
    },
    config::UserSettings,
    error::AudioError,
};

/// A player bound to one audio file.
///
/// Dropping the player releases every resource it holds.
pub trait MediaPlayer {
    /// Starts or continues playback.
    ///
    /// # Errors
    ///
    /// Returns `AudioError` if playback cannot be started.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Pauses playback.
    ///
    /// # Errors
    ///
    /// Returns `AudioError` if playback cannot be paused.
    fn pause(&mut self) -> Result<(), AudioError>;

    /// Moves the playback position.
    ///
    /// # Errors
    ///
    /// Returns `AudioError` if the request cannot be delivered.
    fn seek_to(&mut self, position_ms: u64) -> Result<(), AudioError>;

    /// Current playback position in milliseconds.
    fn current_position(&self) -> u64;

    /// Total duration in milliseconds, 0 if unknown.
    fn duration_ms(&self) -> u64;

    /// Whether audio is currently being played.
    fn is_playing(&self) -> bool;

    /// Whether the file has been played to its end.
    fn is_finished(&self) -> bool;
}

/// Details shown for a selected file.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDetails {
    /// Tag title, or the file name when the file has none.
    pub title: String,
    /// Tag artist.
    pub artist: Option<String>,
    /// Technical properties, when the file could be analysed.
    pub technical: Option<TechnicalMetadata>,
    /// Embedded picture, if present.
    pub artwork: Option<Artwork>,
}

impl TrackDetails {
    /// Details for a file whose tags could not be read.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        Self {
            title: file_title(path),
            artist: None,
            technical: None,
            artwork: None,
        }
    }
}

/// Creates players and reads file details.
pub trait MediaBackend {
    /// Player type produced by this backend.
    type Player: MediaPlayer;

    /// Opens `path` and returns a paused player positioned at the start.
    ///
    /// # Errors
    ///
    /// Returns `AudioError` if the file cannot be accessed, decoded or
    /// routed to an output device.
    fn create_player(&self, path: &Path) -> Result<Self::Player, AudioError>;

    /// Reads tags, technical properties and embedded artwork.
    ///
    /// # Errors
    ///
    /// Returns `AudioError` if the tags cannot be read.
    fn read_track_details(&self, path: &Path) -> Result<TrackDetails, AudioError>;
}

/// Backend that plays through `cpal` and reads tags with `lofty`.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    /// Output configuration handed to every engine.
    output_config: OutputConfig,
}

impl CpalBackend {
    /// Creates a backend using the given output configuration.
    #[must_use]
    pub fn new(output_config: OutputConfig) -> Self {
        Self { output_config }
    }

    /// Creates a backend from user settings.
    #[must_use]
    pub fn from_settings(settings: &UserSettings) -> Self {
        Self::new(OutputConfig::from(settings))
    }
}

impl MediaBackend for CpalBackend {
    type Player = AudioEngine;

    fn create_player(&self, path: &Path) -> Result<AudioEngine, AudioError> {
        AudioEngine::open(path, self.output_config.clone())
    }

    fn read_track_details(&self, path: &Path) -> Result<TrackDetails, AudioError> {
        let metadata = TagReader::read_metadata(path)?;

        let artwork = match metadata.artwork.map(Artwork::from_bytes).transpose() {
            Ok(artwork) => {
                if let Some(artwork) = &artwork {
                    debug!(
                        mime_type = ?artwork.mime_type,
                        bytes = artwork.data.len(),
                        "Found embedded picture"
                    );
                }
                artwork
            }
            Err(e) => {
                warn!(path = %path.display(), "Ignoring embedded picture: {e}");
                None
            }
        };

        Ok(TrackDetails {
            title: metadata
                .standard
                .title
                .filter(|title| !title.trim().is_empty())
                .unwrap_or_else(|| file_title(path)),
            artist: metadata.standard.artist,
            technical: Some(metadata.technical),
            artwork,
        })
    }
}

impl MediaPlayer for AudioEngine {
    fn start(&mut self) -> Result<(), AudioError> {
        self.play()
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        AudioEngine::pause(self)
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<(), AudioError> {
        self.seek(position_ms)
    }

    fn current_position(&self) -> u64 {
        self.position_ms()
    }

    fn duration_ms(&self) -> u64 {
        AudioEngine::duration_ms(self)
    }

    fn is_playing(&self) -> bool {
        self.state() == EngineState::Playing
    }

    fn is_finished(&self) -> bool {
        AudioEngine::is_finished(self)
    }
}

/// File name without extension, used when a file has no title tag.
fn file_title(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::audio::backend::{CpalBackend, MediaBackend, TrackDetails, file_title};

    #[test]
    fn test_file_title_strips_extension() {
        assert_eq!(file_title(Path::new("/music/Blue in Green.flac")), "Blue in Green");
        assert_eq!(file_title(Path::new("noext")), "noext");
    }

    #[test]
    fn test_details_from_path() {
        let details = TrackDetails::from_path(Path::new("/music/So What.mp3"));
        assert_eq!(details.title, "So What");
        assert!(details.artist.is_none());
        assert!(details.artwork.is_none());
    }

    #[test]
    fn test_missing_file_details_are_an_error() {
        let backend = CpalBackend::default();
        assert!(
            backend
                .read_track_details(Path::new("/definitely/not/here.flac"))
                .is_err()
        );
    }
}
