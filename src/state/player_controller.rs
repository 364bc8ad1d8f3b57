//! Playback state machine for the single player screen.
//!
//! `PlayerController` owns the selected file, the one live player and the
//! saved resume offset. UI callbacks drive it through a small set of
//! operations and follow its changes through a broadcast channel.

use std::path::{Path, PathBuf};

use {
    anyhow::Result,
    tokio::sync::broadcast::{Receiver, Sender, channel},
    tracing::{debug, info, warn},
};

use crate::{
    audio::{
        artwork::Artwork,
        backend::{MediaBackend, MediaPlayer, TrackDetails},
    },
    config::{ArtworkFallback, UserSettings},
    error::ResultExt,
};

/// Icon shown on the play button while something is playing.
pub const PAUSE_ICON: &str = "media-playback-pause-symbolic";

/// Icon shown on the play button otherwise.
pub const PLAY_ICON: &str = "media-playback-start-symbolic";

/// Screen-level playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No file has been chosen yet.
    #[default]
    Idle,
    /// The selected file is playing.
    Playing,
    /// The selected file is paused at the saved offset.
    Paused,
}

impl PlaybackState {
    /// Icon name for the play button in this state.
    #[must_use]
    pub fn play_icon(self) -> &'static str {
        match self {
            PlaybackState::Playing => PAUSE_ICON,
            PlaybackState::Idle | PlaybackState::Paused => PLAY_ICON,
        }
    }
}

/// What a press of the play button did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Playback was paused.
    Paused,
    /// Playback resumed from the saved offset.
    Resumed,
    /// The selected file was opened and started from the beginning.
    Started,
    /// Nothing is selected; the caller should show the file picker.
    NeedsFile,
}

/// How the artwork view should change after a file is selected.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtworkUpdate {
    /// Show this picture.
    Replace(Artwork),
    /// Leave the current picture in place.
    KeepPrevious,
    /// Show the generic placeholder.
    ShowPlaceholder,
}

/// Change notifications for the UI.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// The playback state changed.
    StateChanged(PlaybackState),
    /// A new file is playing.
    TrackChanged {
        /// The file now playing.
        path: PathBuf,
        /// Title, artist and technical details (artwork travels separately).
        details: TrackDetails,
        /// Seek range upper bound in milliseconds.
        duration_ms: u64,
    },
    /// The artwork view should change.
    ArtworkChanged(ArtworkUpdate),
}

/// Settings the controller acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerSettings {
    /// Behaviour for files without embedded artwork.
    pub artwork_fallback: ArtworkFallback,
    /// Seek on every drag position instead of only on release.
    pub seek_while_dragging: bool,
}

impl From<&UserSettings> for ControllerSettings {
    fn from(settings: &UserSettings) -> Self {
        Self {
            artwork_fallback: settings.artwork_fallback,
            seek_while_dragging: settings.seek_while_dragging,
        }
    }
}

/// Coordinates the play button, the seek bar and the file picker with one
/// player at a time.
pub struct PlayerController<B: MediaBackend> {
    /// Creates players and reads file details.
    backend: B,
    /// Behaviour switches.
    settings: ControllerSettings,
    /// Current state.
    state: PlaybackState,
    /// Most recently chosen file.
    selected: Option<PathBuf>,
    /// The live player; replaced on every new selection.
    player: Option<B::Player>,
    /// Offset to resume from after a pause.
    saved_position_ms: u64,
    /// Set while the user holds the seek bar.
    seek_tracking: bool,
    /// Latest drag position when seeking only on release.
    pending_seek_ms: Option<u64>,
    /// Broadcast channel for change notifications.
    events: Sender<PlayerEvent>,
}

impl<B: MediaBackend> PlayerController<B> {
    /// Creates an idle controller.
    pub fn new(backend: B, settings: ControllerSettings) -> Self {
        let (events, _) = channel(16);

        Self {
            backend,
            settings,
            state: PlaybackState::Idle,
            selected: None,
            player: None,
            saved_position_ms: 0,
            seek_tracking: false,
            pending_seek_ms: None,
            events,
        }
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[must_use]
    pub fn selected_file(&self) -> Option<&Path> {
        self.selected.as_deref()
    }

    #[must_use]
    pub fn saved_position_ms(&self) -> u64 {
        self.saved_position_ms
    }

    #[must_use]
    pub fn is_seek_tracking(&self) -> bool {
        self.seek_tracking
    }

    /// Seek range upper bound of the current file, 0 without one.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.player.as_ref().map_or(0, MediaPlayer::duration_ms)
    }

    /// Icon name for the play button in the current state.
    #[must_use]
    pub fn play_icon(&self) -> &'static str {
        self.state.play_icon()
    }

    /// Handles a press of the play button.
    ///
    /// Pauses when playing. Otherwise resumes the live player, or opens and
    /// starts the selected file when there is no player. Without a selected
    /// file it asks the caller to show the picker.
    ///
    /// # Errors
    ///
    /// Returns an error if the player fails; the state is left as it was.
    pub fn play_button_clicked(&mut self) -> Result<PlayOutcome> {
        match self.state {
            PlaybackState::Playing => {
                self.pause()?;
                Ok(PlayOutcome::Paused)
            }
            _ if self.player.is_some() => {
                self.resume()?;
                Ok(PlayOutcome::Resumed)
            }
            _ => match self.selected.clone() {
                Some(path) => {
                    self.file_selected(&path)?;
                    Ok(PlayOutcome::Started)
                }
                None => {
                    debug!("Play pressed without a file, requesting picker");
                    Ok(PlayOutcome::NeedsFile)
                }
            },
        }
    }

    /// Opens `path` with a fresh player and starts it from the beginning.
    ///
    /// The previous player is released only after the new one has started,
    /// so a file that fails to open leaves everything as it was.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or started.
    pub fn file_selected(&mut self, path: &Path) -> Result<()> {
        let mut player = self
            .backend
            .create_player(path)
            .add_contextf(format_args!("Failed to open {}", path.display()))?;
        player
            .start()
            .add_contextf(format_args!("Failed to start {}", path.display()))?;

        let duration_ms = player.duration_ms();
        if self.player.replace(player).is_some() {
            debug!("Released previous player");
        }

        self.selected = Some(path.to_path_buf());
        self.saved_position_ms = 0;
        self.pending_seek_ms = None;
        self.set_state(PlaybackState::Playing);

        info!(path = %path.display(), duration_ms, "Playing selected file");

        let (mut details, artwork) = match self.backend.read_track_details(path) {
            Ok(details) => {
                let artwork = details.artwork.clone();
                (details, Some(artwork))
            }
            Err(e) => {
                warn!(path = %path.display(), "Failed to read track details: {e}");
                (TrackDetails::from_path(path), None)
            }
        };
        details.artwork = None;

        let artwork_update = match artwork {
            Some(Some(artwork)) => ArtworkUpdate::Replace(artwork),
            Some(None) => match self.settings.artwork_fallback {
                ArtworkFallback::KeepPrevious => ArtworkUpdate::KeepPrevious,
                ArtworkFallback::Placeholder => ArtworkUpdate::ShowPlaceholder,
            },
            // Extraction failed; leave the image alone
            None => ArtworkUpdate::KeepPrevious,
        };

        let _ = self.events.send(PlayerEvent::TrackChanged {
            path: path.to_path_buf(),
            details,
            duration_ms,
        });
        let _ = self.events.send(PlayerEvent::ArtworkChanged(artwork_update));

        Ok(())
    }

    /// Pauses playback and remembers the current offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the player cannot be paused.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != PlaybackState::Playing {
            return Ok(());
        }
        let Some(player) = self.player.as_mut() else {
            return Ok(());
        };

        let position_ms = player.current_position();
        player.pause().add_context("Failed to pause playback")?;

        self.saved_position_ms = position_ms;
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    /// Seeks the live player to the saved offset, then starts it.
    ///
    /// # Errors
    ///
    /// Returns an error if the player cannot seek or start.
    pub fn resume(&mut self) -> Result<()> {
        if self.state == PlaybackState::Playing {
            return Ok(());
        }
        let Some(player) = self.player.as_mut() else {
            return Ok(());
        };

        if player.is_playing() {
            self.set_state(PlaybackState::Playing);
            return Ok(());
        }

        player
            .seek_to(self.saved_position_ms)
            .add_context("Failed to restore playback position")?;
        player.start().add_context("Failed to resume playback")?;

        debug!(position_ms = self.saved_position_ms, "Resumed playback");
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Applies a position chosen on the seek bar.
    ///
    /// While the user drags with seek-on-release configured, only the latest
    /// position is remembered and applied by [`Self::end_seek_tracking`].
    ///
    /// # Errors
    ///
    /// Returns an error if the player rejects the seek.
    pub fn seek_from_user(&mut self, position_ms: u64) -> Result<()> {
        let Some(player) = self.player.as_mut() else {
            return Ok(());
        };

        let duration_ms = player.duration_ms();
        let target = if duration_ms > 0 {
            position_ms.min(duration_ms)
        } else {
            position_ms
        };

        if self.seek_tracking && !self.settings.seek_while_dragging {
            self.pending_seek_ms = Some(target);
            return Ok(());
        }

        player.seek_to(target).add_context("Failed to seek")?;
        if self.state == PlaybackState::Paused {
            self.saved_position_ms = target;
        }
        Ok(())
    }

    /// Marks the start of a drag on the seek bar.
    pub fn begin_seek_tracking(&mut self) {
        self.seek_tracking = true;
        debug!("Seek tracking started");
    }

    /// Marks the end of a drag and applies any deferred seek.
    ///
    /// # Errors
    ///
    /// Returns an error if the deferred seek fails.
    pub fn end_seek_tracking(&mut self) -> Result<()> {
        self.seek_tracking = false;
        debug!("Seek tracking stopped");

        match self.pending_seek_ms.take() {
            Some(position_ms) => self.seek_from_user(position_ms),
            None => Ok(()),
        }
    }

    /// Returns the position the seek bar should show, or `None` when it
    /// must not be touched (no file, or the user is dragging it).
    ///
    /// A player that reached the end of its file moves the controller to
    /// `Paused` with the saved offset back at the start.
    pub fn poll_position(&mut self) -> Option<u64> {
        if self.seek_tracking {
            return None;
        }

        let player = self.player.as_mut()?;

        match self.state {
            PlaybackState::Playing if player.is_finished() => {
                if let Err(e) = player.pause() {
                    warn!("Failed to pause finished player: {e}");
                }
                self.saved_position_ms = 0;
                info!("Playback reached the end of the file");
                self.set_state(PlaybackState::Paused);
                Some(0)
            }
            PlaybackState::Playing => Some(player.current_position()),
            PlaybackState::Paused => Some(self.saved_position_ms),
            PlaybackState::Idle => None,
        }
    }

    /// Releases the live player. Called when the screen goes away.
    pub fn shutdown(&mut self) {
        if self.player.take().is_some() {
            debug!("Released player on shutdown");
        }
        self.seek_tracking = false;
        self.pending_seek_ms = None;
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Playback state changed");
            self.state = state;
        }
        let _ = self.events.send(PlayerEvent::StateChanged(state));
    }
}
