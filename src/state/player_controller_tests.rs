//! Behaviour tests for the playback state machine.
//!
//! These drive `PlayerController` with a scripted backend whose players
//! record every call, so transitions can be checked without audio hardware.

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::Arc,
    };

    use {parking_lot::Mutex, tokio::sync::broadcast::error::TryRecvError};

    use crate::{
        audio::{
            artwork::Artwork,
            backend::{MediaBackend, MediaPlayer, TrackDetails},
            metadata::MetadataError,
        },
        config::ArtworkFallback,
        error::{AudioError, ErrorReporter},
        state::player_controller::{
            ArtworkUpdate, ControllerSettings, PAUSE_ICON, PLAY_ICON, PlayOutcome, PlaybackState,
            PlayerController, PlayerEvent,
        },
    };

    const PNG_BYTES: [u8; 6] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A];
    const TRACK_DURATION_MS: u64 = 180_000;

    /// What a fake player has been asked to do.
    #[derive(Debug, Default)]
    struct PlayerRecord {
        path: PathBuf,
        position_ms: u64,
        playing: bool,
        finished: bool,
        released: bool,
        seeks: Vec<u64>,
    }

    type Record = Arc<Mutex<PlayerRecord>>;

    struct FakePlayer {
        record: Record,
    }

    impl MediaPlayer for FakePlayer {
        fn start(&mut self) -> Result<(), AudioError> {
            let mut record = self.record.lock();
            record.playing = true;
            record.finished = false;
            Ok(())
        }

        fn pause(&mut self) -> Result<(), AudioError> {
            self.record.lock().playing = false;
            Ok(())
        }

        fn seek_to(&mut self, position_ms: u64) -> Result<(), AudioError> {
            let mut record = self.record.lock();
            record.position_ms = position_ms;
            record.seeks.push(position_ms);
            Ok(())
        }

        fn current_position(&self) -> u64 {
            self.record.lock().position_ms
        }

        fn duration_ms(&self) -> u64 {
            TRACK_DURATION_MS
        }

        fn is_playing(&self) -> bool {
            self.record.lock().playing
        }

        fn is_finished(&self) -> bool {
            self.record.lock().finished
        }
    }

    impl Drop for FakePlayer {
        fn drop(&mut self) {
            self.record.lock().released = true;
        }
    }

    /// Opens any path except ones containing "broken"; paths containing
    /// "noart" have no picture and "badtags" cannot be tag-read.
    #[derive(Default)]
    struct FakeBackend {
        players: Arc<Mutex<Vec<Record>>>,
    }

    impl MediaBackend for FakeBackend {
        type Player = FakePlayer;

        fn create_player(&self, path: &Path) -> Result<FakePlayer, AudioError> {
            if path.to_string_lossy().contains("broken") {
                return Err(AudioError::AccessDenied {
                    path: path.display().to_string(),
                    reason: "permission denied".to_string(),
                });
            }

            let record = Arc::new(Mutex::new(PlayerRecord {
                path: path.to_path_buf(),
                ..PlayerRecord::default()
            }));
            self.players.lock().push(Arc::clone(&record));
            Ok(FakePlayer { record })
        }

        fn read_track_details(&self, path: &Path) -> Result<TrackDetails, AudioError> {
            let name = path.to_string_lossy();
            if name.contains("badtags") {
                return Err(MetadataError::UnsupportedFormat.into());
            }

            let artwork = if name.contains("noart") {
                None
            } else {
                Some(Artwork::from_bytes(PNG_BYTES.to_vec()).unwrap())
            };

            Ok(TrackDetails {
                title: "Tagged Title".to_string(),
                artist: Some("Tagged Artist".to_string()),
                technical: None,
                artwork,
            })
        }
    }

    fn controller_with(
        settings: ControllerSettings,
    ) -> (PlayerController<FakeBackend>, Arc<Mutex<Vec<Record>>>) {
        let backend = FakeBackend::default();
        let players = Arc::clone(&backend.players);
        (PlayerController::new(backend, settings), players)
    }

    fn controller() -> (PlayerController<FakeBackend>, Arc<Mutex<Vec<Record>>>) {
        controller_with(ControllerSettings {
            artwork_fallback: ArtworkFallback::KeepPrevious,
            seek_while_dragging: true,
        })
    }

    fn record(players: &Arc<Mutex<Vec<Record>>>, index: usize) -> Record {
        Arc::clone(&players.lock()[index])
    }

    fn last_artwork_update(
        receiver: &mut tokio::sync::broadcast::Receiver<PlayerEvent>,
    ) -> Option<ArtworkUpdate> {
        let mut last = None;
        loop {
            match receiver.try_recv() {
                Ok(PlayerEvent::ArtworkChanged(update)) => last = Some(update),
                Ok(_) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => return last,
                Err(TryRecvError::Lagged(_)) => {}
            }
        }
    }

    #[test]
    fn test_new_controller_is_idle() {
        let (mut controller, _) = controller();
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert_eq!(controller.play_icon(), PLAY_ICON);
        assert_eq!(controller.duration_ms(), 0);
        assert_eq!(controller.poll_position(), None);
    }

    #[test]
    fn test_play_without_file_requests_picker() {
        let (mut controller, players) = controller();

        let outcome = controller.play_button_clicked().unwrap();

        assert_eq!(outcome, PlayOutcome::NeedsFile);
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(players.lock().is_empty());
    }

    #[test]
    fn test_selecting_file_starts_playback() {
        let (mut controller, players) = controller();

        controller.file_selected(Path::new("/music/a.flac")).unwrap();

        assert_eq!(controller.state(), PlaybackState::Playing);
        assert_eq!(controller.play_icon(), PAUSE_ICON);
        assert_eq!(controller.selected_file(), Some(Path::new("/music/a.flac")));
        assert_eq!(controller.duration_ms(), TRACK_DURATION_MS);

        let first = record(&players, 0);
        assert!(first.lock().playing);
        assert_eq!(first.lock().path, Path::new("/music/a.flac"));
    }

    #[test]
    fn test_pause_then_resume_restores_offset() {
        let (mut controller, players) = controller();
        controller.file_selected(Path::new("/music/a.flac")).unwrap();
        let player = record(&players, 0);

        player.lock().position_ms = 42_317;
        assert_eq!(controller.play_button_clicked().unwrap(), PlayOutcome::Paused);
        assert_eq!(controller.state(), PlaybackState::Paused);
        assert_eq!(controller.saved_position_ms(), 42_317);
        assert_eq!(controller.play_icon(), PLAY_ICON);
        assert!(!player.lock().playing);

        // Position reported by the engine may drift while paused
        player.lock().position_ms = 43_000;

        assert_eq!(controller.play_button_clicked().unwrap(), PlayOutcome::Resumed);
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert_eq!(player.lock().seeks.last(), Some(&42_317));
        assert_eq!(player.lock().position_ms, 42_317);
        assert!(player.lock().playing);
        assert_eq!(players.lock().len(), 1);
    }

    #[test]
    fn test_polling_is_suppressed_while_dragging() {
        let (mut controller, players) = controller();
        controller.file_selected(Path::new("/music/a.flac")).unwrap();
        record(&players, 0).lock().position_ms = 5_000;

        assert_eq!(controller.poll_position(), Some(5_000));

        controller.begin_seek_tracking();
        assert!(controller.is_seek_tracking());
        assert_eq!(controller.poll_position(), None);

        controller.end_seek_tracking().unwrap();
        assert_eq!(controller.poll_position(), Some(5_000));
    }

    #[test]
    fn test_new_file_releases_previous_player() {
        let (mut controller, players) = controller();
        controller.file_selected(Path::new("/music/a.flac")).unwrap();
        controller.file_selected(Path::new("/music/b.flac")).unwrap();

        assert!(record(&players, 0).lock().released);
        assert!(!record(&players, 1).lock().released);
        assert!(record(&players, 1).lock().playing);
        assert_eq!(controller.selected_file(), Some(Path::new("/music/b.flac")));
        assert_eq!(controller.saved_position_ms(), 0);
    }

    #[test]
    fn test_new_file_while_paused_starts_playing() {
        let (mut controller, players) = controller();
        controller.file_selected(Path::new("/music/a.flac")).unwrap();
        controller.pause().unwrap();

        controller.file_selected(Path::new("/music/b.flac")).unwrap();

        assert_eq!(controller.state(), PlaybackState::Playing);
        assert!(record(&players, 0).lock().released);
    }

    #[test]
    fn test_failed_open_keeps_previous_state() {
        let (mut controller, players) = controller();
        controller.file_selected(Path::new("/music/a.flac")).unwrap();
        record(&players, 0).lock().position_ms = 1_000;
        controller.pause().unwrap();

        let error = controller
            .file_selected(Path::new("/music/broken.flac"))
            .unwrap_err();

        assert_eq!(
            ErrorReporter::to_user_message(&error),
            "The file could not be opened"
        );
        assert_eq!(controller.state(), PlaybackState::Paused);
        assert_eq!(controller.selected_file(), Some(Path::new("/music/a.flac")));
        assert_eq!(controller.saved_position_ms(), 1_000);
        assert_eq!(players.lock().len(), 1);
        assert!(!record(&players, 0).lock().released);
    }

    #[test]
    fn test_track_end_pauses_at_start() {
        let (mut controller, players) = controller();
        controller.file_selected(Path::new("/music/a.flac")).unwrap();
        let player = record(&players, 0);
        {
            let mut state = player.lock();
            state.position_ms = TRACK_DURATION_MS;
            state.finished = true;
        }

        assert_eq!(controller.poll_position(), Some(0));
        assert_eq!(controller.state(), PlaybackState::Paused);
        assert_eq!(controller.saved_position_ms(), 0);
        assert!(!player.lock().playing);

        assert_eq!(controller.play_button_clicked().unwrap(), PlayOutcome::Resumed);
        assert_eq!(player.lock().seeks.last(), Some(&0));
        assert_eq!(controller.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_seek_is_clamped_to_duration() {
        let (mut controller, players) = controller();
        controller.file_selected(Path::new("/music/a.flac")).unwrap();

        controller.seek_from_user(TRACK_DURATION_MS + 5_000).unwrap();

        assert_eq!(record(&players, 0).lock().seeks, vec![TRACK_DURATION_MS]);
    }

    #[test]
    fn test_seek_while_paused_moves_resume_point() {
        let (mut controller, players) = controller();
        controller.file_selected(Path::new("/music/a.flac")).unwrap();
        controller.pause().unwrap();

        controller.seek_from_user(90_000).unwrap();
        assert_eq!(controller.saved_position_ms(), 90_000);
        assert_eq!(controller.poll_position(), Some(90_000));

        controller.resume().unwrap();
        assert_eq!(record(&players, 0).lock().seeks, vec![90_000, 90_000]);
    }

    #[test]
    fn test_seek_while_dragging_is_immediate() {
        let (mut controller, players) = controller();
        controller.file_selected(Path::new("/music/a.flac")).unwrap();

        controller.begin_seek_tracking();
        controller.seek_from_user(10_000).unwrap();
        controller.seek_from_user(20_000).unwrap();
        controller.end_seek_tracking().unwrap();

        assert_eq!(record(&players, 0).lock().seeks, vec![10_000, 20_000]);
    }

    #[test]
    fn test_seek_on_release_applies_latest_position() {
        let (mut controller, players) = controller_with(ControllerSettings {
            artwork_fallback: ArtworkFallback::KeepPrevious,
            seek_while_dragging: false,
        });
        controller.file_selected(Path::new("/music/a.flac")).unwrap();

        controller.begin_seek_tracking();
        controller.seek_from_user(10_000).unwrap();
        controller.seek_from_user(20_000).unwrap();
        assert!(record(&players, 0).lock().seeks.is_empty());

        controller.end_seek_tracking().unwrap();
        assert_eq!(record(&players, 0).lock().seeks, vec![20_000]);
    }

    #[test]
    fn test_seek_without_file_is_ignored() {
        let (mut controller, players) = controller();
        controller.seek_from_user(1_000).unwrap();
        assert!(players.lock().is_empty());
    }

    #[test]
    fn test_embedded_artwork_replaces_image() {
        let (mut controller, _) = controller();
        let mut receiver = controller.subscribe();

        controller.file_selected(Path::new("/music/a.flac")).unwrap();

        match last_artwork_update(&mut receiver) {
            Some(ArtworkUpdate::Replace(artwork)) => assert_eq!(artwork.data, PNG_BYTES),
            other => panic!("Expected artwork replacement, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_artwork_keeps_previous_by_default() {
        let (mut controller, _) = controller();
        let mut receiver = controller.subscribe();

        controller.file_selected(Path::new("/music/noart.mp3")).unwrap();

        assert_eq!(
            last_artwork_update(&mut receiver),
            Some(ArtworkUpdate::KeepPrevious)
        );
    }

    #[test]
    fn test_missing_artwork_uses_placeholder_when_configured() {
        let (mut controller, _) = controller_with(ControllerSettings {
            artwork_fallback: ArtworkFallback::Placeholder,
            seek_while_dragging: true,
        });
        let mut receiver = controller.subscribe();

        controller.file_selected(Path::new("/music/noart.mp3")).unwrap();

        assert_eq!(
            last_artwork_update(&mut receiver),
            Some(ArtworkUpdate::ShowPlaceholder)
        );
    }

    #[test]
    fn test_unreadable_tags_keep_image_and_use_file_name() {
        let (mut controller, _) = controller_with(ControllerSettings {
            artwork_fallback: ArtworkFallback::Placeholder,
            seek_while_dragging: true,
        });
        let mut receiver = controller.subscribe();

        controller.file_selected(Path::new("/music/badtags.ogg")).unwrap();
        assert_eq!(controller.state(), PlaybackState::Playing);

        let mut title = None;
        let mut artwork = None;
        while let Ok(event) = receiver.try_recv() {
            match event {
                PlayerEvent::TrackChanged { details, .. } => title = Some(details.title),
                PlayerEvent::ArtworkChanged(update) => artwork = Some(update),
                PlayerEvent::StateChanged(_) => {}
            }
        }

        assert_eq!(title.as_deref(), Some("badtags"));
        assert_eq!(artwork, Some(ArtworkUpdate::KeepPrevious));
    }

    #[test]
    fn test_selection_emits_events_in_order() {
        let (mut controller, _) = controller();
        let mut receiver = controller.subscribe();

        controller.file_selected(Path::new("/music/a.flac")).unwrap();

        assert!(matches!(
            receiver.try_recv(),
            Ok(PlayerEvent::StateChanged(PlaybackState::Playing))
        ));
        match receiver.try_recv() {
            Ok(PlayerEvent::TrackChanged {
                path,
                details,
                duration_ms,
            }) => {
                assert_eq!(path, Path::new("/music/a.flac"));
                assert_eq!(details.title, "Tagged Title");
                assert_eq!(details.artist.as_deref(), Some("Tagged Artist"));
                assert!(details.artwork.is_none());
                assert_eq!(duration_ms, TRACK_DURATION_MS);
            }
            other => panic!("Expected track change, got {other:?}"),
        }
        assert!(matches!(
            receiver.try_recv(),
            Ok(PlayerEvent::ArtworkChanged(ArtworkUpdate::Replace(_)))
        ));
    }

    #[test]
    fn test_shutdown_releases_player() {
        let (mut controller, players) = controller();
        controller.file_selected(Path::new("/music/a.flac")).unwrap();

        controller.shutdown();

        assert!(record(&players, 0).lock().released);
        assert_eq!(controller.poll_position(), None);
    }
}
