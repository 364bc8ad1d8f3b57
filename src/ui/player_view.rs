//! The single player screen.
//!
//! Cover art, track labels, a play/pause button and a seek bar, wired to a
//! shared `PlayerController`. Widget updates happen only on the GTK main
//! context and never while the controller lock is held.

use std::{cell::RefCell, path::Path, sync::Arc, time::Duration};

use {
    anyhow::Error,
    libadwaita::{
        ApplicationWindow, Toast, ToastOverlay,
        glib::{MainContext, Propagation},
        gtk::{
            Align::Center,
            Box as GtkBox, Button, GestureDrag, Label,
            Orientation::{Horizontal, Vertical},
            PropagationPhase::Capture,
            Scale,
            pango::EllipsizeMode::End,
        },
        prelude::{BoxExt, ButtonExt, EventControllerExt, GestureDragExt, GestureExt, RangeExt, WidgetExt},
    },
    parking_lot::Mutex,
    tokio::sync::broadcast::error::RecvError::{Closed, Lagged},
    tracing::debug,
};

use crate::{
    audio::backend::{CpalBackend, TrackDetails},
    error::ErrorReporter,
    state::{PlayOutcome, PlaybackState, PlayerController, PlayerEvent},
    ui::{
        components::CoverArt,
        file_picker::pick_audio_file,
        header_bar::HeaderBar,
        position_ticker::PositionTicker,
        utils::{create_format_display, format_timestamp, ms_to_scale_value, scale_value_to_ms},
    },
};

/// Controller shared between the widgets' signal handlers.
pub type SharedController = Arc<Mutex<PlayerController<CpalBackend>>>;

/// Window-level widgets the player screen reports to.
#[derive(Clone)]
pub struct ViewContext {
    /// Parent for the file picker.
    pub window: ApplicationWindow,
    /// Receives error toasts.
    pub toasts: ToastOverlay,
    /// Shows the playing file name.
    pub header_bar: HeaderBar,
}

/// Player screen widgets.
pub struct PlayerView {
    /// Root container.
    pub widget: GtkBox,
    /// Embedded artwork or placeholder.
    pub cover_art: CoverArt,
    /// Track title.
    pub title_label: Label,
    /// Track artist; hidden when unknown.
    pub artist_label: Label,
    /// Codec and sample format summary.
    pub format_label: Label,
    /// Play/pause toggle.
    pub play_button: Button,
    /// Seek bar in milliseconds.
    pub seek_scale: Scale,
    /// Elapsed time.
    pub position_label: Label,
    /// Track length.
    pub duration_label: Label,
    /// Playback controller.
    controller: SharedController,
    /// Refreshes the seek bar while the screen is shown.
    ticker: RefCell<Option<PositionTicker>>,
}

impl PlayerView {
    /// Builds the screen, connects its controls and starts position polling.
    ///
    /// # Arguments
    ///
    /// * `controller` - Shared playback controller
    /// * `context` - Window-level widgets for dialogs, toasts and the title
    /// * `poll_interval` - How often the seek bar follows playback
    #[must_use]
    pub fn new(controller: SharedController, context: &ViewContext, poll_interval: Duration) -> Self {
        let widget = GtkBox::builder()
            .orientation(Vertical)
            .spacing(12)
            .margin_top(24)
            .margin_bottom(24)
            .margin_start(24)
            .margin_end(24)
            .valign(Center)
            .css_classes(["player-view"])
            .build();

        let cover_art = CoverArt::default();
        widget.append(&cover_art.widget);

        let title_label = Label::builder()
            .label("No file selected")
            .ellipsize(End)
            .css_classes(["title-2"])
            .build();
        widget.append(&title_label);

        let artist_label = Label::builder()
            .ellipsize(End)
            .visible(false)
            .css_classes(["dim-label"])
            .build();
        widget.append(&artist_label);

        let format_label = Label::builder()
            .visible(false)
            .css_classes(["caption", "dim-label"])
            .build();
        widget.append(&format_label);

        let progress = GtkBox::builder().orientation(Horizontal).spacing(6).build();

        let position_label = Label::builder()
            .label(format_timestamp(0))
            .width_chars(5)
            .xalign(1.0)
            .css_classes(["dim-label", "numeric"])
            .build();
        progress.append(&position_label);

        let seek_scale = Scale::builder()
            .orientation(Horizontal)
            .hexpand(true)
            .draw_value(false)
            .sensitive(false)
            .build();
        seek_scale.set_range(0.0, 0.0);
        progress.append(&seek_scale);

        let duration_label = Label::builder()
            .label(format_timestamp(0))
            .width_chars(5)
            .xalign(0.0)
            .css_classes(["dim-label", "numeric"])
            .build();
        progress.append(&duration_label);

        widget.append(&progress);

        let play_button = Button::builder()
            .icon_name(PlaybackState::Idle.play_icon())
            .tooltip_text("Play")
            .halign(Center)
            .css_classes(["circular", "suggested-action"])
            .build();
        widget.append(&play_button);

        let view = Self {
            widget,
            cover_art,
            title_label,
            artist_label,
            format_label,
            play_button,
            seek_scale,
            position_label,
            duration_label,
            controller,
            ticker: RefCell::new(None),
        };

        view.connect_controls(context);
        view.subscribe_to_events(context);
        view.start_ticker(poll_interval);
        view
    }

    /// Stops position polling. Called when the window goes away.
    pub fn shutdown(&self) {
        if let Some(mut ticker) = self.ticker.borrow_mut().take() {
            ticker.stop();
        }
    }

    /// Whether the seek bar is still being refreshed.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.ticker
            .borrow()
            .as_ref()
            .is_some_and(PositionTicker::is_running)
    }

    fn connect_controls(&self, context: &ViewContext) {
        let controller = Arc::clone(&self.controller);
        let play_context = context.clone();
        self.play_button.connect_clicked(move |_| {
            let result = controller.lock().play_button_clicked();
            match result {
                Ok(PlayOutcome::NeedsFile) => open_file(&controller, &play_context),
                Ok(outcome) => debug!(?outcome, "Play button handled"),
                Err(e) => show_error(&play_context.toasts, &e, "Playback control failed"),
            }
        });

        let controller = Arc::clone(&self.controller);
        let toasts = context.toasts.clone();
        let position_label = self.position_label.clone();
        self.seek_scale.connect_change_value(move |_, _, value| {
            let position_ms = scale_value_to_ms(value);
            position_label.set_label(&format_timestamp(position_ms));

            let result = controller.lock().seek_from_user(position_ms);
            if let Err(e) = result {
                show_error(&toasts, &e, "Seek failed");
            }
            Propagation::Proceed
        });

        // Observes presses on the seek bar without taking them from it
        let drag = GestureDrag::new();
        drag.set_propagation_phase(Capture);

        let controller = Arc::clone(&self.controller);
        drag.connect_drag_begin(move |_, _, _| {
            controller.lock().begin_seek_tracking();
        });

        let controller = Arc::clone(&self.controller);
        let toasts = context.toasts.clone();
        drag.connect_drag_end(move |_, _, _| {
            end_seek_tracking(&controller, &toasts);
        });

        let controller = Arc::clone(&self.controller);
        let toasts = context.toasts.clone();
        drag.connect_cancel(move |_, _| {
            end_seek_tracking(&controller, &toasts);
        });

        self.seek_scale.add_controller(drag);
    }

    fn subscribe_to_events(&self, context: &ViewContext) {
        let mut receiver = self.controller.lock().subscribe();
        let widgets = TrackWidgets {
            cover_art: self.cover_art.clone(),
            title_label: self.title_label.clone(),
            artist_label: self.artist_label.clone(),
            format_label: self.format_label.clone(),
            play_button: self.play_button.clone(),
            seek_scale: self.seek_scale.clone(),
            position_label: self.position_label.clone(),
            duration_label: self.duration_label.clone(),
            header_bar: context.header_bar.clone(),
        };

        MainContext::default().spawn_local(async move {
            loop {
                match receiver.recv().await {
                    Ok(PlayerEvent::StateChanged(state)) => widgets.show_state(state),
                    Ok(PlayerEvent::TrackChanged {
                        path,
                        details,
                        duration_ms,
                    }) => widgets.show_track(&path, &details, duration_ms),
                    Ok(PlayerEvent::ArtworkChanged(update)) => {
                        if let Err(e) = widgets.cover_art.apply(&update) {
                            ErrorReporter::warn(&Error::from(e), "Keeping current artwork");
                        }
                    }
                    Err(Lagged(skipped)) => {
                        debug!(skipped, "Player view lagged behind controller events");
                    }
                    Err(Closed) => {
                        debug!("Player event channel closed");
                        break;
                    }
                }
            }
        });
    }

    fn start_ticker(&self, interval: Duration) {
        let controller = Arc::clone(&self.controller);
        let seek_scale = self.seek_scale.clone();
        let position_label = self.position_label.clone();

        let ticker = PositionTicker::start(interval, move || {
            let position = controller.lock().poll_position();
            if let Some(position_ms) = position {
                seek_scale.set_value(ms_to_scale_value(position_ms));
                position_label.set_label(&format_timestamp(position_ms));
            }
        });

        self.ticker.replace(Some(ticker));
    }
}

/// Widgets touched by controller events.
struct TrackWidgets {
    cover_art: CoverArt,
    title_label: Label,
    artist_label: Label,
    format_label: Label,
    play_button: Button,
    seek_scale: Scale,
    position_label: Label,
    duration_label: Label,
    header_bar: HeaderBar,
}

impl TrackWidgets {
    fn show_state(&self, state: PlaybackState) {
        self.play_button.set_icon_name(state.play_icon());
        let tooltip = match state {
            PlaybackState::Playing => "Pause",
            PlaybackState::Idle | PlaybackState::Paused => "Play",
        };
        self.play_button.set_tooltip_text(Some(tooltip));
    }

    fn show_track(&self, path: &Path, details: &TrackDetails, duration_ms: u64) {
        self.title_label.set_label(&details.title);
        self.title_label.set_tooltip_text(Some(&details.title));

        match &details.artist {
            Some(artist) => {
                self.artist_label.set_label(artist);
                self.artist_label.set_visible(true);
            }
            None => self.artist_label.set_visible(false),
        }

        match create_format_display(details.technical.as_ref(), path) {
            Some(format) => {
                self.format_label.set_label(&format);
                self.format_label.set_visible(true);
            }
            None => self.format_label.set_visible(false),
        }

        self.seek_scale.set_range(0.0, ms_to_scale_value(duration_ms));
        self.seek_scale.set_increments(5_000.0, 30_000.0);
        self.seek_scale.set_value(0.0);
        self.seek_scale.set_sensitive(duration_ms > 0);
        self.position_label.set_label(&format_timestamp(0));
        self.duration_label.set_label(&format_timestamp(duration_ms));

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.header_bar.set_file_name(&file_name);
    }
}

/// Shows the file picker and starts the chosen file.
pub fn open_file(controller: &SharedController, context: &ViewContext) {
    let controller = Arc::clone(controller);
    let context = context.clone();

    MainContext::default().spawn_local(async move {
        match pick_audio_file(&context.window).await {
            Ok(Some(path)) => {
                let result = controller.lock().file_selected(&path);
                if let Err(e) = result {
                    show_error(&context.toasts, &e, "Failed to play selected file");
                }
            }
            Ok(None) => {}
            Err(e) => show_error(&context.toasts, &e, "File picker failed"),
        }
    });
}

fn end_seek_tracking(controller: &SharedController, toasts: &ToastOverlay) {
    let result = controller.lock().end_seek_tracking();
    if let Err(e) = result {
        show_error(toasts, &e, "Seek failed");
    }
}

/// Logs `error` and shows it as a toast.
fn show_error(toasts: &ToastOverlay, error: &Error, context: &str) {
    let message = ErrorReporter::error(error, context);
    toasts.add_toast(Toast::new(&message));
}
