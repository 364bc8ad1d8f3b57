//! Main application window.
//!
//! This module implements the `PickplayApplication`, which owns the
//! Libadwaita application and assembles the single player window.

use std::{rc::Rc, sync::Arc};

use {
    libadwaita::{
        Application, ApplicationWindow, ToastOverlay, ToolbarView,
        glib::{ExitCode, Propagation},
        prelude::{
            AdwApplicationWindowExt, ApplicationExt, ApplicationExtManual, ButtonExt, GtkWindowExt,
        },
    },
    parking_lot::Mutex,
    tracing::info,
};

use crate::{
    audio::backend::CpalBackend,
    config::{SettingsManager, UserSettings},
    state::{ControllerSettings, PlayerController},
    ui::{
        header_bar::HeaderBar,
        player_view::{PlayerView, SharedController, ViewContext, open_file},
    },
};

/// Application identifier registered with the session bus.
pub const APPLICATION_ID: &str = "com.example.pickplay";

/// Main application class.
///
/// Builds the player window on activation and hands user settings to the
/// playback controller.
pub struct PickplayApplication {
    /// The main application instance.
    pub app: Application,
    /// User settings manager.
    pub settings: SettingsManager,
}

impl PickplayApplication {
    /// Creates the application.
    ///
    /// # Arguments
    ///
    /// * `settings` - Loaded user settings
    #[must_use]
    pub fn new(settings: SettingsManager) -> Self {
        let app = Application::builder().application_id(APPLICATION_ID).build();
        Self { app, settings }
    }

    /// Runs the GTK main loop until the window closes.
    pub fn run(&self) -> ExitCode {
        self.app.connect_activate({
            let settings = self.settings.get_settings().clone();
            move |app| build_ui(app, &settings)
        });

        self.app.run()
    }
}

/// Creates the playback controller for the given settings.
#[must_use]
pub fn create_controller(settings: &UserSettings) -> SharedController {
    Arc::new(Mutex::new(PlayerController::new(
        CpalBackend::from_settings(settings),
        ControllerSettings::from(settings),
    )))
}

/// Builds and shows the player window.
fn build_ui(app: &Application, settings: &UserSettings) {
    let window = ApplicationWindow::builder()
        .application(app)
        .title("Pickplay")
        .default_width(420)
        .default_height(640)
        .build();

    let controller = create_controller(settings);
    let header_bar = HeaderBar::new();
    let toasts = ToastOverlay::new();

    let context = ViewContext {
        window: window.clone(),
        toasts: toasts.clone(),
        header_bar: header_bar.clone(),
    };
    let player_view = Rc::new(PlayerView::new(
        Arc::clone(&controller),
        &context,
        settings.poll_interval(),
    ));
    toasts.set_child(Some(&player_view.widget));

    let toolbar = ToolbarView::new();
    toolbar.add_top_bar(&header_bar.widget);
    toolbar.set_content(Some(&toasts));
    window.set_content(Some(&toolbar));

    header_bar.open_button.connect_clicked({
        let controller = Arc::clone(&controller);
        move |_| open_file(&controller, &context)
    });

    window.connect_close_request(move |_| {
        info!("Player window closing");
        player_view.shutdown();
        controller.lock().shutdown();
        Propagation::Proceed
    });

    window.present();
}

#[cfg(test)]
mod tests {
    use crate::{
        config::UserSettings,
        state::PlaybackState,
        ui::application::create_controller,
    };

    #[test]
    fn test_controller_starts_idle() {
        let controller = create_controller(&UserSettings::default());
        let controller = controller.lock();

        assert_eq!(controller.state(), PlaybackState::Idle);
        assert!(controller.selected_file().is_none());
    }
}
