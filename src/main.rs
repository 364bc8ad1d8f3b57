//! Pickplay - a single-screen audio player
//!
//! Entry point: sets up logging, initializes GTK/Libadwaita, loads user
//! settings and starts the main application loop.

use std::error::Error;

use {
    libadwaita::{gtk, init},
    tracing::info,
    tracing_subscriber::EnvFilter,
};

use pickplay::{UiError, config::SettingsManager, ui::PickplayApplication};

/// Main entry point for the Pickplay application.
///
/// Log verbosity follows `RUST_LOG` and defaults to `info`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize GTK and Libadwaita
    gtk::init().map_err(|e| UiError::InitializationError(e.to_string()))?;
    let _ = init();

    let settings = SettingsManager::new()
        .map_err(|e| format!("Failed to initialize settings: {e}"))?;
    info!(config = %settings.get_config_path().display(), "Settings loaded");

    let app = PickplayApplication::new(settings);
    let exit_code = app.run();
    info!(?exit_code, "Application exited");

    Ok(())
}
