//! User preferences read from an XDG-compliant settings file.

pub mod settings;

pub use settings::{ArtworkFallback, SettingsError, SettingsManager, UserSettings, get_config_path};
