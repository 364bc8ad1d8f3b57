//! User preference loading with XDG Base Directory compliance.
//!
//! Settings are read once at startup from
//! `$XDG_CONFIG_HOME/pickplay/settings.json`. The player never writes the
//! file; a missing file or missing keys fall back to defaults.

use std::{
    env::var,
    fs::read_to_string,
    io::Error as StdError,
    path::{Path, PathBuf},
    time::Duration,
};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Error as SerdeJsonError, from_str},
    thiserror::Error,
    tracing::debug,
};

/// Smallest accepted position poll interval.
const MIN_POLL_INTERVAL_MS: u64 = 50;

/// Error type for settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read the settings file.
    #[error("IO error: {0}")]
    IoError(#[from] StdError),
    /// Failed to deserialize settings.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] SerdeJsonError),
    /// Invalid settings value.
    #[error("Invalid settings value: {reason}")]
    InvalidValue { reason: String },
}

/// What the artwork view shows when a newly selected file has no embedded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtworkFallback {
    /// Leave whatever image is currently displayed.
    #[default]
    KeepPrevious,
    /// Replace the image with the generic placeholder.
    Placeholder,
}

/// Serializable user settings structure with default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Audio output device name (default device when unset).
    pub audio_device: Option<String>,
    /// Output callback timeout in milliseconds.
    pub buffer_duration_ms: u32,
    /// How often the seek bar is refreshed from the playback position.
    pub position_poll_interval_ms: u64,
    /// Seek on every intermediate drag position instead of only on release.
    pub seek_while_dragging: bool,
    /// Behaviour when a file carries no embedded artwork.
    pub artwork_fallback: ArtworkFallback,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            audio_device: None,
            buffer_duration_ms: 50,
            position_poll_interval_ms: 1000,
            seek_while_dragging: true,
            artwork_fallback: ArtworkFallback::KeepPrevious,
        }
    }
}

impl UserSettings {
    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` for a zero buffer duration or a
    /// poll interval below 50 ms.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.buffer_duration_ms == 0 {
            return Err(SettingsError::InvalidValue {
                reason: "buffer_duration_ms must be greater than 0".to_string(),
            });
        }

        if self.position_poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(SettingsError::InvalidValue {
                reason: format!(
                    "position_poll_interval_ms must be at least {MIN_POLL_INTERVAL_MS}"
                ),
            });
        }

        Ok(())
    }

    /// Position poll interval as a `Duration`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_interval_ms)
    }
}

/// Handles loading and validation of user preferences.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    /// Loaded user settings.
    settings: UserSettings,
    /// Path to the configuration file on disk.
    config_path: PathBuf,
}

impl SettingsManager {
    /// Creates a new settings manager from the default config path.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if an existing settings file cannot be read,
    /// parsed or validated.
    pub fn new() -> Result<Self, SettingsError> {
        Self::with_config_path(get_config_path())
    }

    /// Creates a new settings manager with a custom config path (for testing).
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if an existing settings file cannot be read,
    /// parsed or validated.
    pub fn with_config_path(config_path: PathBuf) -> Result<Self, SettingsError> {
        let settings = if config_path.exists() {
            debug!("Loading settings from existing file: {:?}", config_path);
            load_settings(&config_path)?
        } else {
            debug!("No settings file at {:?}, using defaults", config_path);
            UserSettings::default()
        };

        settings.validate()?;

        Ok(SettingsManager {
            settings,
            config_path,
        })
    }

    /// Gets the current settings.
    #[must_use]
    pub fn get_settings(&self) -> &UserSettings {
        &self.settings
    }

    /// Gets the configuration file path.
    #[must_use]
    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }
}

fn load_settings(path: &Path) -> Result<UserSettings, SettingsError> {
    let contents = read_to_string(path)?;
    Ok(from_str(&contents)?)
}

/// Ensures proper XDG directory usage for the config file.
///
/// # Returns
///
/// The path to the configuration file.
#[must_use]
pub fn get_config_path() -> PathBuf {
    let mut config_dir = get_xdg_config_home();
    config_dir.push("pickplay");
    config_dir.push("settings.json");
    config_dir
}

/// Gets the XDG config home directory following XDG Base Directory specification.
///
/// Uses `XDG_CONFIG_HOME` environment variable if set, otherwise defaults to $HOME/.config
fn get_xdg_config_home() -> PathBuf {
    if let Ok(config_home) = var("XDG_CONFIG_HOME")
        && !config_home.is_empty()
    {
        return PathBuf::from(config_home);
    }

    if let Ok(home) = var("HOME") {
        let mut path = PathBuf::from(home);
        path.push(".config");
        return path;
    }

    // Fallback to current directory if HOME is not set (shouldn't happen on Unix)
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use std::{
        fs::write,
        io::{Error, ErrorKind::NotFound},
        time::Duration,
    };

    use {
        serde_json::{from_str, to_string},
        tempfile::tempdir,
    };

    use crate::config::settings::{ArtworkFallback, SettingsError, SettingsManager, UserSettings};

    #[test]
    fn test_user_settings_default() {
        let settings = UserSettings::default();
        assert_eq!(settings.audio_device, None);
        assert_eq!(settings.buffer_duration_ms, 50);
        assert_eq!(settings.position_poll_interval_ms, 1000);
        assert!(settings.seek_while_dragging);
        assert_eq!(settings.artwork_fallback, ArtworkFallback::KeepPrevious);
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_user_settings_serialization() {
        let settings = UserSettings {
            audio_device: Some("Test Device".to_string()),
            buffer_duration_ms: 100,
            position_poll_interval_ms: 250,
            seek_while_dragging: false,
            artwork_fallback: ArtworkFallback::Placeholder,
        };

        let serialized = to_string(&settings).unwrap();
        assert!(serialized.contains("\"placeholder\""));
        let deserialized: UserSettings = from_str(&serialized).unwrap();
        assert_eq!(settings, deserialized);
    }

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings: UserSettings = from_str(r#"{ "seek_while_dragging": false }"#).unwrap();
        assert!(!settings.seek_while_dragging);
        assert_eq!(settings.position_poll_interval_ms, 1000);
        assert_eq!(settings.artwork_fallback, ArtworkFallback::KeepPrevious);
    }

    #[test]
    fn test_validate_rejects_tiny_poll_interval() {
        let settings = UserSettings {
            position_poll_interval_ms: 10,
            ..UserSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let manager = SettingsManager::with_config_path(dir.path().join("settings.json")).unwrap();
        assert_eq!(manager.get_settings(), &UserSettings::default());
        assert!(!manager.get_config_path().exists());
    }

    #[test]
    fn test_existing_file_is_loaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        write(
            &path,
            r#"{ "audio_device": "USB DAC", "artwork_fallback": "placeholder" }"#,
        )
        .unwrap();

        let manager = SettingsManager::with_config_path(path).unwrap();
        let settings = manager.get_settings();
        assert_eq!(settings.audio_device.as_deref(), Some("USB DAC"));
        assert_eq!(settings.artwork_fallback, ArtworkFallback::Placeholder);
        assert_eq!(settings.buffer_duration_ms, 50);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        write(&path, "{ not json").unwrap();

        let result = SettingsManager::with_config_path(path);
        assert!(matches!(result, Err(SettingsError::SerializationError(_))));
    }

    #[test]
    fn test_settings_error_display() {
        let io_error = Error::new(NotFound, "File not found");
        let settings_error = SettingsError::IoError(io_error);
        assert!(settings_error.to_string().contains("IO error"));

        let invalid_value_error = SettingsError::InvalidValue {
            reason: "test reason".to_string(),
        };
        assert_eq!(
            invalid_value_error.to_string(),
            "Invalid settings value: test reason"
        );
    }
}
