//! Operational error context propagation with `anyhow`.
//!
//! This module provides an extension trait for attaching context to errors
//! and a reporter that logs failures and turns them into toast messages.

use std::{error::Error as StdError, fmt::Display};

use {
    anyhow::{Context, Error, Result as AnyhowResult},
    tracing::{debug, error, warn},
};

use crate::{
    audio::{decoder::DecoderError, output::OutputError},
    error::domain::AudioError,
};

/// Extension trait for enhanced error context.
pub trait ResultExt<T, E> {
    /// Adds context to an error with a static string.
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;

    /// Adds context to an error with a formatted string.
    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(context)
    }

    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(format.to_string())
    }
}

/// Centralized error reporting and logging.
pub struct ErrorReporter;

impl ErrorReporter {
    /// Reports a debug-level error (cancelled dialogs and similar).
    pub fn debug(error: &Error, context: &str) {
        debug!(context = context, error = %error, "Ignored error");
    }

    /// Reports a recoverable failure.
    pub fn warn(error: &Error, context: &str) {
        warn!(context = context, error = ?error, "Recoverable error");
    }

    /// Reports a failure the user has to know about and returns the toast text.
    pub fn error(error: &Error, context: &str) -> String {
        error!(context = context, error = ?error, "Operation failed");
        Self::to_user_message(error)
    }

    /// Converts an error to a user-friendly message.
    ///
    /// Known audio failures get a plain-language sentence; anything else
    /// falls back to the top-level message of the chain.
    pub fn to_user_message(error: &Error) -> String {
        let audio_error = error
            .chain()
            .find_map(|cause| cause.downcast_ref::<AudioError>());

        match audio_error {
            Some(AudioError::AccessDenied { .. }) => "The file could not be opened".to_string(),
            Some(AudioError::DecoderError(
                DecoderError::UnsupportedFormat | DecoderError::NoAudioTrack,
            )) => "This file is not a supported audio format".to_string(),
            Some(AudioError::DecoderError(DecoderError::SymphoniaError(_))) => {
                "The audio file could not be decoded".to_string()
            }
            Some(AudioError::OutputError(OutputError::NoDeviceFound)) => {
                "No audio output device is available".to_string()
            }
            _ => error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
    };

    use anyhow::{Error as AnyhowError, anyhow};

    use crate::{
        audio::{decoder::DecoderError, output::OutputError},
        error::{
            domain::AudioError,
            operational::{ErrorReporter, ResultExt},
        },
    };

    #[derive(Debug)]
    struct TestError;

    impl Display for TestError {
        fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
            write!(f, "Test error")
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_result_ext_with_context() {
        let result: Result<i32, TestError> = Err(TestError);
        let error = result.add_context("Additional context").unwrap_err();

        assert!(error.to_string().contains("Additional context"));
        assert!(format!("{error:#}").contains("Test error"));
    }

    #[test]
    fn test_result_ext_with_contextf() {
        let result: Result<i32, TestError> = Err(TestError);
        let error = result
            .add_contextf(format_args!("Opening {}", "song.flac"))
            .unwrap_err();

        assert!(error.to_string().contains("Opening song.flac"));
    }

    #[test]
    fn test_user_message_for_generic_error() {
        let error = anyhow!("Test error message");
        assert_eq!(ErrorReporter::to_user_message(&error), "Test error message");
    }

    #[test]
    fn test_user_message_for_audio_errors() {
        let unsupported = AnyhowError::new(AudioError::DecoderError(
            DecoderError::UnsupportedFormat,
        ));
        assert_eq!(
            ErrorReporter::to_user_message(&unsupported),
            "This file is not a supported audio format"
        );

        let no_device = AnyhowError::new(AudioError::OutputError(OutputError::NoDeviceFound));
        assert_eq!(
            ErrorReporter::to_user_message(&no_device),
            "No audio output device is available"
        );
    }

    #[test]
    fn test_user_message_looks_through_context() {
        let error = AnyhowError::new(AudioError::AccessDenied {
            path: "/tmp/x.mp3".to_string(),
            reason: "denied".to_string(),
        })
        .context("Failed to open selected file");

        assert_eq!(
            ErrorReporter::to_user_message(&error),
            "The file could not be opened"
        );
    }
}
