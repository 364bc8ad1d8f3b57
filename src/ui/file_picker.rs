//! System file dialog restricted to audio files.

use std::path::PathBuf;

use {
    anyhow::{Error, Result, anyhow},
    libadwaita::{
        ApplicationWindow,
        gio::ListStore,
        glib::Error as GlibError,
        gtk::{
            DialogError::{self, Cancelled, Dismissed},
            FileDialog, FileFilter,
        },
        prelude::FileExt,
    },
    tracing::debug,
};

use crate::error::ErrorReporter;

/// MIME pattern accepted by the picker.
pub const AUDIO_MIME_PATTERN: &str = "audio/*";

/// Builds the dialog with an "Audio files" filter selected by default.
#[must_use]
pub fn build_audio_dialog() -> FileDialog {
    let filter = FileFilter::new();
    filter.set_name(Some("Audio files"));
    filter.add_mime_type(AUDIO_MIME_PATTERN);

    let filters = ListStore::new::<FileFilter>();
    filters.append(&filter);

    FileDialog::builder()
        .title("Open Audio File")
        .accept_label("Open")
        .modal(true)
        .filters(&filters)
        .default_filter(&filter)
        .build()
}

/// Shows the picker and waits for a choice.
///
/// Returns `Ok(None)` when the user cancels or the chosen file has no
/// local path.
///
/// # Errors
///
/// Returns an error if the dialog itself fails.
pub async fn pick_audio_file(window: &ApplicationWindow) -> Result<Option<PathBuf>> {
    let dialog = build_audio_dialog();

    match dialog.open_future(Some(window)).await {
        Ok(file) => {
            let path = file.path();
            if path.is_none() {
                debug!(uri = %file.uri(), "Selected file has no local path");
            }
            Ok(path)
        }
        Err(e) if is_dismissal(&e) => {
            ErrorReporter::debug(&Error::from(e), "File selection cancelled");
            Ok(None)
        }
        Err(e) => Err(anyhow!("File dialog failed: {e}")),
    }
}

fn is_dismissal(error: &GlibError) -> bool {
    matches!(error.kind::<DialogError>(), Some(Cancelled | Dismissed))
}
