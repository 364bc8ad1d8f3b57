//! Album cover display with a placeholder for files without artwork.
//!
//! This module implements the `CoverArt` component that shows the picture
//! embedded in the playing file, following GNOME HIG guidelines.

use libadwaita::{
    gdk::{Paintable, Texture},
    glib::Bytes,
    gtk::{
        AccessibleRole::Img, Align::Center, ContentFit::Cover, Image, Overlay, Picture,
        PolicyType::Never, ScrolledWindow, Widget,
    },
    prelude::{AccessibleExt, Cast, WidgetExt},
};

use crate::{audio::artwork::Artwork, error::UiError, state::ArtworkUpdate};

/// Icon shown when no artwork is available.
const PLACEHOLDER_ICON: &str = "audio-x-generic-symbolic";

/// Container for the cover picture and its placeholder icon.
#[derive(Clone)]
pub struct CoverArt {
    /// The underlying GTK widget container.
    pub widget: Widget,
    /// The picture widget displaying the artwork.
    pub picture: Picture,
    /// Icon shown instead of a picture.
    pub placeholder: Image,
}

impl CoverArt {
    /// Creates a square cover display showing the placeholder.
    ///
    /// # Arguments
    ///
    /// * `size` - Width and height in pixels
    pub fn new(size: i32) -> Self {
        // Cover fills the square area completely
        let picture = Picture::builder()
            .content_fit(Cover)
            .css_classes(["cover-art-picture"])
            .build();
        picture.set_accessible_role(Img);

        // Clips the picture to the requested size
        let scrolled_window = ScrolledWindow::builder()
            .hscrollbar_policy(Never)
            .vscrollbar_policy(Never)
            .width_request(size)
            .height_request(size)
            .propagate_natural_width(false)
            .propagate_natural_height(false)
            .has_frame(false)
            .min_content_width(size)
            .min_content_height(size)
            .child(&picture)
            .build();

        let placeholder = Image::builder()
            .icon_name(PLACEHOLDER_ICON)
            .pixel_size(size / 3)
            .halign(Center)
            .valign(Center)
            .css_classes(["dim-label"])
            .build();

        let overlay = Overlay::builder()
            .child(&scrolled_window)
            .halign(Center)
            .valign(Center)
            .hexpand(false)
            .vexpand(false)
            .width_request(size)
            .height_request(size)
            .css_classes(["cover-art-container", "card"])
            .build();
        overlay.add_overlay(&placeholder);

        let cover_art = Self {
            widget: overlay.upcast_ref::<Widget>().clone(),
            picture,
            placeholder,
        };
        cover_art.show_placeholder();
        cover_art
    }

    /// Applies an artwork change coming from the player controller.
    ///
    /// # Errors
    ///
    /// Returns `UiError::ImageDecodeError` if a replacement picture cannot be
    /// decoded; the current image stays in place.
    pub fn apply(&self, update: &ArtworkUpdate) -> Result<(), UiError> {
        match update {
            ArtworkUpdate::Replace(artwork) => self.show_artwork(artwork),
            ArtworkUpdate::ShowPlaceholder => {
                self.show_placeholder();
                Ok(())
            }
            ArtworkUpdate::KeepPrevious => Ok(()),
        }
    }

    /// Decodes and displays an embedded picture.
    ///
    /// # Errors
    ///
    /// Returns `UiError::ImageDecodeError` if GDK cannot decode the data.
    pub fn show_artwork(&self, artwork: &Artwork) -> Result<(), UiError> {
        let bytes = Bytes::from(&artwork.data[..]);
        let texture =
            Texture::from_bytes(&bytes).map_err(|e| UiError::ImageDecodeError(e.to_string()))?;

        self.picture.set_paintable(Some(&texture));
        self.picture.set_tooltip_text(Some("Album artwork"));
        self.placeholder.set_visible(false);
        Ok(())
    }

    /// Clears the picture and shows the placeholder icon.
    pub fn show_placeholder(&self) {
        self.picture.set_paintable(None::<&Paintable>);
        self.picture.set_tooltip_text(Some("No album artwork"));
        self.placeholder.set_visible(true);
    }

    /// Whether a decoded picture is currently displayed.
    #[must_use]
    pub fn has_artwork(&self) -> bool {
        self.picture.paintable().is_some()
    }
}

impl Default for CoverArt {
    fn default() -> Self {
        Self::new(256)
    }
}
