//! Embedded artwork handling.
//!
//! Wraps the picture bytes pulled out of a file's tags together with the
//! image type sniffed from their magic bytes.

use {
    lofty::picture::MimeType::{self, Bmp, Gif, Jpeg, Png, Tiff},
    thiserror::Error,
};

/// Error type for artwork operations.
#[derive(Error, Debug)]
pub enum ArtworkError {
    /// The embedded picture carries no data.
    #[error("Embedded picture is empty")]
    Empty,
}

/// An embedded picture ready to be handed to the image decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Artwork {
    /// Raw image bytes as stored in the tag.
    pub data: Vec<u8>,
    /// Image type detected from the data, if recognised.
    pub mime_type: Option<MimeType>,
}

impl Artwork {
    /// Wraps raw picture bytes.
    ///
    /// # Errors
    ///
    /// Returns `ArtworkError::Empty` if `data` is empty.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, ArtworkError> {
        if data.is_empty() {
            return Err(ArtworkError::Empty);
        }

        let mime_type = detect_mime_type(&data);
        Ok(Self { data, mime_type })
    }
}

/// Detects MIME type from binary data.
///
/// # Arguments
///
/// * `data` - Binary artwork data.
///
/// # Returns
///
/// An `Option<MimeType>` representing the detected MIME type.
#[must_use]
pub fn detect_mime_type(data: &[u8]) -> Option<MimeType> {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => Some(Jpeg),
        [0x89, b'P', b'N', b'G', ..] => Some(Png),
        [b'G', b'I', b'F', b'8', ..] => Some(Gif),
        [b'B', b'M', _, _, ..] => Some(Bmp),
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some(Tiff),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use lofty::picture::MimeType::{Jpeg, Png, Tiff};

    use crate::audio::artwork::{Artwork, ArtworkError, detect_mime_type};

    #[test]
    fn test_detect_mime_type() {
        let jpeg_data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        assert_eq!(detect_mime_type(&jpeg_data), Some(Jpeg));

        let png_data = vec![0x89, b'P', b'N', b'G'];
        assert_eq!(detect_mime_type(&png_data), Some(Png));

        let tiff_data = vec![b'I', b'I', 0x2A, 0x00];
        assert_eq!(detect_mime_type(&tiff_data), Some(Tiff));

        let unknown_data = vec![0x00, 0x01, 0x02, 0x03];
        assert_eq!(detect_mime_type(&unknown_data), None);

        assert_eq!(detect_mime_type(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn test_artwork_from_bytes() {
        let artwork = Artwork::from_bytes(vec![0x89, b'P', b'N', b'G', 0x0D]).unwrap();
        assert_eq!(artwork.mime_type, Some(Png));
        assert_eq!(artwork.data.len(), 5);

        let unknown = Artwork::from_bytes(vec![1, 2, 3]).unwrap();
        assert_eq!(unknown.mime_type, None);
    }

    #[test]
    fn test_empty_artwork_is_rejected() {
        assert!(matches!(Artwork::from_bytes(Vec::new()), Err(ArtworkError::Empty)));
    }
}
