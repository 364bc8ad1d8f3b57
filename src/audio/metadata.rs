//! Audio file metadata extraction using the `lofty` crate.
//!
//! This module extracts the tag fields shown under the artwork (title,
//! artist, album), the technical properties used for the format line, and
//! the embedded front cover if the file carries one.

use std::{fs::metadata, io::Error as StdError, path::Path};

use {
    lofty::{
        error::{ErrorKind::UnknownFormat, LoftyError},
        file::FileType,
        picture::PictureType::{CoverBack, CoverFront, Leaflet},
        prelude::{AudioFile, TaggedFileExt},
        probe::Probe,
        tag::Accessor,
    },
    serde::{Deserialize, Serialize},
    thiserror::Error,
    tracing::debug,
};

/// Error type for metadata extraction operations.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// Failed to read or parse the audio file.
    #[error("Failed to read audio file: {0}")]
    ReadError(#[from] LoftyError),
    /// Failed to stat the file.
    #[error("IO error: {0}")]
    IoError(#[from] StdError),
    /// The file format is not supported.
    #[error("Unsupported file format")]
    UnsupportedFormat,
}

/// Standard audio metadata extracted from tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardMetadata {
    /// Track title.
    pub title: Option<String>,
    /// Track artist.
    pub artist: Option<String>,
    /// Album name.
    pub album: Option<String>,
}

/// Technical metadata about the audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalMetadata {
    /// Container format (e.g., "FLAC", "MP3", "WAV").
    pub format: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bits per sample, when the format has a fixed depth.
    pub bits_per_sample: Option<u32>,
    /// Number of audio channels.
    pub channels: u32,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Audio bitrate in kbps, when known.
    pub bitrate_kbps: Option<u32>,
    /// File size in bytes.
    pub file_size: u64,
    /// Whether the format is lossless.
    pub is_lossless: bool,
}

/// Combined metadata containing both standard and technical information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Standard tag-based metadata.
    pub standard: StandardMetadata,
    /// Technical audio properties.
    pub technical: TechnicalMetadata,
    /// Embedded artwork data (if available).
    pub artwork: Option<Vec<u8>>,
}

/// Reads tags and properties from audio files.
///
/// # Examples
///
/// ```no_run
/// use pickplay::audio::metadata::TagReader;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let metadata = TagReader::read_metadata("/path/to/song.flac")?;
///     println!("Title: {:?}", metadata.standard.title);
///     println!("Sample rate: {} Hz", metadata.technical.sample_rate);
///     Ok(())
/// }
/// ```
pub struct TagReader;

impl TagReader {
    /// Reads and extracts complete metadata from an audio file.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError` if:
    /// - The file cannot be read or parsed
    /// - The file format is unsupported
    pub fn read_metadata<P: AsRef<Path>>(path: P) -> Result<TrackMetadata, MetadataError> {
        let path = path.as_ref();

        let file_size = metadata(path)?.len();

        let tagged_file = Probe::open(path)?
            .guess_file_type()?
            .read()
            .map_err(|e| match e.kind() {
                UnknownFormat => MetadataError::UnsupportedFormat,
                _ => MetadataError::ReadError(e),
            })?;

        let primary_tag = tagged_file.primary_tag();
        let properties = tagged_file.properties();

        let standard = StandardMetadata {
            title: primary_tag.and_then(|tag| tag.title().map(|s| s.to_string())),
            artist: primary_tag.and_then(|tag| tag.artist().map(|s| s.to_string())),
            album: primary_tag.and_then(|tag| tag.album().map(|s| s.to_string())),
        };

        let file_type = tagged_file.file_type();
        let technical = TechnicalMetadata {
            format: format_name(file_type),
            sample_rate: properties.sample_rate().unwrap_or(0),
            bits_per_sample: properties.bit_depth().map(u32::from),
            channels: properties.channels().map_or(0, u32::from),
            duration_ms: u64::try_from(properties.duration().as_millis()).unwrap_or(u64::MAX),
            bitrate_kbps: properties.audio_bitrate(),
            file_size,
            is_lossless: is_lossless(file_type),
        };

        // Prefer the front cover, then any cover-like picture
        let artwork = primary_tag.and_then(|tag| {
            tag.get_picture_type(CoverFront)
                .or_else(|| {
                    tag.pictures()
                        .iter()
                        .find(|pic| matches!(pic.pic_type(), CoverFront | CoverBack | Leaflet))
                })
                .or_else(|| tag.pictures().first())
                .map(|pic| pic.data().to_vec())
        });

        debug!(
            path = %path.display(),
            format = %technical.format,
            has_artwork = artwork.is_some(),
            "Read track metadata"
        );

        Ok(TrackMetadata {
            standard,
            technical,
            artwork,
        })
    }
}

/// Short display name for a container format.
fn format_name(file_type: FileType) -> String {
    match file_type {
        FileType::Aac => "AAC".to_string(),
        FileType::Aiff => "AIFF".to_string(),
        FileType::Ape => "APE".to_string(),
        FileType::Flac => "FLAC".to_string(),
        FileType::Mpeg => "MP3".to_string(),
        FileType::Mp4 => "M4A".to_string(),
        FileType::Opus => "Opus".to_string(),
        FileType::Vorbis => "Vorbis".to_string(),
        FileType::Wav => "WAV".to_string(),
        FileType::WavPack => "WavPack".to_string(),
        other => format!("{other:?}").to_uppercase(),
    }
}

fn is_lossless(file_type: FileType) -> bool {
    matches!(
        file_type,
        FileType::Flac | FileType::Wav | FileType::Aiff | FileType::Ape | FileType::WavPack
    )
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use {
        lofty::file::FileType,
        serde_json::{from_str, to_string},
        tempfile::NamedTempFile,
    };

    use crate::audio::metadata::{
        MetadataError, StandardMetadata, TagReader, TechnicalMetadata, TrackMetadata,
        format_name, is_lossless,
    };

    #[test]
    fn test_metadata_error_display() {
        let error = MetadataError::UnsupportedFormat;
        assert_eq!(error.to_string(), "Unsupported file format");
    }

    #[test]
    fn test_format_names() {
        assert_eq!(format_name(FileType::Flac), "FLAC");
        assert_eq!(format_name(FileType::Mpeg), "MP3");
        assert_eq!(format_name(FileType::Wav), "WAV");
        assert!(is_lossless(FileType::Flac));
        assert!(!is_lossless(FileType::Mpeg));
    }

    #[test]
    fn test_track_metadata_serialization() {
        let metadata = TrackMetadata {
            standard: StandardMetadata {
                title: Some("Test Title".to_string()),
                artist: Some("Test Artist".to_string()),
                album: None,
            },
            technical: TechnicalMetadata {
                format: "FLAC".to_string(),
                sample_rate: 96000,
                bits_per_sample: Some(24),
                channels: 2,
                duration_ms: 300_000,
                bitrate_kbps: None,
                file_size: 1024,
                is_lossless: true,
            },
            artwork: None,
        };

        let serialized = to_string(&metadata).unwrap();
        let deserialized: TrackMetadata = from_str(&serialized).unwrap();
        assert_eq!(metadata, deserialized);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = TagReader::read_metadata("/definitely/not/here.mp3");
        assert!(matches!(result, Err(MetadataError::IoError(_))));
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let mut file = NamedTempFile::with_suffix(".bin").unwrap();
        file.write_all(&[0x13, 0x37, 0x00, 0x42, 0x99, 0x01, 0x02, 0x03])
            .unwrap();

        assert!(TagReader::read_metadata(file.path()).is_err());
    }
}
