//! Utility functions for UI components.
//!
//! Formatting for the format line and the time labels, and the conversions
//! between seek bar values and playback offsets.

use std::path::Path;

use num_traits::ToPrimitive;

use crate::audio::metadata::TechnicalMetadata;

/// Formats a sample rate in Hz to a clean kHz string representation.
///
/// This function uses consistent integer arithmetic to handle all sample rates uniformly:
/// - 48000 Hz → "48"
/// - 44100 Hz → "44.1"
/// - 22050 Hz → "22.05"
/// - 44123 Hz → "44.123"
///
/// # Arguments
///
/// * `sample_rate_hz` - The sample rate in Hertz
///
/// # Returns
///
/// A formatted string representing the sample rate in kHz (without "kHz" unit)
#[must_use]
pub fn format_sample_rate(sample_rate_hz: u32) -> String {
    let whole_khz = sample_rate_hz / 1000;
    let remainder = sample_rate_hz % 1000;

    if remainder == 0 {
        return whole_khz.to_string();
    }

    // Pad so 50 Hz becomes ".050" before trimming
    let fraction = format!("{remainder:03}");
    format!("{whole_khz}.{}", fraction.trim_end_matches('0'))
}

/// Formats a playback offset as `m:ss`, or `h:mm:ss` from one hour up.
#[must_use]
pub fn format_timestamp(position_ms: u64) -> String {
    let total_seconds = position_ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Creates the format line shown under the title.
///
/// Rules:
/// - format, bit depth and sample rate known: "FLAC 24/44.1"
/// - format and sample rate known: "MP3 44.1 kHz"
/// - otherwise the format name inferred from the file extension
/// - `None` when nothing sensible can be shown
///
/// # Arguments
///
/// * `technical` - Technical properties, when the file could be analysed
/// * `path` - Path of the selected file
#[must_use]
pub fn create_format_display(technical: Option<&TechnicalMetadata>, path: &Path) -> Option<String> {
    if let Some(technical) = technical {
        let rate = technical.sample_rate;
        return Some(match technical.bits_per_sample {
            Some(bits) if rate > 0 => {
                format!("{} {}/{}", technical.format, bits, format_sample_rate(rate))
            }
            None if rate > 0 => format!("{} {} kHz", technical.format, format_sample_rate(rate)),
            _ => technical.format.clone(),
        });
    }

    let extension = path.extension()?.to_str()?.to_lowercase();
    let name = match extension.as_str() {
        "flac" => "FLAC",
        "wav" => "WAV",
        "aiff" | "aif" => "AIFF",
        "mp3" => "MP3",
        "aac" => "AAC",
        "m4a" | "mp4" => "M4A",
        "ogg" | "oga" => "Ogg",
        "opus" => "Opus",
        "wv" => "WavPack",
        "ape" => "Monkey's Audio",
        _ => return None,
    };
    Some(name.to_string())
}

/// Converts a seek bar value to a playback offset.
#[must_use]
pub fn scale_value_to_ms(value: f64) -> u64 {
    value.round().to_u64().unwrap_or(0)
}

/// Converts a playback offset to a seek bar value.
#[must_use]
pub fn ms_to_scale_value(position_ms: u64) -> f64 {
    position_ms.to_f64().unwrap_or(0.0)
}
