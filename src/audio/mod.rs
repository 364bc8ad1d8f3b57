//! Audio playback system.
//!
//! Decoding with symphonia, output with cpal through rtrb ring buffers,
//! optional rate conversion with rubato, and tag/artwork reading with lofty.

pub mod artwork;
pub mod backend;
pub mod decoder;
pub mod engine;
pub mod metadata;
pub mod output;
pub mod resampler;
