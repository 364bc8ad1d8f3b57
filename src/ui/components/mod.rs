//! Reusable UI components following GNOME HIG guidelines.

pub mod cover_art;

pub use cover_art::CoverArt;
