//! GNOME HIG-compliant user interface built entirely with Libadwaita.
//!
//! A single window: header bar with an Open button above the player screen.

pub mod application;
pub mod components;
pub mod file_picker;
pub mod header_bar;
pub mod player_view;
pub mod position_ticker;
pub mod utils;

pub use {
    application::PickplayApplication,
    components::CoverArt,
    header_bar::HeaderBar,
    player_view::{PlayerView, SharedController, ViewContext},
};
