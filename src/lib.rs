//! Material variant configuration for avatar hierarchies.
//!
//! Donor outfits are matched renderer by renderer against a worn object,
//! turned into material switch lists and installed as menu toggles, each
//! with an optional thumbnail rendered in an isolated preview session.

pub mod assets;
pub mod configurator;
pub mod correspondence;
pub mod materials;
pub mod menu;
pub mod render;
pub mod scene;
pub mod settings;
