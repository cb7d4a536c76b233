// SPDX-License-Identifier: MPL-2.0

//! Animated asset support.
//!
//! Every asset, still or animated, becomes an [`AnimationTrack`]: a list of
//! frames with per-frame durations and a cursor driven by wall-clock time.
//!
//! # Module Structure
//!
//! - [`types`]: Decoded asset container and timing constants
//! - [`detection`]: Locating asset files and classifying them by extension
//! - [`loader`]: Decoding files into frames
//! - [`track`]: Time-driven playback
//!
//! # Supported Formats
//!
//! | Format | Extension | Frames |
//! |--------|-----------|--------|
//! | GIF    | `.gif`    | all, with container delays |
//! | WebP   | `.webp`   | all, with container delays |
//! | PNG    | `.png`    | one |
//! | JPEG   | `.jpg`, `.jpeg` | one |
//! | JPEG XL | `.jxl`   | first |

mod detection;
mod loader;
mod track;
mod types;

pub use detection::{asset_exists, find_asset_file};
pub use loader::{load_avatar, load_background};
pub use track::AnimationTrack;
pub use types::LoadedAsset;
