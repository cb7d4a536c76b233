// SPDX-License-Identifier: MPL-2.0

//! Locating asset files on disk.
//!
//! Each logical asset (`BG`, `Speaking`, ...) may exist in several formats.
//! Animated containers win over still images so that a user can drop a GIF
//! next to the generated placeholder PNG and have it picked up.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Containers that may hold more than one frame, in lookup order.
#[cfg(feature = "animated")]
const ANIMATED_EXTENSIONS: &[&str] = &["gif", "webp"];
#[cfg(not(feature = "animated"))]
const ANIMATED_EXTENSIONS: &[&str] = &[];

/// Still image formats, in lookup order.
const STATIC_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "jxl"];

/// Find the file backing a logical asset name inside `dir`.
///
/// Animated formats are preferred; within each group the first listed
/// extension wins. Both lower- and upper-case extensions are accepted.
#[must_use]
pub fn find_asset_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    ANIMATED_EXTENSIONS
        .iter()
        .chain(STATIC_EXTENSIONS)
        .flat_map(|ext| [ext.to_string(), ext.to_uppercase()])
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|path| path.is_file())
        .inspect(|path| debug!(path = %path.display(), stem, "asset file found"))
}

/// Whether any file for `stem` exists in `dir`.
#[must_use]
pub fn asset_exists(dir: &Path, stem: &str) -> bool {
    find_asset_file(dir, stem).is_some()
}

/// Check if a path points to a potentially animated file.
#[must_use]
pub fn is_animated_file(path: &Path) -> bool {
    extension_in(path, ANIMATED_EXTENSIONS)
}

/// Check if a path points to a GIF file.
#[must_use]
pub fn is_gif_file(path: &Path) -> bool {
    extension_in(path, &["gif"])
}

/// Check if a path points to a JPEG XL file.
#[must_use]
pub fn is_jxl_file(path: &Path) -> bool {
    extension_in(path, &["jxl"])
}

fn extension_in(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}
