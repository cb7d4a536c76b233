// SPDX-License-Identifier: MPL-2.0

//! Core types for decoded assets.

use std::{path::PathBuf, time::Duration};

/// Source rate assumed for animations that carry no usable timing.
pub(crate) const FALLBACK_SOURCE_FPS: f64 = 15.0;

/// Nominal rate of a still image.
pub(crate) const STATIC_SOURCE_FPS: f64 = 1.0;

/// Frames and timing read from one asset file.
#[derive(Debug, Clone)]
pub struct LoadedAsset<I> {
    /// Decoded frames in display order.
    pub frames: Vec<I>,
    /// Display time of each frame, same length as `frames`.
    pub durations: Vec<Duration>,
    /// Nominal rate used where a frame has no timing of its own.
    pub source_fps: f64,
    /// File the frames came from, if any.
    pub path: Option<PathBuf>,
}

impl<I> LoadedAsset<I> {
    /// An asset with no frames; callers substitute a fallback.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            frames: Vec::new(),
            durations: Vec::new(),
            source_fps: STATIC_SOURCE_FPS,
            path: None,
        }
    }

    /// A single still frame.
    #[must_use]
    pub fn still(frame: I, path: Option<PathBuf>) -> Self {
        Self {
            frames: vec![frame],
            durations: vec![Duration::from_secs_f64(1.0 / STATIC_SOURCE_FPS)],
            source_fps: STATIC_SOURCE_FPS,
            path,
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Display time of one frame at `fps`, guarding against non-positive rates.
#[must_use]
pub(crate) fn frame_duration_at(fps: f64) -> Duration {
    let fps = if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        FALLBACK_SOURCE_FPS
    };
    Duration::from_secs_f64(1.0 / fps)
}
