// SPDX-License-Identifier: MPL-2.0

//! Virtual camera outputs.
//!
//! A sink is opened once per engine initialization with the canvas format and
//! receives one RGB24 frame per pump iteration.

mod memory;
#[cfg(unix)]
mod shm;

use image::RgbImage;

pub use memory::MemorySink;
#[cfg(unix)]
pub use shm::SharedMemorySink;

/// Frame geometry and rate a sink is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl SinkFormat {
    /// Bytes in one RGB24 frame.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// A destination for composited frames.
pub trait CameraSink: Send {
    /// Human readable name for logs.
    fn name(&self) -> &str;

    /// Acquire the device for `format`.
    ///
    /// # Errors
    ///
    /// Fails if the device is unavailable or cannot carry `format`.
    fn open(&mut self, format: SinkFormat) -> eyre::Result<()>;

    /// Deliver one frame.
    ///
    /// # Errors
    ///
    /// Fails if the sink is closed or the frame does not match the opened format.
    fn send_frame(&mut self, frame: &RgbImage) -> eyre::Result<()>;

    /// Release the device. Calling this on a closed sink does nothing.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Check a frame against the format a sink was opened with.
pub(crate) fn check_frame(format: &SinkFormat, frame: &RgbImage) -> eyre::Result<()> {
    if frame.dimensions() != (format.width, format.height) {
        return Err(eyre::eyre!(
            "frame is {}x{}, sink expects {}x{}",
            frame.width(),
            frame.height(),
            format.width,
            format.height
        ));
    }
    Ok(())
}
