// SPDX-License-Identifier: MPL-2.0

use std::sync::{Arc, Mutex, PoisonError};

use eyre::eyre;
use image::RgbImage;

use super::{CameraSink, SinkFormat, check_frame};

#[derive(Debug, Default)]
struct Recorded {
    format: Option<SinkFormat>,
    frames: u64,
    last: Option<RgbImage>,
    opens: u32,
}

/// In-process sink that keeps the last frame.
///
/// Clones share the same recording, so a clone kept aside can observe what
/// the engine sent.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    recorded: Arc<Mutex<Recorded>>,
    fail_open: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    /// A sink whose `open` always fails, standing in for a missing device.
    pub fn unavailable() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    #[must_use]
    pub fn frames_sent(&self) -> u64 {
        self.recorded().frames
    }

    #[cfg(test)]
    #[must_use]
    pub fn last_frame(&self) -> Option<RgbImage> {
        self.recorded().last.clone()
    }

    #[cfg(test)]
    #[must_use]
    pub fn format(&self) -> Option<SinkFormat> {
        self.recorded().format
    }

    /// Number of successful opens.
    #[cfg(test)]
    #[must_use]
    pub fn opens(&self) -> u32 {
        self.recorded().opens
    }
}

impl CameraSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&mut self, format: SinkFormat) -> eyre::Result<()> {
        if self.fail_open {
            return Err(eyre!("memory sink configured as unavailable"));
        }
        let mut recorded = self.recorded();
        recorded.format = Some(format);
        recorded.opens += 1;
        Ok(())
    }

    fn send_frame(&mut self, frame: &RgbImage) -> eyre::Result<()> {
        let mut recorded = self.recorded();
        let format = recorded.format.ok_or_else(|| eyre!("sink is not open"))?;
        check_frame(&format, frame)?;
        recorded.frames += 1;
        recorded.last = Some(frame.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.recorded().format = None;
    }

    fn is_open(&self) -> bool {
        self.recorded().format.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: SinkFormat = SinkFormat {
        width: 4,
        height: 2,
        fps: 30,
    };

    #[test]
    fn records_frames_across_clones() {
        let recorder = MemorySink::new();
        let mut sink = recorder.clone();

        sink.open(FORMAT).unwrap();
        sink.send_frame(&RgbImage::new(4, 2)).unwrap();
        sink.send_frame(&RgbImage::new(4, 2)).unwrap();

        assert_eq!(recorder.frames_sent(), 2);
        assert_eq!(recorder.format(), Some(FORMAT));
        assert!(recorder.last_frame().is_some());
    }

    #[test]
    fn rejects_wrong_size_and_closed() {
        let mut sink = MemorySink::new();
        assert!(sink.send_frame(&RgbImage::new(4, 2)).is_err());

        sink.open(FORMAT).unwrap();
        assert!(sink.send_frame(&RgbImage::new(3, 2)).is_err());

        sink.close();
        sink.close();
        assert!(!sink.is_open());
    }

    #[test]
    fn unavailable_fails_to_open() {
        let mut sink = MemorySink::unavailable();
        assert!(sink.open(FORMAT).is_err());
        assert!(!sink.is_open());
    }
}
