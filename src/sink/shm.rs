// SPDX-License-Identifier: MPL-2.0

//! Shared-memory frame buffer read by an external virtual camera driver.
//!
//! Layout, all integers little-endian `u32`:
//!
//! | offset | field        |
//! |--------|--------------|
//! | 0      | width        |
//! | 4      | height       |
//! | 8      | fps          |
//! | 12     | format (0 = RGB24) |
//! | 16     | frame size   |
//! | 20     | frame ready  |
//! | 24     | pixels, up to 1920x1080 RGB24 |

use std::{
    fs::{File, OpenOptions},
    os::unix::fs::FileExt,
    path::PathBuf,
};

use eyre::{WrapErr, eyre};
use image::RgbImage;

use super::{CameraSink, SinkFormat, check_frame};

/// Default location of the buffer.
pub const DEFAULT_PATH: &str = "/dev/shm/voicecam-frame";

pub const HEADER_SIZE: u64 = 6 * 4;
pub const MAX_FRAME_SIZE: usize = 1920 * 1080 * 3;
const FORMAT_RGB24: u32 = 0;
const FRAME_SIZE_OFFSET: u64 = 16;
const FRAME_READY_OFFSET: u64 = 20;

#[derive(Debug)]
pub struct SharedMemorySink {
    path: PathBuf,
    name: String,
    open: Option<(File, SinkFormat)>,
}

impl SharedMemorySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("shm:{}", path.display()),
            path,
            open: None,
        }
    }
}

impl Default for SharedMemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_PATH)
    }
}

fn header(format: &SinkFormat, frame_size: u32, ready: bool) -> [u8; HEADER_SIZE as usize] {
    let fields = [
        format.width,
        format.height,
        format.fps,
        FORMAT_RGB24,
        frame_size,
        u32::from(ready),
    ];
    let mut bytes = [0u8; HEADER_SIZE as usize];
    for (chunk, field) in bytes.chunks_exact_mut(4).zip(fields) {
        chunk.copy_from_slice(&field.to_le_bytes());
    }
    bytes
}

impl CameraSink for SharedMemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, format: SinkFormat) -> eyre::Result<()> {
        self.close();

        if format.frame_size() > MAX_FRAME_SIZE {
            return Err(eyre!(
                "{}x{} does not fit the {MAX_FRAME_SIZE} byte frame area",
                format.width,
                format.height
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .wrap_err_with(|| format!("failed to open {}", self.path.display()))?;

        file.set_len(HEADER_SIZE + MAX_FRAME_SIZE as u64)
            .wrap_err("failed to size shared frame buffer")?;
        file.write_all_at(&header(&format, 0, false), 0)
            .wrap_err("failed to write shared frame header")?;

        tracing::info!(
            path = %self.path.display(),
            width = format.width,
            height = format.height,
            fps = format.fps,
            "shared memory camera opened"
        );
        self.open = Some((file, format));
        Ok(())
    }

    fn send_frame(&mut self, frame: &RgbImage) -> eyre::Result<()> {
        let (file, format) = self.open.as_ref().ok_or_else(|| eyre!("sink is not open"))?;
        check_frame(format, frame)?;

        let pixels = frame.as_raw();
        file.write_all_at(pixels, HEADER_SIZE)?;
        file.write_all_at(&(pixels.len() as u32).to_le_bytes(), FRAME_SIZE_OFFSET)?;
        file.write_all_at(&1u32.to_le_bytes(), FRAME_READY_OFFSET)?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some((file, _)) = self.open.take() {
            if let Err(why) = file.write_all_at(&0u32.to_le_bytes(), FRAME_READY_OFFSET) {
                tracing::warn!(?why, path = %self.path.display(), "failed to clear frame ready flag");
            }
            tracing::info!(path = %self.path.display(), "shared memory camera closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

impl Drop for SharedMemorySink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::Rgb;

    use super::*;

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn writes_header_and_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame");
        let mut sink = SharedMemorySink::new(&path);
        let format = SinkFormat {
            width: 3,
            height: 2,
            fps: 30,
        };

        sink.open(format).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE as usize + MAX_FRAME_SIZE);
        assert_eq!(read_u32(&bytes, 0), 3);
        assert_eq!(read_u32(&bytes, 8), 30);
        assert_eq!(read_u32(&bytes, 20), 0);

        sink.send_frame(&RgbImage::from_pixel(3, 2, Rgb([1, 2, 3])))
            .unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(read_u32(&bytes, 16), 18);
        assert_eq!(read_u32(&bytes, 20), 1);
        assert_eq!(&bytes[24..30], &[1, 2, 3, 1, 2, 3]);

        sink.close();
        sink.close();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(read_u32(&bytes, 20), 0);
    }

    #[test]
    fn rejects_oversized_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SharedMemorySink::new(dir.path().join("frame"));
        let format = SinkFormat {
            width: 3840,
            height: 2160,
            fps: 60,
        };
        assert!(sink.open(format).is_err());
        assert!(!sink.is_open());
    }
}
