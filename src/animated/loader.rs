// SPDX-License-Identifier: MPL-2.0

//! Decoding asset files into frame sequences.
//!
//! Animated containers are fully decoded up front and kept in memory; the
//! assets are small avatar loops and a background, so there is no streaming.
//! Any failure is logged and yields an empty asset; the engine substitutes a
//! fallback for empty assets rather than refusing to start.

use std::{path::Path, time::Duration};

use eyre::{OptionExt, eyre};
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageReader, RgbImage, RgbaImage};
use jxl_oxide::{EnumColourEncoding, JxlImage, PixelFormat};
use tracing::{debug, info, warn};

#[cfg(feature = "animated")]
use super::detection::is_animated_file;
use super::{
    detection::{find_asset_file, is_jxl_file},
    types::{FALLBACK_SOURCE_FPS, LoadedAsset, frame_duration_at},
};
use crate::status::{AvatarAsset, BACKGROUND_ASSET};

/// Load the background as opaque RGB frames.
#[must_use]
pub fn load_background(dir: &Path) -> LoadedAsset<RgbImage> {
    load(dir, BACKGROUND_ASSET, DynamicImage::into_rgb8)
}

/// Load one avatar set as RGBA frames.
#[must_use]
pub fn load_avatar(dir: &Path, asset: AvatarAsset) -> LoadedAsset<RgbaImage> {
    load(dir, asset.file_stem(), DynamicImage::into_rgba8)
}

fn load<I>(dir: &Path, stem: &str, convert: fn(DynamicImage) -> I) -> LoadedAsset<I> {
    let Some(path) = find_asset_file(dir, stem) else {
        warn!(dir = %dir.display(), stem, "asset not found");
        return LoadedAsset::empty();
    };

    match decode_file(&path, convert) {
        Ok(asset) => {
            info!(
                path = %path.display(),
                frames = asset.frames.len(),
                source_fps = asset.source_fps,
                "asset loaded"
            );
            asset
        }
        Err(why) => {
            warn!(?why, path = %path.display(), "failed to decode asset");
            LoadedAsset::empty()
        }
    }
}

/// Decode a single file, picking the decoder from its extension.
///
/// # Errors
///
/// Fails if the file cannot be opened or is not a decodable image.
pub fn decode_file<I>(path: &Path, convert: fn(DynamicImage) -> I) -> eyre::Result<LoadedAsset<I>> {
    #[cfg(feature = "animated")]
    if is_animated_file(path) {
        return decode_animated(path, convert);
    }

    decode_still(path, convert)
}

fn decode_still<I>(path: &Path, convert: fn(DynamicImage) -> I) -> eyre::Result<LoadedAsset<I>> {
    let image = if is_jxl_file(path) {
        decode_jpegxl(path)?
    } else {
        ImageReader::open(path)?.with_guessed_format()?.decode()?
    };

    Ok(LoadedAsset::still(convert(image), Some(path.to_path_buf())))
}

#[cfg(feature = "animated")]
fn decode_animated<I>(path: &Path, convert: fn(DynamicImage) -> I) -> eyre::Result<LoadedAsset<I>> {
    use std::{fs::File, io::BufReader};

    use image::{
        AnimationDecoder,
        codecs::{gif::GifDecoder, webp::WebPDecoder},
    };

    use super::detection::is_gif_file;

    let reader = BufReader::new(File::open(path)?);

    let frames = if is_gif_file(path) {
        GifDecoder::new(reader)?.into_frames().collect_frames()?
    } else {
        let decoder = WebPDecoder::new(reader)?;
        if !decoder.has_animation() {
            debug!(path = %path.display(), "webp has a single image");
            return decode_still(path, convert);
        }
        decoder.into_frames().collect_frames()?
    };

    if frames.is_empty() {
        return Err(eyre!("animation has no frames"));
    }

    let delays: Vec<Duration> = frames
        .iter()
        .map(|frame| Duration::from(frame.delay()))
        .collect();

    let (source_fps, durations) = timing_from_delays(&delays);
    if delays.first().is_none_or(Duration::is_zero) {
        warn!(path = %path.display(), "animation has no timing, assuming {FALLBACK_SOURCE_FPS} fps");
    }

    let frames = frames
        .into_iter()
        .map(|frame| convert(DynamicImage::ImageRgba8(frame.into_buffer())))
        .collect();

    Ok(LoadedAsset {
        frames,
        durations,
        source_fps,
        path: Some(path.to_path_buf()),
    })
}

/// Derive the nominal rate and per-frame durations from container delays.
///
/// The nominal rate follows the first frame's delay. Frames without a delay
/// of their own play for one period of the nominal rate.
pub(crate) fn timing_from_delays(delays: &[Duration]) -> (f64, Vec<Duration>) {
    let source_fps = delays
        .first()
        .filter(|d| !d.is_zero())
        .map_or(FALLBACK_SOURCE_FPS, |d| 1.0 / d.as_secs_f64());

    let fallback = frame_duration_at(source_fps);
    let durations = delays
        .iter()
        .map(|d| if d.is_zero() { fallback } else { *d })
        .collect();

    (source_fps, durations)
}

/// Decodes JPEG XL image files into `image::DynamicImage` via `jxl-oxide`.
fn decode_jpegxl(path: &Path) -> eyre::Result<DynamicImage> {
    let mut image = JxlImage::builder()
        .open(path)
        .map_err(|why| eyre!("failed to read image header: {why}"))?;

    image.request_color_encoding(EnumColourEncoding::srgb(
        jxl_oxide::RenderingIntent::Relative,
    ));

    let render = image
        .render_frame(0)
        .map_err(|why| eyre!("failed to render image frame: {why}"))?;

    let framebuffer = render.image_all_channels();
    let (width, height) = (framebuffer.width() as u32, framebuffer.height() as u32);
    let bytes = framebuffer
        .buf()
        .iter()
        .map(|x| (x * 255. + 0.5) as u8)
        .collect::<Vec<_>>();

    match image.pixel_format() {
        PixelFormat::Graya => GrayAlphaImage::from_raw(width, height, bytes)
            .map(DynamicImage::ImageLumaA8)
            .ok_or_eyre("Can't decode gray alpha buffer"),
        PixelFormat::Gray => GrayImage::from_raw(width, height, bytes)
            .map(DynamicImage::ImageLuma8)
            .ok_or_eyre("Can't decode gray buffer"),
        PixelFormat::Rgba => RgbaImage::from_raw(width, height, bytes)
            .map(DynamicImage::ImageRgba8)
            .ok_or_eyre("Can't decode rgba buffer"),
        PixelFormat::Rgb => RgbImage::from_raw(width, height, bytes)
            .map(DynamicImage::ImageRgb8)
            .ok_or_eyre("Can't decode rgb buffer"),
        PixelFormat::Cmyk => Err(eyre!("unsupported pixel format: CMYK")),
        PixelFormat::Cmyka => Err(eyre!("unsupported pixel format: CMYKA")),
    }
}

