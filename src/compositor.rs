// SPDX-License-Identifier: MPL-2.0

//! Output frame composition: background stretch and avatar alpha blend.
//!
//! Everything here is a pure function of its inputs and may run on any thread.

use fast_image_resize::{FilterType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, RgbImage, RgbaImage, imageops};
use rayon::prelude::*;

/// Fallback canvas size when the background cannot provide one.
pub const DEFAULT_CANVAS: (u32, u32) = (640, 360);

/// Vertical space kept free under the avatar so a bounce stays on canvas.
pub const BOUNCE_RESERVE: u32 = 10;

/// Output canvas geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasLayout {
    pub width: u32,
    pub height: u32,
    /// Pixels the avatar is lifted above the bottom edge.
    pub reserve: u32,
}

impl CanvasLayout {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            reserve: 0,
        }
    }

    #[must_use]
    pub fn with_reserve(mut self, reserve: u32) -> Self {
        self.reserve = reserve;
        self
    }

    /// Top-left corner of an avatar of the given size: centred horizontally,
    /// anchored to the bottom edge, lifted by the reserve and `y_offset`.
    #[must_use]
    pub fn avatar_origin(&self, avatar_width: u32, avatar_height: u32, y_offset: i32) -> (i64, i64) {
        let x = (i64::from(self.width) - i64::from(avatar_width)).div_euclid(2);
        let y = i64::from(self.height)
            - i64::from(avatar_height)
            - i64::from(self.reserve)
            + i64::from(y_offset);
        (x, y)
    }
}

/// Visible part of a placed avatar, in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl ClipRect {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

/// Intersection of the avatar rectangle at `origin` with the canvas.
#[must_use]
pub fn clip(layout: &CanvasLayout, origin: (i64, i64), size: (u32, u32)) -> ClipRect {
    let clamp_x = |v: i64| v.clamp(0, i64::from(layout.width)) as u32;
    let clamp_y = |v: i64| v.clamp(0, i64::from(layout.height)) as u32;
    ClipRect {
        x0: clamp_x(origin.0),
        y0: clamp_y(origin.1),
        x1: clamp_x(origin.0 + i64::from(size.0)),
        y1: clamp_y(origin.1 + i64::from(size.1)),
    }
}

/// Stretch the background to exactly the canvas size.
///
/// A background already at canvas size is copied unchanged.
#[must_use]
pub fn resize_background(background: &RgbImage, layout: &CanvasLayout) -> RgbImage {
    stretch_rgb(background, layout.width, layout.height)
}

/// Non-aspect-preserving resize of an RGB frame to `width` x `height`.
#[must_use]
pub fn stretch_rgb(src: &RgbImage, width: u32, height: u32) -> RgbImage {
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    if src.width() == 0 || src.height() == 0 || width == 0 || height == 0 {
        return RgbImage::new(width, height);
    }
    resize_exact(DynamicImage::ImageRgb8(src.clone()), width, height).into_rgb8()
}

/// Non-aspect-preserving resize of an RGBA frame to `width` x `height`.
#[must_use]
pub fn stretch_rgba(src: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    if src.width() == 0 || src.height() == 0 || width == 0 || height == 0 {
        return RgbaImage::new(width, height);
    }
    resize_exact(DynamicImage::ImageRgba8(src.clone()), width, height).into_rgba8()
}

fn resize_exact(src: DynamicImage, width: u32, height: u32) -> DynamicImage {
    let mut dst = DynamicImage::new(width, height, src.color());
    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    match Resizer::new().resize(&src, &mut dst, &options) {
        Ok(()) => dst,
        Err(why) => {
            tracing::debug!(?why, "fast resize unavailable, using imageops");
            src.resize_exact(width, height, imageops::FilterType::Triangle)
        }
    }
}

/// Compose one output frame.
///
/// The background is stretched to the canvas. The avatar, if present and
/// non-empty, is placed at native size and alpha blended over it; pixels
/// falling outside the canvas are dropped.
#[must_use]
pub fn compose(
    layout: &CanvasLayout,
    background: &RgbImage,
    avatar: Option<&RgbaImage>,
    y_offset: i32,
) -> RgbImage {
    let mut out = resize_background(background, layout);

    let Some(avatar) = avatar.filter(|a| a.width() > 0 && a.height() > 0) else {
        return out;
    };

    let origin = layout.avatar_origin(avatar.width(), avatar.height(), y_offset);
    let rect = clip(layout, origin, avatar.dimensions());
    if rect.is_empty() {
        return out;
    }

    let stride = layout.width as usize * 3;
    let rows = (rect.y1 - rect.y0) as usize;

    out.par_chunks_mut(stride)
        .enumerate()
        .skip(rect.y0 as usize)
        .take(rows)
        .for_each(|(y, row)| {
            let ay = (y as i64 - origin.1) as u32;
            for x in rect.x0..rect.x1 {
                let ax = (i64::from(x) - origin.0) as u32;
                let [r, g, b, a] = avatar.get_pixel(ax, ay).0;
                let px = &mut row[x as usize * 3..x as usize * 3 + 3];
                let alpha = f32::from(a) / 255.0;
                for (dst, src) in px.iter_mut().zip([r, g, b]) {
                    *dst = blend_channel(f32::from(src), f32::from(*dst), alpha);
                }
            }
        });

    out
}

fn blend_channel(over: f32, under: f32, alpha: f32) -> u8 {
    (over * alpha + under * (1.0 - alpha)).clamp(0.0, 255.0) as u8
}
