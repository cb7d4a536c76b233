// SPDX-License-Identifier: MPL-2.0

//! Generated stand-ins for missing assets, so a fresh install shows something.

use std::{
    fs,
    path::{Path, PathBuf},
};

use colorgrad::{BlendMode, Color, Gradient, GradientBuilder, LinearGradient};
use eyre::WrapErr;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    animated::{asset_exists, find_asset_file},
    effects::dim,
    status::{AvatarAsset, BACKGROUND_ASSET},
};

const BACKGROUND_SIZE: (u32, u32) = (640, 480);
const AVATAR_SIZE: u32 = 200;
const AVATAR_RADIUS: u32 = 90;
const INACTIVE_DIM: u8 = 50;

const BACKGROUND_STOPS: [[u8; 3]; 2] = [[38, 42, 66], [112, 86, 160]];

/// Top-to-bottom gradient through `stops`.
pub fn gradient(
    stops: &[[u8; 3]],
    width: u32,
    height: u32,
) -> Result<RgbImage, colorgrad::GradientBuilderError> {
    let colors: Vec<Color> = stops
        .iter()
        .map(|&[r, g, b]| Color::from_rgba8(r, g, b, 255))
        .collect();

    let grad = GradientBuilder::new()
        .colors(&colors)
        .mode(BlendMode::LinearRgb)
        .build::<LinearGradient>()?;

    let (dmin, dmax) = grad.domain();
    let span = height.saturating_sub(1).max(1) as f32;

    let mut imgbuf = RgbImage::new(width, height);
    imgbuf.par_enumerate_pixels_mut().for_each(|(_, y, pixel)| {
        let t = dmin + (dmax - dmin) * (y as f32 / span);
        let [r, g, b, _] = grad.at(t).to_rgba8();
        *pixel = Rgb([r, g, b]);
    });

    Ok(imgbuf)
}

/// Opaque disc of `color` centred on a transparent square.
#[must_use]
pub fn disc(size: u32, radius: u32, color: [u8; 3]) -> RgbaImage {
    let centre = (size / 2) as i64;
    let radius_sq = i64::from(radius) * i64::from(radius);
    let [r, g, b] = color;

    let mut imgbuf = RgbaImage::new(size, size);
    imgbuf.par_enumerate_pixels_mut().for_each(|(x, y, pixel)| {
        let dx = i64::from(x) - centre;
        let dy = i64::from(y) - centre;
        if dx * dx + dy * dy <= radius_sq {
            *pixel = Rgba([r, g, b, 255]);
        }
    });
    imgbuf
}

fn avatar_colour(asset: AvatarAsset) -> [u8; 3] {
    match asset {
        AvatarAsset::Speaking => [0, 255, 0],
        AvatarAsset::Inactive => [100, 100, 100],
        AvatarAsset::Muted => [220, 40, 40],
        AvatarAsset::Deafened => [40, 80, 220],
    }
}

fn inactive_from_speaking(dir: &Path) -> Option<RgbaImage> {
    let path = find_asset_file(dir, AvatarAsset::Speaking.file_stem())?;
    match image::open(&path) {
        Ok(img) => {
            let mut img = DynamicImage::into_rgba8(img);
            dim(&mut img, INACTIVE_DIM);
            Some(img)
        }
        Err(why) => {
            warn!(?why, path = %path.display(), "cannot derive inactive avatar");
            None
        }
    }
}

/// Write a PNG for every asset that has no file in `dir`.
///
/// Existing files, in any supported format, are left alone. Returns the
/// paths written.
///
/// # Errors
///
/// Fails if the directory cannot be created or a file cannot be written.
pub fn ensure_placeholder_assets(dir: &Path) -> eyre::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).wrap_err_with(|| format!("failed to create {}", dir.display()))?;
    let mut written = Vec::new();

    if !asset_exists(dir, BACKGROUND_ASSET) {
        let path = dir.join(format!("{BACKGROUND_ASSET}.png"));
        let bg = gradient(&BACKGROUND_STOPS, BACKGROUND_SIZE.0, BACKGROUND_SIZE.1)
            .unwrap_or_else(|why| {
                warn!(?why, "gradient failed, using a flat background");
                RgbImage::from_pixel(BACKGROUND_SIZE.0, BACKGROUND_SIZE.1, Rgb([150; 3]))
            });
        bg.save(&path)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }

    for asset in AvatarAsset::ALL {
        if asset_exists(dir, asset.file_stem()) {
            continue;
        }

        let path = dir.join(format!("{}.png", asset.file_stem()));
        let img = match asset {
            AvatarAsset::Inactive => inactive_from_speaking(dir),
            _ => None,
        }
        .unwrap_or_else(|| disc(AVATAR_SIZE, AVATAR_RADIUS, avatar_colour(asset)));

        img.save(&path)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }

    for path in &written {
        info!(path = %path.display(), "placeholder asset created");
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_all_placeholders_once() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("reactive_avatar");

        let written = ensure_placeholder_assets(&assets).unwrap();
        assert_eq!(written.len(), 5);

        let bg = image::open(assets.join("BG.png")).unwrap();
        assert_eq!((bg.width(), bg.height()), BACKGROUND_SIZE);

        let inactive = image::open(assets.join("Inactive.png")).unwrap().into_rgba8();
        assert_eq!(inactive.get_pixel(100, 100).0, [0, 127, 0, 255]);
        assert_eq!(inactive.get_pixel(0, 0).0[3], 0);

        assert!(ensure_placeholder_assets(&assets).unwrap().is_empty());
    }

    #[test]
    fn keeps_existing_assets() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(4, 4).save(dir.path().join("BG.jpg")).unwrap();
        RgbaImage::new(4, 4).save(dir.path().join("Muted.png")).unwrap();

        let written = ensure_placeholder_assets(dir.path()).unwrap();
        assert_eq!(written.len(), 3);
        assert!(!dir.path().join("BG.png").exists());
        assert_eq!(image::open(dir.path().join("Muted.png")).unwrap().width(), 4);
    }

    #[test]
    fn gradient_runs_top_to_bottom() {
        let img = gradient(&BACKGROUND_STOPS, 3, 10).unwrap();
        let close = |a: [u8; 3], b: [u8; 3]| a.iter().zip(b).all(|(x, y)| x.abs_diff(y) <= 1);
        assert!(close(img.get_pixel(1, 0).0, BACKGROUND_STOPS[0]));
        assert!(close(img.get_pixel(1, 9).0, BACKGROUND_STOPS[1]));
        assert!(!close(img.get_pixel(1, 5).0, BACKGROUND_STOPS[0]));
    }

    #[test]
    fn disc_is_round() {
        let img = disc(20, 5, [1, 2, 3]);
        assert_eq!(img.get_pixel(10, 10).0, [1, 2, 3, 255]);
        assert_eq!(img.get_pixel(10, 15).0, [1, 2, 3, 255]);
        assert_eq!(img.get_pixel(14, 14).0[3], 0);
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
    }
}
