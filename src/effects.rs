// SPDX-License-Identifier: MPL-2.0

//! Avatar selection and the transition effects layered on top of it.
//!
//! [`EffectController`] owns one [`AnimationTrack`] per avatar asset and
//! decides, for a given instant, which RGBA image the compositor receives:
//! the active track's frame, a cross-fade between the outgoing and incoming
//! tracks, dimmed while not speaking. The bounce offset is computed alongside.

use std::{
    f64::consts::PI,
    time::{Duration, Instant},
};

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use tracing::{debug, warn};
use voicecam_config::EngineConfig;

use crate::{
    animated::{AnimationTrack, LoadedAsset},
    compositor::{BOUNCE_RESERVE, stretch_rgba},
    status::{AvatarAsset, VoiceStatus},
};

/// Peak upward displacement of a bounce, in pixels.
pub const BOUNCE_MAX_OFFSET: u32 = BOUNCE_RESERVE;

/// Length of one bounce.
pub const BOUNCE_DURATION: Duration = Duration::from_millis(150);

/// Vertical offset of a bounce `elapsed` into it; negative is upward.
///
/// Zero at both ends, `-max_offset` at the midpoint, zero once finished.
#[must_use]
pub fn bounce_offset(elapsed: Duration, duration: Duration, max_offset: u32) -> i32 {
    if duration.is_zero() || elapsed >= duration {
        return 0;
    }

    let t = elapsed.as_secs_f64() / duration.as_secs_f64();
    (-f64::from(max_offset) * (PI * t).sin()).round() as i32
}

/// Blend two RGBA frames, all four channels, `progress` of the way from
/// `old` to `new`.
///
/// The result has the size of `new`; `old` is stretched to match if needed.
#[must_use]
pub fn crossfade_blend(old: &RgbaImage, new: &RgbaImage, progress: f32) -> RgbaImage {
    let progress = progress.clamp(0.0, 1.0);

    let resized;
    let old = if old.dimensions() == new.dimensions() {
        old
    } else {
        resized = stretch_rgba(old, new.width(), new.height());
        &resized
    };

    let mut out = new.clone();
    out.par_enumerate_pixels_mut().for_each(|(x, y, px)| {
        let from = old.get_pixel(x, y).0;
        let to = px.0;
        *px = Rgba(std::array::from_fn(|c| {
            let v = f32::from(from[c]) * (1.0 - progress) + f32::from(to[c]) * progress;
            v.clamp(0.0, 255.0).round() as u8
        }));
    });
    out
}

/// Darken RGB by `percentage`, leaving alpha untouched.
pub fn dim(frame: &mut RgbaImage, percentage: u8) {
    if percentage == 0 {
        return;
    }

    let factor = 1.0 - f32::from(percentage.min(100)) / 100.0;
    frame.par_pixels_mut().for_each(|px| {
        for c in &mut px.0[..3] {
            *c = (f32::from(*c) * factor).clamp(0.0, 255.0) as u8;
        }
    });
}

/// How a status change was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The resolved avatar was already active.
    Unchanged,
    /// Straight cut to the speaking avatar from frame zero.
    Instant,
    /// Timed blend from the previous avatar.
    CrossFade,
    /// Plain swap.
    Cut,
}

#[derive(Debug)]
struct CrossFade {
    /// Copy of the outgoing track with its own cursor.
    previous: AnimationTrack<RgbaImage>,
    started: Instant,
}

/// Owns the avatar tracks and every piece of transition state.
#[derive(Debug)]
pub struct EffectController {
    avatars: [AnimationTrack<RgbaImage>; 4],
    active: AvatarAsset,
    fade: Option<CrossFade>,
    bounce_started: Option<Instant>,
    bounce_activations: u64,
    last_status: Option<VoiceStatus>,
}

impl EffectController {
    /// Build tracks for every avatar asset, in [`AvatarAsset::ALL`] order.
    ///
    /// An empty inactive asset is replaced by one transparent frame of
    /// `canvas` size so that the fallback track always has frames.
    pub fn new(avatars: [LoadedAsset<RgbaImage>; 4], canvas: (u32, u32), now: Instant) -> Self {
        let avatars = avatars.map(|asset| AnimationTrack::new(asset, now));
        let mut controller = Self {
            avatars,
            active: AvatarAsset::Inactive,
            fade: None,
            bounce_started: None,
            bounce_activations: 0,
            last_status: None,
        };

        let inactive = AvatarAsset::Inactive.index();
        if controller.avatars[inactive].is_empty() {
            warn!(
                width = canvas.0,
                height = canvas.1,
                "inactive avatar missing, using a transparent frame"
            );
            let blank = RgbaImage::new(canvas.0.max(1), canvas.1.max(1));
            controller.avatars[inactive] = AnimationTrack::new(LoadedAsset::still(blank, None), now);
        }

        controller
    }

    #[must_use]
    pub fn active(&self) -> AvatarAsset {
        self.active
    }

    #[cfg(test)]
    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    #[cfg(test)]
    pub fn is_bouncing(&self) -> bool {
        self.bounce_started.is_some()
    }

    /// Number of bounces started since construction.
    #[must_use]
    pub fn bounce_activations(&self) -> u64 {
        self.bounce_activations
    }

    #[must_use]
    pub fn track(&self, asset: AvatarAsset) -> &AnimationTrack<RgbaImage> {
        &self.avatars[asset.index()]
    }

    /// Asset actually shown for `asset`: itself, or the inactive one if it has no frames.
    #[must_use]
    pub fn resolve(&self, asset: AvatarAsset) -> AvatarAsset {
        if self.avatars[asset.index()].is_empty() {
            AvatarAsset::Inactive
        } else {
            asset
        }
    }

    /// First frame of the avatar shown for `status`.
    #[must_use]
    pub fn static_frame(&self, status: VoiceStatus) -> Option<&RgbaImage> {
        self.track(self.resolve(status.asset())).first_frame()
    }

    /// Apply a voice status change.
    pub fn on_status(
        &mut self,
        status: VoiceStatus,
        config: &EngineConfig,
        now: Instant,
    ) -> Transition {
        let was_speaking = self.last_status.is_some_and(VoiceStatus::is_speaking);
        self.last_status = Some(status);

        if status.is_speaking() && config.bouncing_enabled && !was_speaking {
            self.bounce_started = Some(now);
            self.bounce_activations += 1;
            debug!("bounce started");
        }

        let requested = status.asset();
        let target = self.resolve(requested);
        if target != requested {
            warn!(%status, asset = requested.file_stem(), "avatar has no frames, showing inactive");
        }

        if target == self.active {
            return Transition::Unchanged;
        }

        let transition = if config.instant_talk_transition && status.is_speaking() {
            self.fade = None;
            self.avatars[target.index()].reset(now);
            Transition::Instant
        } else if config.cross_fade_enabled {
            self.fade = Some(CrossFade {
                previous: self.avatars[self.active.index()].snapshot(now),
                started: now,
            });
            self.activate(target, config, now);
            Transition::CrossFade
        } else {
            self.fade = None;
            self.activate(target, config, now);
            Transition::Cut
        };

        debug!(from = ?self.active, to = ?target, ?transition, "avatar changed");
        self.active = target;
        transition
    }

    fn activate(&mut self, target: AvatarAsset, config: &EngineConfig, now: Instant) {
        let track = &mut self.avatars[target.index()];
        if config.reset_animation_on_status_change {
            track.reset(now);
        } else {
            track.resume(now);
        }
    }

    /// Bounce displacement at `now`, ending the bounce once it has run its course.
    pub fn bounce_offset(&mut self, config: &EngineConfig, now: Instant) -> i32 {
        if !config.bouncing_enabled {
            self.bounce_started = None;
            return 0;
        }

        let Some(started) = self.bounce_started else {
            return 0;
        };

        let elapsed = now.saturating_duration_since(started);
        if elapsed >= BOUNCE_DURATION {
            self.bounce_started = None;
            return 0;
        }

        bounce_offset(elapsed, BOUNCE_DURATION, BOUNCE_MAX_OFFSET)
    }

    /// Advance the avatar tracks and produce the image for this instant.
    pub fn avatar_frame(&mut self, config: &EngineConfig, now: Instant) -> Option<RgbaImage> {
        let progress = self.fade.as_ref().map(|fade| {
            let duration = Duration::from_millis(config.cross_fade_duration_ms);
            fade_progress(now.saturating_duration_since(fade.started), duration)
        });

        if !config.cross_fade_enabled || progress.is_some_and(|p| p >= 1.0) {
            self.fade = None;
        }

        let current = &mut self.avatars[self.active.index()];
        let mut frame = match self.fade.as_mut() {
            Some(fade) => {
                let progress = progress.unwrap_or(1.0);
                let new = current.advance(now);
                let old = fade.previous.advance(now);
                match (old, new) {
                    (Some(old), Some(new)) => Some(crossfade_blend(old, new, progress)),
                    (_, new) => new.cloned(),
                }
            }
            None => current.advance(now).cloned(),
        }?;

        if config.dim_enabled && !self.last_status.is_some_and(VoiceStatus::is_speaking) {
            dim(&mut frame, config.dim_percentage);
        }

        Some(frame)
    }
}

fn fade_progress(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn solid(rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba(rgba))
    }

    fn asset(frames: &[[u8; 4]], duration: Duration) -> LoadedAsset<RgbaImage> {
        LoadedAsset {
            frames: frames.iter().map(|c| solid(*c)).collect(),
            durations: vec![duration; frames.len()],
            source_fps: 10.0,
            path: None,
        }
    }

    /// Speaking: two frames, inactive: green, muted: red, deafened: missing.
    fn controller(now: Instant) -> EffectController {
        EffectController::new(
            [
                asset(&[[255, 255, 255, 255], [200, 200, 200, 255]], ms(100)),
                asset(&[[0, 255, 0, 255]], ms(1000)),
                asset(&[[255, 0, 0, 255], [128, 0, 0, 255], [64, 0, 0, 255]], ms(100)),
                LoadedAsset::empty(),
            ],
            (4, 4),
            now,
        )
    }

    fn plain() -> EngineConfig {
        EngineConfig::default()
            .bouncing_enabled(false)
            .cross_fade_enabled(false)
            .dim_enabled(false)
            .instant_talk_transition(false)
    }

    #[test]
    fn bounce_curve_shape() {
        for max in [1, 10, 37] {
            assert_eq!(bounce_offset(Duration::ZERO, BOUNCE_DURATION, max), 0);
            assert_eq!(bounce_offset(BOUNCE_DURATION, BOUNCE_DURATION, max), 0);
            assert_eq!(bounce_offset(BOUNCE_DURATION / 2, BOUNCE_DURATION, max), -(max as i32));

            let peak = bounce_offset(BOUNCE_DURATION / 2, BOUNCE_DURATION, max).abs();
            for step in 0..15 {
                let off = bounce_offset(ms(step * 10), BOUNCE_DURATION, max);
                assert!(off <= 0 && off.abs() <= peak);
            }
        }
    }

    #[test]
    fn crossfade_endpoints_and_monotonic() {
        let old = solid([10, 200, 30, 255]);
        let new = solid([250, 0, 90, 0]);

        assert_eq!(crossfade_blend(&old, &new, 0.0), old);
        assert_eq!(crossfade_blend(&old, &new, 1.0), new);

        let mut prev = crossfade_blend(&old, &new, 0.0).get_pixel(0, 0).0;
        for step in 1..=20 {
            let px = crossfade_blend(&old, &new, step as f32 / 20.0).get_pixel(0, 0).0;
            assert!(px[0] >= prev[0]);
            assert!(px[1] <= prev[1]);
            assert!(px[2] >= prev[2]);
            assert!(px[3] <= prev[3]);
            prev = px;
        }
    }

    #[test]
    fn crossfade_resizes_old_frame() {
        let old = RgbaImage::from_pixel(8, 2, Rgba([100, 100, 100, 255]));
        let new = solid([100, 100, 100, 255]);
        let out = crossfade_blend(&old, &new, 0.5);
        assert_eq!(out.dimensions(), (4, 4));
    }

    #[test]
    fn dim_extremes() {
        let original = RgbaImage::from_fn(3, 3, |x, y| Rgba([x as u8 * 80, y as u8 * 90, 255, 77]));

        let mut frame = original.clone();
        dim(&mut frame, 0);
        assert_eq!(frame, original);

        dim(&mut frame, 100);
        for px in frame.pixels() {
            assert_eq!(px.0, [0, 0, 0, 77]);
        }

        let mut half = solid([200, 100, 50, 255]);
        dim(&mut half, 50);
        assert_eq!(half.get_pixel(0, 0).0, [100, 50, 25, 255]);
    }

    #[test]
    fn single_bounce_on_entering_speaking() {
        let now = Instant::now();
        let mut fx = controller(now);
        let config = plain().bouncing_enabled(true);

        for (i, label) in ["Молчит", "Говорит", "Молчит"].into_iter().enumerate() {
            let status = VoiceStatus::from_label(label).unwrap();
            fx.on_status(status, &config, now + ms(i as u64 * 500));
        }

        assert_eq!(fx.bounce_activations(), 1);
    }

    #[test]
    fn bounce_runs_its_course() {
        let now = Instant::now();
        let mut fx = controller(now);
        let config = plain().bouncing_enabled(true);

        fx.on_status(VoiceStatus::Speaking, &config, now);
        assert_eq!(fx.bounce_offset(&config, now + BOUNCE_DURATION / 2), -(BOUNCE_MAX_OFFSET as i32));
        assert!(fx.is_bouncing());
        assert_eq!(fx.bounce_offset(&config, now + BOUNCE_DURATION), 0);
        assert!(!fx.is_bouncing());

        // staying in speaking does not bounce again
        fx.on_status(VoiceStatus::Speaking, &config, now + ms(400));
        assert_eq!(fx.bounce_activations(), 1);
    }

    #[test]
    fn resume_without_reset() {
        let now = Instant::now();
        let mut fx = controller(now);
        let config = plain().reset_animation_on_status_change(false);

        // A: muted, held for 150 ms -> frame 1
        fx.on_status(VoiceStatus::Muted, &config, now);
        fx.avatar_frame(&config, now + ms(150));
        assert_eq!(fx.track(AvatarAsset::Muted).cursor().index, 1);

        // B: silent for a long time
        fx.on_status(VoiceStatus::Silent, &config, now + ms(150));
        fx.avatar_frame(&config, now + ms(5_000));

        // back to A: continues from frame 1, not frame 0
        fx.on_status(VoiceStatus::Muted, &config, now + ms(5_000));
        let frame = fx.avatar_frame(&config, now + ms(5_010)).unwrap();
        assert_eq!(fx.track(AvatarAsset::Muted).cursor().index, 1);
        assert_eq!(frame.get_pixel(0, 0).0, [128, 0, 0, 255]);
    }

    #[test]
    fn reset_on_status_change() {
        let now = Instant::now();
        let mut fx = controller(now);
        let config = plain();

        fx.on_status(VoiceStatus::Muted, &config, now);
        fx.avatar_frame(&config, now + ms(150));
        fx.on_status(VoiceStatus::Silent, &config, now + ms(150));
        fx.on_status(VoiceStatus::Muted, &config, now + ms(300));
        let frame = fx.avatar_frame(&config, now + ms(310)).unwrap();
        assert_eq!(frame.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn missing_avatar_falls_back_to_inactive() {
        let now = Instant::now();
        let mut fx = controller(now);
        let config = plain();

        fx.on_status(VoiceStatus::Muted, &config, now);
        assert_eq!(fx.on_status(VoiceStatus::Deafened, &config, now), Transition::Cut);
        assert_eq!(fx.active(), AvatarAsset::Inactive);
        let frame = fx.avatar_frame(&config, now).unwrap();
        assert_eq!(frame.get_pixel(0, 0).0, [0, 255, 0, 255]);
        assert_eq!(
            fx.static_frame(VoiceStatus::Deafened).map(|f| f.get_pixel(0, 0).0),
            Some([0, 255, 0, 255])
        );
    }

    #[test]
    fn empty_inactive_is_synthesised() {
        let now = Instant::now();
        let mut fx = EffectController::new(
            [
                LoadedAsset::empty(),
                LoadedAsset::empty(),
                LoadedAsset::empty(),
                LoadedAsset::empty(),
            ],
            (6, 5),
            now,
        );
        let frame = fx.avatar_frame(&plain(), now).unwrap();
        assert_eq!(frame.dimensions(), (6, 5));
        assert!(frame.pixels().all(|px| px.0[3] == 0));
        assert_eq!(fx.on_status(VoiceStatus::Speaking, &plain(), now), Transition::Unchanged);
    }

    #[test]
    fn instant_talk_skips_crossfade() {
        let now = Instant::now();
        let mut fx = controller(now);
        let config = plain().cross_fade_enabled(true).instant_talk_transition(true);

        fx.on_status(VoiceStatus::Muted, &config, now);
        assert!(fx.is_fading());
        fx.avatar_frame(&config, now + ms(150));

        assert_eq!(fx.on_status(VoiceStatus::Speaking, &config, now + ms(160)), Transition::Instant);
        assert!(!fx.is_fading());
        let frame = fx.avatar_frame(&config, now + ms(170)).unwrap();
        assert_eq!(frame.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn crossfade_blends_then_settles() {
        let now = Instant::now();
        let mut fx = controller(now);
        let config = plain()
            .cross_fade_enabled(true)
            .cross_fade_duration_ms(200u64)
            .reset_animation_on_status_change(true);

        assert_eq!(fx.on_status(VoiceStatus::Muted, &config, now), Transition::CrossFade);

        // half way from green to the second muted frame
        let mid = fx.avatar_frame(&config, now + ms(100)).unwrap();
        assert_eq!(mid.get_pixel(0, 0).0, [64, 128, 0, 255]);

        let end = fx.avatar_frame(&config, now + ms(200)).unwrap();
        assert!(!fx.is_fading());
        assert_eq!(end.get_pixel(0, 0).0, [64, 0, 0, 255]);
    }

    #[test]
    fn zero_length_crossfade_ends_immediately() {
        let now = Instant::now();
        let mut fx = controller(now);
        let config = plain().cross_fade_enabled(true).cross_fade_duration_ms(0u64);

        fx.on_status(VoiceStatus::Muted, &config, now);
        let frame = fx.avatar_frame(&config, now).unwrap();
        assert!(!fx.is_fading());
        assert_eq!(frame.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn dims_only_while_not_speaking() {
        let now = Instant::now();
        let mut fx = controller(now);
        let config = plain().dim_enabled(true).dim_percentage(50u8);

        let frame = fx.avatar_frame(&config, now).unwrap();
        assert_eq!(frame.get_pixel(0, 0).0, [0, 127, 0, 255]);

        fx.on_status(VoiceStatus::Speaking, &config, now);
        let frame = fx.avatar_frame(&config, now).unwrap();
        assert_eq!(frame.get_pixel(0, 0).0, [255, 255, 255, 255]);
    }
}
