// SPDX-License-Identifier: MPL-2.0-only

//! Settings shared between the camera engine and the settings UI.
//!
//! The settings file is a flat `KEY=VALUE` map shared with other parts of the
//! application; [`EngineConfig`] is the typed snapshot the engine reads.

pub mod file;

use std::collections::BTreeMap;

use derive_setters::Setters;

pub use file::ConfigFile;

pub const NAME: &str = "voicecam";

pub const CAM_FPS: &str = "CAM_FPS";
pub const BOUNCING_ENABLED: &str = "BOUNCING_ENABLED";
pub const CROSS_FADE_ENABLED: &str = "CROSS_FADE_ENABLED";
pub const CROSS_FADE_DURATION_MS: &str = "CROSS_FADE_DURATION_MS";
pub const RESET_ANIMATION_ON_STATUS_CHANGE: &str = "RESET_ANIMATION_ON_STATUS_CHANGE";
pub const INSTANT_TALK_TRANSITION: &str = "INSTANT_TALK_TRANSITION";
pub const DIM_ENABLED: &str = "DIM_ENABLED";
pub const DIM_PERCENTAGE: &str = "DIM_PERCENTAGE";

const DEFAULT_CAM_FPS: u32 = 60;
const DEFAULT_CROSS_FADE_DURATION_MS: u64 = 200;
const DEFAULT_DIM_PERCENTAGE: u8 = 50;

/// Flat, string-keyed settings as stored on disk.
pub type Settings = BTreeMap<String, String>;

/// User-tunable engine parameters.
///
/// A snapshot is immutable once handed to the engine; applying new settings
/// replaces the whole value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Setters)]
#[must_use]
pub struct EngineConfig {
    /// output frame rate of the virtual camera
    pub cam_fps: u32,
    /// one-shot upward bounce when speaking starts
    pub bouncing_enabled: bool,
    /// blend between avatar states instead of cutting
    pub cross_fade_enabled: bool,
    /// cross-fade length in milliseconds
    pub cross_fade_duration_ms: u64,
    /// restart an avatar animation from frame zero whenever it becomes active
    pub reset_animation_on_status_change: bool,
    /// always cut straight to the speaking avatar
    pub instant_talk_transition: bool,
    /// darken the avatar while not speaking
    pub dim_enabled: bool,
    /// brightness reduction in percent, 0 to 100
    pub dim_percentage: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cam_fps: DEFAULT_CAM_FPS,
            bouncing_enabled: true,
            cross_fade_enabled: true,
            cross_fade_duration_ms: DEFAULT_CROSS_FADE_DURATION_MS,
            reset_animation_on_status_change: true,
            instant_talk_transition: true,
            dim_enabled: true,
            dim_percentage: DEFAULT_DIM_PERCENTAGE,
        }
    }
}

impl EngineConfig {
    /// Build a snapshot from the flat settings map.
    ///
    /// Missing or malformed keys fall back to their defaults; this never fails.
    pub fn from_settings(settings: &Settings) -> Self {
        let def = Self::default();

        let cam_fps = match settings.get(CAM_FPS).map(|v| v.trim().parse::<i64>()) {
            None => def.cam_fps,
            Some(Ok(fps)) if fps > 0 && fps <= i64::from(u32::MAX) => fps as u32,
            Some(_) => {
                tracing::warn!(value = ?settings.get(CAM_FPS), "invalid {CAM_FPS}, using default");
                def.cam_fps
            }
        };

        let cross_fade_duration_ms = match settings
            .get(CROSS_FADE_DURATION_MS)
            .map(|v| v.trim().parse::<i64>())
        {
            None => def.cross_fade_duration_ms,
            Some(Ok(ms)) if ms >= 0 => ms as u64,
            Some(_) => {
                tracing::warn!(
                    value = ?settings.get(CROSS_FADE_DURATION_MS),
                    "invalid {CROSS_FADE_DURATION_MS}, using default"
                );
                def.cross_fade_duration_ms
            }
        };

        let dim_percentage = match settings.get(DIM_PERCENTAGE).map(|v| v.trim().parse::<i64>()) {
            None => def.dim_percentage,
            Some(Ok(pct)) if (0..=100).contains(&pct) => pct as u8,
            Some(_) => {
                tracing::warn!(
                    value = ?settings.get(DIM_PERCENTAGE),
                    "invalid {DIM_PERCENTAGE}, using default"
                );
                def.dim_percentage
            }
        };

        Self {
            cam_fps,
            bouncing_enabled: flag(settings, BOUNCING_ENABLED, def.bouncing_enabled),
            cross_fade_enabled: flag(settings, CROSS_FADE_ENABLED, def.cross_fade_enabled),
            cross_fade_duration_ms,
            reset_animation_on_status_change: flag(
                settings,
                RESET_ANIMATION_ON_STATUS_CHANGE,
                def.reset_animation_on_status_change,
            ),
            instant_talk_transition: flag(
                settings,
                INSTANT_TALK_TRANSITION,
                def.instant_talk_transition,
            ),
            dim_enabled: flag(settings, DIM_ENABLED, def.dim_enabled),
            dim_percentage,
        }
    }

    /// Write this snapshot back into a settings map, leaving other keys alone.
    pub fn apply_to(&self, settings: &mut Settings) {
        let mut set = |key: &str, value: String| {
            settings.insert(key.to_owned(), value);
        };
        set(CAM_FPS, self.cam_fps.to_string());
        set(BOUNCING_ENABLED, bool_value(self.bouncing_enabled));
        set(CROSS_FADE_ENABLED, bool_value(self.cross_fade_enabled));
        set(CROSS_FADE_DURATION_MS, self.cross_fade_duration_ms.to_string());
        set(
            RESET_ANIMATION_ON_STATUS_CHANGE,
            bool_value(self.reset_animation_on_status_change),
        );
        set(INSTANT_TALK_TRANSITION, bool_value(self.instant_talk_transition));
        set(DIM_ENABLED, bool_value(self.dim_enabled));
        set(DIM_PERCENTAGE, self.dim_percentage.to_string());
    }
}

// Any present value other than a case-insensitive "true" reads as false.
fn flag(settings: &Settings, key: &str, default: bool) -> bool {
    settings
        .get(key)
        .map_or(default, |v| v.trim().eq_ignore_ascii_case("true"))
}

fn bool_value(value: bool) -> String {
    String::from(if value { "True" } else { "False" })
}
