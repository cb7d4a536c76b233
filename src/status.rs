// SPDX-License-Identifier: MPL-2.0

//! Voice status labels reported by the monitor and the avatar assets they select.

use std::fmt;

/// Base file name of the background asset.
pub const BACKGROUND_ASSET: &str = "BG";

/// Every voice status the monitor can report.
///
/// The first four are real voice states; the rest are degraded conditions of
/// the monitor itself and all show the inactive avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceStatus {
    Speaking,
    Silent,
    Muted,
    Deafened,
    Loading,
    Error,
    NotFound,
}

impl VoiceStatus {
    pub const ALL: [VoiceStatus; 7] = [
        VoiceStatus::Speaking,
        VoiceStatus::Silent,
        VoiceStatus::Muted,
        VoiceStatus::Deafened,
        VoiceStatus::Loading,
        VoiceStatus::Error,
        VoiceStatus::NotFound,
    ];

    /// Label exactly as emitted by the monitor.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            VoiceStatus::Speaking => "Говорит",
            VoiceStatus::Silent => "Молчит",
            VoiceStatus::Muted => "Микрофон выключен (muted)",
            VoiceStatus::Deafened => "Полностью заглушен (deafened)",
            VoiceStatus::Loading => "Картинка загружается (или не определена)",
            VoiceStatus::Error => "Ошибка",
            VoiceStatus::NotFound => "Элемент статуса голоса не найден.",
        }
    }

    fn alias(self) -> &'static str {
        match self {
            VoiceStatus::Speaking => "speaking",
            VoiceStatus::Silent => "silent",
            VoiceStatus::Muted => "muted",
            VoiceStatus::Deafened => "deafened",
            VoiceStatus::Loading => "loading",
            VoiceStatus::Error => "error",
            VoiceStatus::NotFound => "not-found",
        }
    }

    /// Parse a monitor label or its short English alias.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.label() == label || s.alias().eq_ignore_ascii_case(label))
    }

    /// Avatar asset shown for this status.
    #[must_use]
    pub fn asset(self) -> AvatarAsset {
        match self {
            VoiceStatus::Speaking => AvatarAsset::Speaking,
            VoiceStatus::Muted => AvatarAsset::Muted,
            VoiceStatus::Deafened => AvatarAsset::Deafened,
            VoiceStatus::Silent
            | VoiceStatus::Loading
            | VoiceStatus::Error
            | VoiceStatus::NotFound => AvatarAsset::Inactive,
        }
    }

    #[must_use]
    pub fn is_speaking(self) -> bool {
        self == VoiceStatus::Speaking
    }
}

impl fmt::Display for VoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alias())
    }
}

/// One avatar image set on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvatarAsset {
    Speaking,
    Inactive,
    Muted,
    Deafened,
}

impl AvatarAsset {
    pub const ALL: [AvatarAsset; 4] = [
        AvatarAsset::Speaking,
        AvatarAsset::Inactive,
        AvatarAsset::Muted,
        AvatarAsset::Deafened,
    ];

    /// Base file name, without extension.
    #[must_use]
    pub fn file_stem(self) -> &'static str {
        match self {
            AvatarAsset::Speaking => "Speaking",
            AvatarAsset::Inactive => "Inactive",
            AvatarAsset::Muted => "Muted",
            AvatarAsset::Deafened => "Deafened",
        }
    }

    #[must_use]
    pub(crate) fn index(self) -> usize {
        match self {
            AvatarAsset::Speaking => 0,
            AvatarAsset::Inactive => 1,
            AvatarAsset::Muted => 2,
            AvatarAsset::Deafened => 3,
        }
    }
}
