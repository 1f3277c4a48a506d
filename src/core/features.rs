//! Optional wire-format capabilities and their resolution per client version.

use serde::{Deserialize, Serialize};

use super::AssetVersion;

/// Client version that introduced the pattern-Z axis.
pub const PATTERN_Z_SINCE: u32 = 755;
/// Client version that introduced 32-bit sprite ids and counts.
pub const EXTENDED_SINCE: u32 = 960;
/// Client version that introduced per-frame durations.
pub const FRAME_DURATIONS_SINCE: u32 = 1050;
/// Client version that introduced multiple frame groups per outfit.
pub const FRAME_GROUPS_SINCE: u32 = 1057;
/// Client version that introduced the wrappable/unwrappable flags.
pub const WRAP_SINCE: u32 = 1092;
/// Client version that introduced the top-effect flag.
pub const TOP_EFFECT_SINCE: u32 = 1093;

bitflags::bitflags! {
    /// Archive feature flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Features: u8 {
        /// Frame groups carry a pattern-Z count
        const PATTERN_Z = 0b0000_0001;
        /// Sprite ids and the sprite count are 32-bit
        const EXTENDED = 0b0000_0010;
        /// Animated frame groups carry an animation block
        const FRAME_DURATIONS = 0b0000_0100;
        /// Outfits may carry several frame groups
        const FRAME_GROUPS = 0b0000_1000;
        /// Sprites keep their alpha channel
        const TRANSPARENCY = 0b0001_0000;
    }
}

impl Features {
    /// Flags a client version cannot be read or written without.
    ///
    /// Transparency is never mandatory; it is a per-archive choice.
    pub fn mandatory(version: u32) -> Self {
        let mut features = Self::empty();
        features.set(Self::PATTERN_Z, version >= PATTERN_Z_SINCE);
        features.set(Self::EXTENDED, version >= EXTENDED_SINCE);
        features.set(Self::FRAME_DURATIONS, version >= FRAME_DURATIONS_SINCE);
        features.set(Self::FRAME_GROUPS, version >= FRAME_GROUPS_SINCE);
        features
    }

    /// Canonical flag set for a version and an explicit request.
    ///
    /// Requested flags are kept even below their threshold; mandatory flags are added.
    pub fn resolve(version: &AssetVersion, requested: Features) -> Self {
        requested | Self::mandatory(version.value())
    }

    #[inline]
    pub fn extended(&self) -> bool {
        self.contains(Self::EXTENDED)
    }

    #[inline]
    pub fn transparency(&self) -> bool {
        self.contains(Self::TRANSPARENCY)
    }

    #[inline]
    pub fn pattern_z(&self) -> bool {
        self.contains(Self::PATTERN_Z)
    }

    #[inline]
    pub fn frame_durations(&self) -> bool {
        self.contains(Self::FRAME_DURATIONS)
    }

    #[inline]
    pub fn frame_groups(&self) -> bool {
        self.contains(Self::FRAME_GROUPS)
    }
}

impl Serialize for Features {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Features {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u8::deserialize(deserializer)?;
        Ok(Features::from_bits_truncate(bits))
    }
}
