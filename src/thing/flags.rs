//! Flag-byte tables, one per metadata format.
//!
//! A flag record is a sequence of flag bytes, each optionally followed by a
//! payload, terminated by [`LAST_FLAG`]. The meaning of a byte depends on the
//! format; every table lists its flags in ascending byte order, which is also
//! the write order.

use crate::core::MetadataFormat;

/// Terminates a flag record.
pub const LAST_FLAG: u8 = 0xFF;

/// Format-independent identity of a flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attr {
    Ground,
    GroundBorder,
    OnBottom,
    OnTop,
    Container,
    Stackable,
    ForceUse,
    MultiUse,
    Chargeable,
    Writable,
    WritableOnce,
    FluidContainer,
    Fluid,
    Unpassable,
    Unmoveable,
    BlockMissile,
    BlockPathfind,
    NoMoveAnimation,
    Pickupable,
    Hangable,
    HookSouth,
    HookEast,
    Rotatable,
    Light,
    DontHide,
    Translucent,
    FloorChange,
    Offset,
    Elevation,
    LyingObject,
    AnimateAlways,
    MinimapColor,
    LensHelp,
    FullGround,
    IgnoreLook,
    Cloth,
    Market,
    DefaultAction,
    Wrappable,
    Unwrappable,
    TopEffect,
    Usable,
}

use Attr::*;

// 7.10 - 7.50
const TABLE_V2: &[(u8, Attr)] = &[
    (0x00, Ground),
    (0x01, OnBottom),
    (0x02, OnTop),
    (0x03, Container),
    (0x04, Stackable),
    (0x05, MultiUse),
    (0x06, ForceUse),
    (0x07, Writable),
    (0x08, WritableOnce),
    (0x09, FluidContainer),
    (0x0A, Fluid),
    (0x0B, Unpassable),
    (0x0C, Unmoveable),
    (0x0D, BlockMissile),
    (0x0E, BlockPathfind),
    (0x0F, Pickupable),
    (0x10, Light),
    (0x11, FloorChange),
    (0x12, FullGround),
    (0x13, Elevation),
    (0x14, Offset),
    (0x16, MinimapColor),
    (0x17, Rotatable),
    (0x18, LyingObject),
    (0x19, Hangable),
    (0x1A, HookSouth),
    (0x1B, HookEast),
    (0x1C, AnimateAlways),
];

// 7.55 - 7.72
const TABLE_V3: &[(u8, Attr)] = &[
    (0x00, Ground),
    (0x01, GroundBorder),
    (0x02, OnBottom),
    (0x03, OnTop),
    (0x04, Container),
    (0x05, Stackable),
    (0x06, ForceUse),
    (0x07, MultiUse),
    (0x08, Writable),
    (0x09, WritableOnce),
    (0x0A, FluidContainer),
    (0x0B, Fluid),
    (0x0C, Unpassable),
    (0x0D, Unmoveable),
    (0x0E, BlockMissile),
    (0x0F, BlockPathfind),
    (0x10, Pickupable),
    (0x11, Hangable),
    (0x12, HookSouth),
    (0x13, HookEast),
    (0x14, Rotatable),
    (0x15, Light),
    (0x16, DontHide),
    (0x17, FloorChange),
    (0x18, Offset),
    (0x19, Elevation),
    (0x1A, LyingObject),
    (0x1B, AnimateAlways),
    (0x1C, MinimapColor),
    (0x1D, LensHelp),
    (0x1E, FullGround),
];

// 7.80 - 8.54
const TABLE_V4: &[(u8, Attr)] = &[
    (0x00, Ground),
    (0x01, GroundBorder),
    (0x02, OnBottom),
    (0x03, OnTop),
    (0x04, Container),
    (0x05, Stackable),
    (0x06, ForceUse),
    (0x07, MultiUse),
    (0x08, Chargeable),
    (0x09, Writable),
    (0x0A, WritableOnce),
    (0x0B, FluidContainer),
    (0x0C, Fluid),
    (0x0D, Unpassable),
    (0x0E, Unmoveable),
    (0x0F, BlockMissile),
    (0x10, BlockPathfind),
    (0x11, Pickupable),
    (0x12, Hangable),
    (0x13, HookSouth),
    (0x14, HookEast),
    (0x15, Rotatable),
    (0x16, Light),
    (0x17, DontHide),
    (0x18, Translucent),
    (0x19, Offset),
    (0x1A, Elevation),
    (0x1B, LyingObject),
    (0x1C, AnimateAlways),
    (0x1D, MinimapColor),
    (0x1E, LensHelp),
    (0x1F, FullGround),
    (0x20, IgnoreLook),
];

// 8.60 - 9.86
const TABLE_V5: &[(u8, Attr)] = &[
    (0x00, Ground),
    (0x01, GroundBorder),
    (0x02, OnBottom),
    (0x03, OnTop),
    (0x04, Container),
    (0x05, Stackable),
    (0x06, ForceUse),
    (0x07, MultiUse),
    (0x08, Writable),
    (0x09, WritableOnce),
    (0x0A, FluidContainer),
    (0x0B, Fluid),
    (0x0C, Unpassable),
    (0x0D, Unmoveable),
    (0x0E, BlockMissile),
    (0x0F, BlockPathfind),
    (0x10, Pickupable),
    (0x11, Hangable),
    (0x12, HookSouth),
    (0x13, HookEast),
    (0x14, Rotatable),
    (0x15, Light),
    (0x16, DontHide),
    (0x17, Translucent),
    (0x18, Offset),
    (0x19, Elevation),
    (0x1A, LyingObject),
    (0x1B, AnimateAlways),
    (0x1C, MinimapColor),
    (0x1D, LensHelp),
    (0x1E, FullGround),
    (0x1F, IgnoreLook),
    (0x20, Cloth),
    (0x21, Market),
    (0xFE, Usable),
];

// 10.10 and later
const TABLE_V6: &[(u8, Attr)] = &[
    (0x00, Ground),
    (0x01, GroundBorder),
    (0x02, OnBottom),
    (0x03, OnTop),
    (0x04, Container),
    (0x05, Stackable),
    (0x06, ForceUse),
    (0x07, MultiUse),
    (0x08, Writable),
    (0x09, WritableOnce),
    (0x0A, FluidContainer),
    (0x0B, Fluid),
    (0x0C, Unpassable),
    (0x0D, Unmoveable),
    (0x0E, BlockMissile),
    (0x0F, BlockPathfind),
    (0x10, NoMoveAnimation),
    (0x11, Pickupable),
    (0x12, Hangable),
    (0x13, HookSouth),
    (0x14, HookEast),
    (0x15, Rotatable),
    (0x16, Light),
    (0x17, DontHide),
    (0x18, Translucent),
    (0x19, Offset),
    (0x1A, Elevation),
    (0x1B, LyingObject),
    (0x1C, AnimateAlways),
    (0x1D, MinimapColor),
    (0x1E, LensHelp),
    (0x1F, FullGround),
    (0x20, IgnoreLook),
    (0x21, Cloth),
    (0x22, Market),
    (0x23, DefaultAction),
    (0x24, Wrappable),
    (0x25, Unwrappable),
    (0x26, TopEffect),
    (0xFE, Usable),
];

/// Flag table of a format, in ascending byte order.
pub fn table(format: MetadataFormat) -> &'static [(u8, Attr)] {
    match format {
        MetadataFormat::V1 | MetadataFormat::V2 => TABLE_V2,
        MetadataFormat::V3 => TABLE_V3,
        MetadataFormat::V4 => TABLE_V4,
        MetadataFormat::V5 => TABLE_V5,
        MetadataFormat::V6 => TABLE_V6,
    }
}

/// Decode a flag byte.
pub fn lookup(format: MetadataFormat, flag: u8) -> Option<Attr> {
    table(format)
        .binary_search_by_key(&flag, |(code, _)| *code)
        .ok()
        .map(|i| table(format)[i].1)
}
