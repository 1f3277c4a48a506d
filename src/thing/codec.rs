//! Object record codec: flag record plus frame-group block.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::flags::{self, Attr, LAST_FLAG};
use super::types::*;
use crate::core::{AssetVersion, Features, MetadataFormat, TOP_EFFECT_SINCE, WRAP_SINCE};
use crate::util::{Error, FrameDimensions, Result};

/// Everything that decides how a record is laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordLayout {
    pub client: u32,
    pub format: MetadataFormat,
    pub features: Features,
}

impl RecordLayout {
    pub fn new(version: &AssetVersion, features: Features) -> Self {
        Self {
            client: version.value(),
            format: version.format(),
            features: Features::resolve(version, features),
        }
    }

    /// Layout for a bare client version number.
    pub fn for_client(client: u32, features: Features) -> Self {
        Self {
            client,
            format: MetadataFormat::for_client(client),
            features: features | Features::mandatory(client),
        }
    }

    /// Offsets carry no payload before 7.55.
    #[inline]
    fn legacy_offset(&self) -> bool {
        self.format <= MetadataFormat::V2
    }

    /// Whether this client knows the flag at all.
    fn emits(&self, attr: Attr) -> bool {
        match attr {
            Attr::Wrappable | Attr::Unwrappable => self.client >= WRAP_SINCE,
            Attr::TopEffect => self.client >= TOP_EFFECT_SINCE,
            _ => true,
        }
    }
}

/// Little-endian reads that report the failing position.
pub(crate) trait CursorExt {
    fn get_u8(&mut self) -> Result<u8>;
    fn get_i8(&mut self) -> Result<i8>;
    fn get_u16(&mut self) -> Result<u16>;
    fn get_i16(&mut self) -> Result<i16>;
    fn get_u32(&mut self) -> Result<u32>;
    fn get_i32(&mut self) -> Result<i32>;
    fn get_bytes(&mut self, len: usize) -> Result<Vec<u8>>;
}

macro_rules! get_le {
    ($name:ident, $ty:ty, $read:ident) => {
        fn $name(&mut self) -> Result<$ty> {
            let pos = self.position();
            self.$read::<LittleEndian>().map_err(|e| Error::from_read(e, pos))
        }
    };
}

impl CursorExt for Cursor<&[u8]> {
    fn get_u8(&mut self) -> Result<u8> {
        let pos = self.position();
        self.read_u8().map_err(|e| Error::from_read(e, pos))
    }

    fn get_i8(&mut self) -> Result<i8> {
        let pos = self.position();
        self.read_i8().map_err(|e| Error::from_read(e, pos))
    }

    get_le!(get_u16, u16, read_u16);
    get_le!(get_i16, i16, read_i16);
    get_le!(get_u32, u32, read_u32);
    get_le!(get_i32, i32, read_i32);

    fn get_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let pos = self.position();
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf).map_err(|e| Error::from_read(e, pos))?;
        Ok(buf)
    }
}

/// Read one object record.
pub fn read_object(
    r: &mut Cursor<&[u8]>,
    id: u32,
    category: Category,
    layout: &RecordLayout,
) -> Result<ObjectType> {
    let properties = read_properties(r, id, category, layout)?;

    let multi = layout.features.frame_groups() && category == Category::Outfit;
    let group_count = if multi { r.get_u8()? } else { 1 };

    let mut groups = Vec::with_capacity(group_count as usize);
    for _ in 0..group_count {
        let kind = if multi {
            FrameGroupType::from_u8(r.get_u8()?)?
        } else {
            FrameGroupType::Default
        };
        let mut group = read_group_header(
            r,
            kind,
            layout.features.pattern_z(),
            layout.features.frame_durations(),
        )?;
        read_sprite_ids(r, &mut group, layout.features.extended())?;
        groups.push(group);
    }

    ObjectType::from_parts(id, category, properties, groups)
}

/// Write one object record.
///
/// Without the frame-groups feature only the default group is written.
pub fn write_object<W: Write>(w: &mut W, object: &ObjectType, layout: &RecordLayout) -> Result<()> {
    write_properties(w, &object.properties, layout)?;

    let category = object.category();
    let pattern_z = layout.features.pattern_z();
    let durations = layout.features.frame_durations();
    let extended = layout.features.extended();

    if layout.features.frame_groups() && category == Category::Outfit {
        w.write_u8(object.groups().len() as u8)?;
        for group in object.groups() {
            w.write_u8(group.kind as u8)?;
            write_group_header(w, group, category, pattern_z, durations)?;
            write_sprite_ids(w, group, extended)?;
        }
    } else {
        let group = object.default_group();
        write_group_header(w, group, category, pattern_z, durations)?;
        write_sprite_ids(w, group, extended)?;
    }
    Ok(())
}

/// Read a flag record up to and including the terminator.
pub fn read_properties(
    r: &mut Cursor<&[u8]>,
    id: u32,
    category: Category,
    layout: &RecordLayout,
) -> Result<Properties> {
    let mut props = Properties::default();
    let mut previous = LAST_FLAG;
    loop {
        let flag = r.get_u8()?;
        if flag == LAST_FLAG {
            return Ok(props);
        }
        let attr = flags::lookup(layout.format, flag).ok_or(Error::UnknownFlag {
            flag,
            previous,
            category: category.name(),
            id,
        })?;
        read_attr(r, attr, &mut props, layout)?;
        previous = flag;
    }
}

fn read_attr(r: &mut Cursor<&[u8]>, attr: Attr, p: &mut Properties, layout: &RecordLayout) -> Result<()> {
    match attr {
        Attr::Ground => p.ground = Some(r.get_u16()?),
        Attr::GroundBorder => p.ground_border = true,
        Attr::OnBottom => p.on_bottom = true,
        Attr::OnTop => p.on_top = true,
        Attr::Container => p.container = true,
        Attr::Stackable => p.stackable = true,
        Attr::ForceUse => p.force_use = true,
        Attr::MultiUse => p.multi_use = true,
        Attr::Chargeable => p.chargeable = true,
        Attr::Writable => p.writable = Some(r.get_u16()?),
        Attr::WritableOnce => p.writable_once = Some(r.get_u16()?),
        Attr::FluidContainer => p.fluid_container = true,
        Attr::Fluid => p.fluid = true,
        Attr::Unpassable => p.unpassable = true,
        Attr::Unmoveable => p.unmoveable = true,
        Attr::BlockMissile => p.block_missile = true,
        Attr::BlockPathfind => p.block_pathfind = true,
        Attr::NoMoveAnimation => p.no_move_animation = true,
        Attr::Pickupable => p.pickupable = true,
        Attr::Hangable => p.hangable = true,
        Attr::HookSouth => p.hook_south = true,
        Attr::HookEast => p.hook_east = true,
        Attr::Rotatable => p.rotatable = true,
        Attr::Light => {
            let intensity = r.get_u16()?;
            let color = r.get_u16()?;
            p.light = Some(Light { intensity, color });
        }
        Attr::DontHide => p.dont_hide = true,
        Attr::Translucent => p.translucent = true,
        Attr::FloorChange => p.floor_change = true,
        Attr::Offset => {
            p.offset = Some(if layout.legacy_offset() {
                Offset::LEGACY
            } else {
                let x = r.get_i16()?;
                let y = r.get_i16()?;
                Offset { x, y }
            });
        }
        Attr::Elevation => p.elevation = Some(r.get_u16()?),
        Attr::LyingObject => p.lying_object = true,
        Attr::AnimateAlways => p.animate_always = true,
        Attr::MinimapColor => p.minimap_color = Some(r.get_u16()?),
        Attr::LensHelp => p.lens_help = Some(r.get_u16()?),
        Attr::FullGround => p.full_ground = true,
        Attr::IgnoreLook => p.ignore_look = true,
        Attr::Cloth => p.cloth_slot = Some(r.get_u16()?),
        Attr::Market => {
            let category = r.get_u16()?;
            let trade_as = r.get_u16()?;
            let show_as = r.get_u16()?;
            let len = r.get_u16()? as usize;
            let name = r.get_bytes(len)?.iter().map(|&b| char::from(b)).collect();
            let restrict_profession = r.get_u16()?;
            let restrict_level = r.get_u16()?;
            p.market = Some(MarketData {
                category,
                trade_as,
                show_as,
                name,
                restrict_profession,
                restrict_level,
            });
        }
        Attr::DefaultAction => p.default_action = Some(r.get_u16()?),
        Attr::Wrappable => p.wrappable = true,
        Attr::Unwrappable => p.unwrappable = true,
        Attr::TopEffect => p.top_effect = true,
        Attr::Usable => p.usable = true,
    }
    Ok(())
}

/// Write a flag record including the terminator.
///
/// Properties the format has no flag for are dropped.
pub fn write_properties<W: Write>(w: &mut W, p: &Properties, layout: &RecordLayout) -> Result<()> {
    for &(code, attr) in flags::table(layout.format) {
        if layout.emits(attr) {
            write_attr(w, code, attr, p, layout)?;
        }
    }
    w.write_u8(LAST_FLAG)?;
    Ok(())
}

fn flag<W: Write>(w: &mut W, code: u8, set: bool) -> Result<()> {
    if set {
        w.write_u8(code)?;
    }
    Ok(())
}

fn flag_u16<W: Write>(w: &mut W, code: u8, value: Option<u16>) -> Result<()> {
    if let Some(value) = value {
        w.write_u8(code)?;
        w.write_u16::<LittleEndian>(value)?;
    }
    Ok(())
}

fn write_attr<W: Write>(w: &mut W, code: u8, attr: Attr, p: &Properties, layout: &RecordLayout) -> Result<()> {
    match attr {
        Attr::Ground => flag_u16(w, code, p.ground),
        Attr::GroundBorder => flag(w, code, p.ground_border),
        Attr::OnBottom => flag(w, code, p.on_bottom),
        Attr::OnTop => flag(w, code, p.on_top),
        Attr::Container => flag(w, code, p.container),
        Attr::Stackable => flag(w, code, p.stackable),
        Attr::ForceUse => flag(w, code, p.force_use),
        Attr::MultiUse => flag(w, code, p.multi_use),
        Attr::Chargeable => flag(w, code, p.chargeable),
        Attr::Writable => flag_u16(w, code, p.writable),
        Attr::WritableOnce => flag_u16(w, code, p.writable_once),
        Attr::FluidContainer => flag(w, code, p.fluid_container),
        Attr::Fluid => flag(w, code, p.fluid),
        Attr::Unpassable => flag(w, code, p.unpassable),
        Attr::Unmoveable => flag(w, code, p.unmoveable),
        Attr::BlockMissile => flag(w, code, p.block_missile),
        Attr::BlockPathfind => flag(w, code, p.block_pathfind),
        Attr::NoMoveAnimation => flag(w, code, p.no_move_animation),
        Attr::Pickupable => flag(w, code, p.pickupable),
        Attr::Hangable => flag(w, code, p.hangable),
        Attr::HookSouth => flag(w, code, p.hook_south),
        Attr::HookEast => flag(w, code, p.hook_east),
        Attr::Rotatable => flag(w, code, p.rotatable),
        Attr::Light => {
            if let Some(light) = p.light {
                w.write_u8(code)?;
                w.write_u16::<LittleEndian>(light.intensity)?;
                w.write_u16::<LittleEndian>(light.color)?;
            }
            Ok(())
        }
        Attr::DontHide => flag(w, code, p.dont_hide),
        Attr::Translucent => flag(w, code, p.translucent),
        Attr::FloorChange => flag(w, code, p.floor_change),
        Attr::Offset => {
            if let Some(offset) = p.offset {
                w.write_u8(code)?;
                if !layout.legacy_offset() {
                    w.write_i16::<LittleEndian>(offset.x)?;
                    w.write_i16::<LittleEndian>(offset.y)?;
                }
            }
            Ok(())
        }
        Attr::Elevation => flag_u16(w, code, p.elevation),
        Attr::LyingObject => flag(w, code, p.lying_object),
        Attr::AnimateAlways => flag(w, code, p.animate_always),
        Attr::MinimapColor => flag_u16(w, code, p.minimap_color),
        Attr::LensHelp => flag_u16(w, code, p.lens_help),
        Attr::FullGround => flag(w, code, p.full_ground),
        Attr::IgnoreLook => flag(w, code, p.ignore_look),
        Attr::Cloth => flag_u16(w, code, p.cloth_slot),
        Attr::Market => match &p.market {
            Some(market) => write_market(w, code, market),
            None => Ok(()),
        },
        Attr::DefaultAction => flag_u16(w, code, p.default_action),
        Attr::Wrappable => flag(w, code, p.wrappable),
        Attr::Unwrappable => flag(w, code, p.unwrappable),
        Attr::TopEffect => flag(w, code, p.top_effect),
        Attr::Usable => flag(w, code, p.usable),
    }
}

fn write_market<W: Write>(w: &mut W, code: u8, market: &MarketData) -> Result<()> {
    let name = market
        .name
        .chars()
        .map(|c| {
            u8::try_from(u32::from(c))
                .map_err(|_| Error::invalid(format!("market name '{}' is not Latin-1", market.name)))
        })
        .collect::<Result<Vec<u8>>>()?;
    let len = u16::try_from(name.len()).map_err(|_| Error::CapacityExceeded {
        what: "market name length",
        limit: u64::from(u16::MAX),
    })?;

    w.write_u8(code)?;
    w.write_u16::<LittleEndian>(market.category)?;
    w.write_u16::<LittleEndian>(market.trade_as)?;
    w.write_u16::<LittleEndian>(market.show_as)?;
    w.write_u16::<LittleEndian>(len)?;
    w.write_all(&name)?;
    w.write_u16::<LittleEndian>(market.restrict_profession)?;
    w.write_u16::<LittleEndian>(market.restrict_level)?;
    Ok(())
}

/// Read dimensions and the optional animation block. Sprite ids are left zero.
pub(crate) fn read_group_header(
    r: &mut Cursor<&[u8]>,
    kind: FrameGroupType,
    pattern_z: bool,
    durations: bool,
) -> Result<FrameGroup> {
    let width = r.get_u8()?;
    let height = r.get_u8()?;
    let exact_size = if width > 1 || height > 1 { r.get_u8()? } else { 32 };
    let layers = r.get_u8()?;
    let pattern_x = r.get_u8()?;
    let pattern_y = r.get_u8()?;
    let pattern_z = if pattern_z { r.get_u8()? } else { 1 };
    let frames = r.get_u8()?;

    let dims = FrameDimensions {
        width,
        height,
        layers,
        pattern_x,
        pattern_y,
        pattern_z,
        frames,
    };
    let mut group = FrameGroup::new(kind, dims)?;
    group.exact_size = exact_size;

    if frames > 1 && durations {
        let mode = AnimationMode::from_u8(r.get_u8()?)?;
        let loop_count = r.get_i32()?;
        let start_frame = r.get_i8()?;
        let mut list = Vec::with_capacity(frames as usize);
        for _ in 0..frames {
            let min = r.get_u32()?;
            let max = r.get_u32()?;
            list.push(FrameDuration { min, max });
        }
        group.animation = Some(Animation {
            mode,
            loop_count,
            start_frame,
            durations: list,
        });
    }
    Ok(group)
}

/// Write dimensions and, when enabled and animated, the animation block.
pub(crate) fn write_group_header<W: Write>(
    w: &mut W,
    group: &FrameGroup,
    category: Category,
    pattern_z: bool,
    durations: bool,
) -> Result<()> {
    group.validate()?;
    if !pattern_z && group.pattern_z != 1 {
        return Err(Error::unsupported(format!(
            "{} frame group has pattern Z {} but the layout has no pattern Z",
            category, group.pattern_z
        )));
    }

    w.write_u8(group.width)?;
    w.write_u8(group.height)?;
    if group.width > 1 || group.height > 1 {
        w.write_u8(group.exact_size)?;
    }
    w.write_u8(group.layers)?;
    w.write_u8(group.pattern_x)?;
    w.write_u8(group.pattern_y)?;
    if pattern_z {
        w.write_u8(group.pattern_z)?;
    }
    w.write_u8(group.frames)?;

    if group.is_animated() && durations {
        let animation = group.animation_or_default(category);
        w.write_u8(animation.mode as u8)?;
        w.write_i32::<LittleEndian>(animation.loop_count)?;
        w.write_i8(animation.start_frame)?;
        for d in &animation.durations {
            w.write_u32::<LittleEndian>(d.min)?;
            w.write_u32::<LittleEndian>(d.max)?;
        }
    }
    Ok(())
}

fn read_sprite_ids(r: &mut Cursor<&[u8]>, group: &mut FrameGroup, extended: bool) -> Result<()> {
    for slot in group.sprite_ids.iter_mut() {
        *slot = if extended {
            r.get_u32()?
        } else {
            u32::from(r.get_u16()?)
        };
    }
    Ok(())
}

fn write_sprite_ids<W: Write>(w: &mut W, group: &FrameGroup, extended: bool) -> Result<()> {
    for &id in &group.sprite_ids {
        if extended {
            w.write_u32::<LittleEndian>(id)?;
        } else {
            let id = u16::try_from(id).map_err(|_| Error::CapacityExceeded {
                what: "sprite id in a non-extended record",
                limit: u64::from(u16::MAX),
            })?;
            w.write_u16::<LittleEndian>(id)?;
        }
    }
    Ok(())
}
