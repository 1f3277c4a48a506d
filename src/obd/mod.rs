//! Standalone object blobs.
//!
//! A blob holds one object and the pixels of every sprite its frame group
//! references, zlib-compressed as a whole. The leading `u16` of the
//! inflated stream selects the layout:
//!
//! - `200`: V2, with a one-byte category and a pointer to the frame group
//! - `300`: V3, recognised but not supported
//! - `>= 710`: V1, where the value is the client version itself
//!
//! Outfits are folded to a single frame group before encoding.

use std::collections::HashSet;
use std::io::Cursor;

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use crate::core::{compress, decompress, Features, MetadataFormat};
use crate::sprite::{ChannelOrder, Sprite, PIXEL_DATA_SIZE};
use crate::thing::{
    read_group_header, read_properties, to_single_frame_group, write_group_header,
    write_properties, Category, CursorExt, FrameGroup, FrameGroupType, ObjectType, RecordLayout,
};
use crate::util::{Error, Result};

/// Leading marker of a V2 blob.
pub const OBD_V2_MARKER: u16 = 200;
/// Leading marker of a V3 blob.
pub const OBD_V3_MARKER: u16 = 300;
/// Oldest client version a V1 blob can carry.
pub const MIN_CLIENT_VERSION: u16 = 710;
/// zlib level used by [`encode`].
pub const DEFAULT_LEVEL: u32 = 6;

/// Blob layout revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObdVersion {
    V1,
    V2,
    V3,
}

impl ObdVersion {
    /// Layout selected by the leading `u16` of an inflated blob.
    pub fn from_marker(marker: u16) -> Result<Self> {
        match marker {
            OBD_V2_MARKER => Ok(Self::V2),
            OBD_V3_MARKER => Ok(Self::V3),
            v if v >= MIN_CLIENT_VERSION => Ok(Self::V1),
            v => Err(Error::invalid(format!("unknown object blob marker {}", v))),
        }
    }
}

impl std::fmt::Display for ObdVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1 => f.write_str("OBD v1"),
            Self::V2 => f.write_str("OBD v2"),
            Self::V3 => f.write_str("OBD v3"),
        }
    }
}

/// A decoded blob.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectBlob {
    pub version: ObdVersion,
    pub client_version: u32,
    /// Object with id 0; stores assign the id on insertion.
    pub object: ObjectType,
    /// Referenced sprites in first-use order, without duplicates.
    pub sprites: Vec<Sprite>,
}

/// Encode an object at [`DEFAULT_LEVEL`].
///
/// `sprite_for` supplies every sprite id the default frame group references.
pub fn encode(
    object: &ObjectType,
    sprite_for: impl FnMut(u32) -> Result<Sprite>,
    client_version: u32,
    version: ObdVersion,
) -> Result<Vec<u8>> {
    encode_with_level(object, sprite_for, client_version, version, DEFAULT_LEVEL)
}

/// Encode an object with an explicit zlib level.
pub fn encode_with_level(
    object: &ObjectType,
    mut sprite_for: impl FnMut(u32) -> Result<Sprite>,
    client_version: u32,
    version: ObdVersion,
    level: u32,
) -> Result<Vec<u8>> {
    let client = u16::try_from(client_version)
        .ok()
        .filter(|v| *v >= MIN_CLIENT_VERSION)
        .ok_or_else(|| Error::InvalidVersion(format!("client {} cannot be stored in a blob", client_version)))?;

    let object = to_single_frame_group(object)?;
    let category = object.category();
    let group = object.default_group();

    let mut out = Vec::new();
    match version {
        ObdVersion::V1 => {
            out.write_u16::<LittleEndian>(client)?;
            let name = category.name().as_bytes();
            out.write_u16::<LittleEndian>(name.len() as u16)?;
            out.extend_from_slice(name);
            write_properties(&mut out, &object.properties, &RecordLayout::for_client(client_version, Features::empty()))?;
            write_group_header(&mut out, group, category, true, false)?;
        }
        ObdVersion::V2 => {
            out.write_u16::<LittleEndian>(OBD_V2_MARKER)?;
            out.write_u16::<LittleEndian>(client)?;
            out.write_u8(category as u8)?;
            let pointer = out.len();
            out.write_u32::<LittleEndian>(0)?;
            write_properties(&mut out, &object.properties, &v2_layout(client_version))?;
            let group_pos = out.len() as u32;
            out[pointer..pointer + 4].copy_from_slice(&group_pos.to_le_bytes());
            write_group_header(&mut out, group, category, true, true)?;
        }
        ObdVersion::V3 => return Err(Error::unsupported("writing OBD v3 blobs")),
    }

    for &id in &group.sprite_ids {
        let pixels = if id == 0 {
            vec![0u8; PIXEL_DATA_SIZE]
        } else {
            sprite_for(id)?.pixels_in(ChannelOrder::Rgba)?
        };
        out.write_u32::<LittleEndian>(id)?;
        out.write_u32::<LittleEndian>(pixels.len() as u32)?;
        out.extend_from_slice(&pixels);
    }

    debug!(%category, %version, raw = out.len(), "encoded object blob");
    compress(&out, level)
}

/// Decode a blob.
pub fn decode(blob: &[u8]) -> Result<ObjectBlob> {
    let data = decompress(blob)?;
    let mut r = Cursor::new(data.as_slice());
    let marker = r.get_u16()?;
    let version = ObdVersion::from_marker(marker)?;

    let (client_version, category, properties, mut group) = match version {
        ObdVersion::V1 => {
            let client = u32::from(marker);
            let len = r.get_u16()? as usize;
            let name = String::from_utf8(r.get_bytes(len)?)?;
            let category = Category::from_name(&name)?;
            let layout = RecordLayout::for_client(client, Features::empty());
            let properties = read_properties(&mut r, 0, category, &layout)?;
            let group = read_group_header(&mut r, FrameGroupType::Default, true, false)?;
            (client, category, properties, group)
        }
        ObdVersion::V2 => {
            let client = u32::from(r.get_u16()?);
            let category = Category::from_u8(r.get_u8()?)?;
            let group_pos = u64::from(r.get_u32()?);
            let properties = read_properties(&mut r, 0, category, &v2_layout(client))?;
            if group_pos < r.position() || group_pos > data.len() as u64 {
                return Err(Error::invalid(format!(
                    "frame group pointer {} outside blob (flags end at {})",
                    group_pos,
                    r.position()
                )));
            }
            r.set_position(group_pos);
            let group = read_group_header(&mut r, FrameGroupType::Default, true, true)?;
            (client, category, properties, group)
        }
        ObdVersion::V3 => return Err(Error::unsupported("reading OBD v3 blobs")),
    };

    let sprites = read_sprites(&mut r, &mut group)?;
    let object = ObjectType::from_parts(0, category, properties, [group])?;
    debug!(%category, %version, client_version, sprites = sprites.len(), "decoded object blob");
    Ok(ObjectBlob {
        version,
        client_version,
        object,
        sprites,
    })
}

/// Flags of a V2 blob always use the newest table; wrap and top-effect still follow the client.
fn v2_layout(client: u32) -> RecordLayout {
    RecordLayout {
        client,
        format: MetadataFormat::V6,
        features: Features::all(),
    }
}

fn read_sprites(r: &mut Cursor<&[u8]>, group: &mut FrameGroup) -> Result<Vec<Sprite>> {
    let mut seen = HashSet::new();
    let mut sprites = Vec::new();
    for slot in group.sprite_ids.iter_mut() {
        let id = r.get_u32()?;
        let len = r.get_u32()? as usize;
        if len != PIXEL_DATA_SIZE {
            return Err(Error::invalid(format!("sprite {} has {} pixel bytes", id, len)));
        }
        let pixels = r.get_bytes(len)?;
        *slot = id;
        if id != 0 && seen.insert(id) {
            sprites.push(Sprite::from_pixels(id, true, &pixels, ChannelOrder::Rgba)?);
        }
    }
    Ok(sprites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thing::{Animation, FrameDuration, Light};
    use crate::util::{FrameCell, FrameDimensions};
    use std::collections::HashMap;

    fn pixels(seed: u8) -> Vec<u8> {
        (0..1024u32)
            .flat_map(|i| if i % 3 == 0 { [seed, i as u8, 7, 200] } else { [0, 0, 0, 0] })
            .collect()
    }

    fn sprites() -> HashMap<u32, Sprite> {
        [11u32, 12, 13]
            .into_iter()
            .map(|id| (id, Sprite::from_pixels(id, true, &pixels(id as u8), ChannelOrder::Rgba).unwrap()))
            .collect()
    }

    fn effect() -> ObjectType {
        let mut thing = ObjectType::new(5, Category::Effect);
        thing.properties.light = Some(Light { intensity: 3, color: 180 });
        thing.properties.top_effect = true;
        let dims = FrameDimensions { frames: 3, ..FrameDimensions::default() };
        let mut group = FrameGroup::new(FrameGroupType::Default, dims).unwrap();
        for (frame, id) in [11u32, 12, 11].into_iter().enumerate() {
            group.set_sprite(&FrameCell::pattern(0, 0, 0, frame as u8), id).unwrap();
        }
        group.animation = Some(Animation::default_for(Category::Effect, 3));
        thing.set_frame_group(group).unwrap();
        thing
    }

    fn lookup(map: &HashMap<u32, Sprite>) -> impl FnMut(u32) -> Result<Sprite> + '_ {
        move |id| map.get(&id).cloned().ok_or(Error::IndexOutOfRange { id, count: 0 })
    }

    #[test]
    fn test_v2_round_trip() {
        let map = sprites();
        let blob = encode(&effect(), lookup(&map), 1098, ObdVersion::V2).unwrap();
        let decoded = decode(&blob).unwrap();

        assert_eq!(decoded.version, ObdVersion::V2);
        assert_eq!(decoded.client_version, 1098);
        assert_eq!(decoded.object, effect().with_id(0));
        assert_eq!(decoded.sprites.len(), 2);
        assert_eq!(decoded.sprites[0].id(), 11);
        assert_eq!(decoded.sprites[0].pixels().unwrap(), map[&11].pixels().unwrap());
    }

    #[test]
    fn test_v2_header_layout() {
        let map = sprites();
        let raw = decompress(&encode(&effect(), lookup(&map), 1098, ObdVersion::V2).unwrap()).unwrap();
        assert_eq!(&raw[0..2], &200u16.to_le_bytes());
        assert_eq!(&raw[2..4], &1098u16.to_le_bytes());
        assert_eq!(raw[4], Category::Effect as u8);
        let group_pos = u32::from_le_bytes([raw[5], raw[6], raw[7], raw[8]]) as usize;
        // light (5 bytes) + top effect (1) + terminator
        assert_eq!(group_pos, 9 + 5 + 1 + 1);
        assert_eq!(raw[group_pos - 1], 0xFF);
    }

    #[test]
    fn test_v1_round_trip_drops_animation_block() {
        let map = sprites();
        let blob = encode(&effect(), lookup(&map), 860, ObdVersion::V1).unwrap();
        let raw = decompress(&blob).unwrap();
        assert_eq!(&raw[0..2], &860u16.to_le_bytes());
        assert_eq!(&raw[2..4], &6u16.to_le_bytes());
        assert_eq!(&raw[4..10], b"effect");

        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded.version, ObdVersion::V1);
        assert_eq!(decoded.client_version, 860);
        let group = decoded.object.default_group();
        assert_eq!(group.sprite_ids, vec![11, 12, 11]);
        assert!(group.animation.is_none());
        // 8.60 has no top-effect flag
        assert!(!decoded.object.properties.top_effect);
        assert_eq!(decoded.object.properties.light, Some(Light { intensity: 3, color: 180 }));
    }

    #[test]
    fn test_outfit_is_collapsed() {
        let mut outfit = ObjectType::new(1, Category::Outfit);
        let dims = FrameDimensions { pattern_x: 4, frames: 2, ..FrameDimensions::default() };
        let mut walking = FrameGroup::new(FrameGroupType::Walking, dims).unwrap();
        walking.animation = Some(Animation {
            durations: vec![FrameDuration::fixed(50); 2],
            ..Animation::default_for(Category::Outfit, 2)
        });
        outfit.set_frame_group(walking).unwrap();

        let blob = encode(&outfit, |_| Err(Error::other("no sprites")), 1098, ObdVersion::V2).unwrap();
        let decoded = decode(&blob).unwrap();
        assert!(!decoded.object.has_walking_group());
        assert_eq!(decoded.object.default_group().frames, 3);
        assert!(decoded.sprites.is_empty());
    }

    #[test]
    fn test_v3_unsupported() {
        let thing = ObjectType::new(100, Category::Item);
        assert!(matches!(
            encode(&thing, |_| Err(Error::other("unused")), 1098, ObdVersion::V3),
            Err(Error::Unsupported(_))
        ));

        let raw = compress(&[0x2C, 0x01, 0, 0], 6).unwrap();
        assert!(matches!(decode(&raw), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_rejects_bad_blobs() {
        assert!(decode(b"plain bytes").is_err());
        let raw = compress(&[0x10, 0x00], 6).unwrap();
        assert!(matches!(decode(&raw), Err(Error::InvalidStructure(_))));

        let thing = ObjectType::new(100, Category::Item);
        assert!(matches!(
            encode(&thing, |_| Err(Error::other("unused")), 700, ObdVersion::V1),
            Err(Error::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_missing_sprite_propagates() {
        let mut item = ObjectType::new(100, Category::Item);
        item.frame_group_mut(FrameGroupType::Default).unwrap().sprite_ids[0] = 99;
        assert!(matches!(
            encode(&item, |id| Err(Error::IndexOutOfRange { id, count: 1 }), 1098, ObdVersion::V2),
            Err(Error::IndexOutOfRange { id: 99, .. })
        ));
    }
}
