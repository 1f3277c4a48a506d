//! Object-metadata data model.

use smallvec::SmallVec;

use crate::util::{Error, FrameCell, FrameDimensions, Result, MAX_FRAME_GROUP_SPRITES};

/// Object category. The discriminant is the blob wire value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Category {
    Item = 1,
    Outfit = 2,
    Effect = 3,
    Missile = 4,
}

impl Category {
    /// Archive order.
    pub const ALL: [Category; 4] = [Self::Item, Self::Outfit, Self::Effect, Self::Missile];

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Item),
            2 => Ok(Self::Outfit),
            3 => Ok(Self::Effect),
            4 => Ok(Self::Missile),
            _ => Err(Error::invalid(format!("unknown category {}", value))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Outfit => "outfit",
            Self::Effect => "effect",
            Self::Missile => "missile",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::invalid(format!("unknown category '{}'", name)))
    }

    /// First valid id (items start at 100).
    pub fn min_id(self) -> u32 {
        match self {
            Self::Item => 100,
            _ => 1,
        }
    }

    /// Frame duration used when a record carries none, in milliseconds.
    pub fn default_duration(self) -> u32 {
        match self {
            Self::Item => 500,
            Self::Outfit => 300,
            Self::Effect | Self::Missile => 100,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize - 1
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Frame-group role. Only outfits carry a walking group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameGroupType {
    #[default]
    Default = 0,
    Walking = 1,
}

impl FrameGroupType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Default),
            1 => Ok(Self::Walking),
            _ => Err(Error::invalid(format!("unknown frame group type {}", value))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AnimationMode {
    #[default]
    Asynchronous = 0,
    Synchronous = 1,
}

impl AnimationMode {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Asynchronous),
            1 => Ok(Self::Synchronous),
            _ => Err(Error::invalid(format!("unknown animation mode {}", value))),
        }
    }
}

/// Display time range of one frame, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameDuration {
    pub min: u32,
    pub max: u32,
}

impl FrameDuration {
    pub fn fixed(ms: u32) -> Self {
        Self { min: ms, max: ms }
    }
}

/// Animation block of a multi-frame group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Animation {
    pub mode: AnimationMode,
    /// 0 loops forever, a negative value ping-pongs
    pub loop_count: i32,
    /// -1 picks a random start frame
    pub start_frame: i8,
    pub durations: Vec<FrameDuration>,
}

impl Animation {
    /// Category default for `frames` frames.
    pub fn default_for(category: Category, frames: u8) -> Self {
        Self {
            mode: AnimationMode::Asynchronous,
            loop_count: 0,
            start_frame: 0,
            durations: vec![FrameDuration::fixed(category.default_duration()); frames as usize],
        }
    }
}

/// One frame group: dimensions, optional animation and the flat sprite-id table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FrameGroup {
    pub kind: FrameGroupType,
    pub width: u8,
    pub height: u8,
    /// Rendered edge length; 32 unless the group spans several cells.
    pub exact_size: u8,
    pub layers: u8,
    pub pattern_x: u8,
    pub pattern_y: u8,
    pub pattern_z: u8,
    pub frames: u8,
    pub animation: Option<Animation>,
    pub sprite_ids: Vec<u32>,
}

impl FrameGroup {
    /// A group with every sprite id zero and no animation block.
    pub fn new(kind: FrameGroupType, dims: FrameDimensions) -> Result<Self> {
        check_dimensions(&dims)?;
        Ok(Self {
            kind,
            width: dims.width,
            height: dims.height,
            exact_size: 32,
            layers: dims.layers,
            pattern_x: dims.pattern_x,
            pattern_y: dims.pattern_y,
            pattern_z: dims.pattern_z,
            frames: dims.frames,
            animation: None,
            sprite_ids: vec![0; dims.total_sprites()],
        })
    }

    pub fn dimensions(&self) -> FrameDimensions {
        FrameDimensions {
            width: self.width,
            height: self.height,
            layers: self.layers,
            pattern_x: self.pattern_x,
            pattern_y: self.pattern_y,
            pattern_z: self.pattern_z,
            frames: self.frames,
        }
    }

    #[inline]
    pub fn is_animated(&self) -> bool {
        self.frames > 1
    }

    /// Sprite id at a cell, 0 if the cell is outside the group.
    pub fn sprite_at(&self, cell: &FrameCell) -> u32 {
        self.dimensions()
            .checked_sprite_index(cell)
            .and_then(|index| self.sprite_ids.get(index).copied())
            .unwrap_or(0)
    }

    pub fn set_sprite(&mut self, cell: &FrameCell, id: u32) -> Result<()> {
        let dims = self.dimensions();
        let index = dims
            .checked_sprite_index(cell)
            .ok_or_else(|| Error::invalid(format!("cell {:?} outside {}", cell, dims)))?;
        match self.sprite_ids.get_mut(index) {
            Some(slot) => {
                *slot = id;
                Ok(())
            }
            None => Err(Error::invalid("sprite table shorter than its dimensions")),
        }
    }

    /// Animation to store for this group: its own block, or the category default.
    pub fn animation_or_default(&self, category: Category) -> Animation {
        self.animation
            .clone()
            .unwrap_or_else(|| Animation::default_for(category, self.frames))
    }

    /// Check dimensions, table length and animation length agree.
    pub fn validate(&self) -> Result<()> {
        let dims = self.dimensions();
        check_dimensions(&dims)?;
        if self.sprite_ids.len() != dims.total_sprites() {
            return Err(Error::invalid(format!(
                "frame group {} has {} sprite ids",
                dims,
                self.sprite_ids.len()
            )));
        }
        if let Some(animation) = &self.animation {
            if animation.durations.len() != self.frames as usize {
                return Err(Error::invalid(format!(
                    "animation has {} durations for {} frames",
                    animation.durations.len(),
                    self.frames
                )));
            }
        }
        Ok(())
    }
}

fn check_dimensions(dims: &FrameDimensions) -> Result<()> {
    if !dims.is_valid() {
        return Err(Error::invalid(format!("zero-sized frame group {}", dims)));
    }
    if dims.total_sprites() > MAX_FRAME_GROUP_SPRITES {
        return Err(Error::CapacityExceeded {
            what: "sprites per frame group",
            limit: MAX_FRAME_GROUP_SPRITES as u64,
        });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Light {
    pub intensity: u16,
    pub color: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Offset {
    pub x: i16,
    pub y: i16,
}

impl Offset {
    /// The implied offset of clients whose offset flag has no payload.
    pub const LEGACY: Offset = Offset { x: 8, y: 8 };
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MarketData {
    pub category: u16,
    pub trade_as: u16,
    pub show_as: u16,
    pub name: String,
    pub restrict_profession: u16,
    pub restrict_level: u16,
}

/// Flag-record properties. `Option` fields are flags that carry a payload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Properties {
    /// Ground speed
    pub ground: Option<u16>,
    pub ground_border: bool,
    pub on_bottom: bool,
    pub on_top: bool,
    pub container: bool,
    pub stackable: bool,
    pub force_use: bool,
    pub multi_use: bool,
    pub chargeable: bool,
    /// Maximum text length
    pub writable: Option<u16>,
    pub writable_once: Option<u16>,
    pub fluid_container: bool,
    pub fluid: bool,
    pub unpassable: bool,
    pub unmoveable: bool,
    pub block_missile: bool,
    pub block_pathfind: bool,
    pub no_move_animation: bool,
    pub pickupable: bool,
    pub hangable: bool,
    pub hook_south: bool,
    pub hook_east: bool,
    pub rotatable: bool,
    pub light: Option<Light>,
    pub dont_hide: bool,
    pub translucent: bool,
    pub floor_change: bool,
    pub offset: Option<Offset>,
    pub elevation: Option<u16>,
    pub lying_object: bool,
    pub animate_always: bool,
    pub minimap_color: Option<u16>,
    pub lens_help: Option<u16>,
    pub full_ground: bool,
    pub ignore_look: bool,
    pub cloth_slot: Option<u16>,
    pub market: Option<MarketData>,
    pub default_action: Option<u16>,
    pub wrappable: bool,
    pub unwrappable: bool,
    pub top_effect: bool,
    pub usable: bool,
}

/// One item, outfit, effect or missile.
///
/// Always holds a default frame group; outfits may add a walking group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectType {
    id: u32,
    category: Category,
    pub properties: Properties,
    groups: SmallVec<[FrameGroup; 2]>,
}

impl ObjectType {
    /// Placeholder for an empty slot of `category`.
    pub fn new(id: u32, category: Category) -> Self {
        let mut dims = FrameDimensions::default();
        match category {
            Category::Outfit => {
                dims.pattern_x = 4;
                dims.frames = 3;
            }
            Category::Missile => {
                dims.pattern_x = 3;
                dims.pattern_y = 3;
            }
            Category::Item | Category::Effect => {}
        }

        let mut group = Self::placeholder_group(dims);
        if group.is_animated() {
            group.animation = Some(Animation::default_for(category, group.frames));
        }

        let mut groups = SmallVec::new();
        groups.push(group);
        Self {
            id,
            category,
            properties: Properties::default(),
            groups,
        }
    }

    /// Assemble an object. Exactly one default group is required; a walking group only for outfits.
    pub fn from_parts(
        id: u32,
        category: Category,
        properties: Properties,
        groups: impl IntoIterator<Item = FrameGroup>,
    ) -> Result<Self> {
        let groups: SmallVec<[FrameGroup; 2]> = groups.into_iter().collect();
        let defaults = groups.iter().filter(|g| g.kind == FrameGroupType::Default).count();
        let walking = groups.iter().filter(|g| g.kind == FrameGroupType::Walking).count();
        if defaults != 1 || walking > 1 {
            return Err(Error::invalid(format!(
                "{} {} needs one default group, got {} default and {} walking",
                category, id, defaults, walking
            )));
        }
        if walking == 1 && category != Category::Outfit {
            return Err(Error::invalid(format!("{} {} cannot have a walking group", category, id)));
        }
        for group in &groups {
            group.validate()?;
        }
        Ok(Self { id, category, properties, groups })
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn category(&self) -> Category {
        self.category
    }

    /// Same object under another id.
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Groups in stored order.
    #[inline]
    pub fn groups(&self) -> &[FrameGroup] {
        &self.groups
    }

    pub fn frame_group(&self, kind: FrameGroupType) -> Option<&FrameGroup> {
        self.groups.iter().find(|g| g.kind == kind)
    }

    pub fn frame_group_mut(&mut self, kind: FrameGroupType) -> Option<&mut FrameGroup> {
        self.groups.iter_mut().find(|g| g.kind == kind)
    }

    /// The default group.
    pub fn default_group(&self) -> &FrameGroup {
        // from_parts and new guarantee a default group exists
        self.frame_group(FrameGroupType::Default)
            .unwrap_or_else(|| &self.groups[0])
    }

    /// Insert or replace the group of the same kind.
    pub fn set_frame_group(&mut self, group: FrameGroup) -> Result<()> {
        if group.kind == FrameGroupType::Walking && self.category != Category::Outfit {
            return Err(Error::invalid(format!("{} {} cannot have a walking group", self.category, self.id)));
        }
        group.validate()?;
        match self.frame_group_mut(group.kind) {
            Some(slot) => *slot = group,
            None => self.groups.push(group),
        }
        Ok(())
    }

    /// Drop the walking group, if any.
    pub fn remove_walking_group(&mut self) -> Option<FrameGroup> {
        let index = self.groups.iter().position(|g| g.kind == FrameGroupType::Walking)?;
        Some(self.groups.remove(index))
    }

    #[inline]
    pub fn has_walking_group(&self) -> bool {
        self.frame_group(FrameGroupType::Walking).is_some()
    }

    /// Every non-zero sprite id referenced by any group.
    pub fn sprite_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.groups
            .iter()
            .flat_map(|g| g.sprite_ids.iter().copied())
            .filter(|id| *id != 0)
    }

    fn placeholder_group(dims: FrameDimensions) -> FrameGroup {
        FrameGroup {
            kind: FrameGroupType::Default,
            width: dims.width,
            height: dims.height,
            exact_size: 32,
            layers: dims.layers,
            pattern_x: dims.pattern_x,
            pattern_y: dims.pattern_y,
            pattern_z: dims.pattern_z,
            frames: dims.frames,
            animation: None,
            sprite_ids: vec![0; dims.total_sprites()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        let outfit = ObjectType::new(1, Category::Outfit);
        let group = outfit.default_group();
        assert_eq!(group.pattern_x, 4);
        assert_eq!(group.frames, 3);
        assert_eq!(group.sprite_ids.len(), 12);
        assert_eq!(group.animation.as_ref().map(|a| a.durations.len()), Some(3));

        let missile = ObjectType::new(1, Category::Missile);
        assert_eq!(missile.default_group().sprite_ids.len(), 9);
        assert!(missile.default_group().animation.is_none());
    }

    #[test]
    fn test_walking_group_only_for_outfits() {
        let walking = FrameGroup::new(FrameGroupType::Walking, FrameDimensions::default()).unwrap();
        let mut item = ObjectType::new(100, Category::Item);
        assert!(item.set_frame_group(walking.clone()).is_err());

        let mut outfit = ObjectType::new(1, Category::Outfit);
        outfit.set_frame_group(walking).unwrap();
        assert!(outfit.has_walking_group());
        assert_eq!(outfit.groups().len(), 2);
        assert!(outfit.remove_walking_group().is_some());
        assert_eq!(outfit.groups().len(), 1);
    }

    #[test]
    fn test_from_parts_requires_default() {
        let walking = FrameGroup::new(FrameGroupType::Walking, FrameDimensions::default()).unwrap();
        assert!(ObjectType::from_parts(1, Category::Outfit, Properties::default(), [walking]).is_err());
    }

    #[test]
    fn test_group_limits() {
        let dims = FrameDimensions { width: 2, height: 2, layers: 2, pattern_x: 4, pattern_y: 4, pattern_z: 4, frames: 9 };
        assert!(matches!(
            FrameGroup::new(FrameGroupType::Default, dims),
            Err(Error::CapacityExceeded { .. })
        ));
        let zero = FrameDimensions { frames: 0, ..FrameDimensions::default() };
        assert!(FrameGroup::new(FrameGroupType::Default, zero).is_err());
    }

    #[test]
    fn test_cells() {
        let dims = FrameDimensions { pattern_x: 4, frames: 2, ..FrameDimensions::default() };
        let mut group = FrameGroup::new(FrameGroupType::Default, dims).unwrap();
        group.set_sprite(&FrameCell::pattern(3, 0, 0, 1), 77).unwrap();
        assert_eq!(group.sprite_ids[7], 77);
        assert_eq!(group.sprite_at(&FrameCell::pattern(3, 0, 0, 1)), 77);
        assert_eq!(group.sprite_at(&FrameCell::pattern(4, 0, 0, 0)), 0);
        assert!(group.set_sprite(&FrameCell::pattern(0, 1, 0, 0), 1).is_err());
    }

    #[test]
    fn test_category_names() {
        assert_eq!(Category::from_name("Outfit").unwrap(), Category::Outfit);
        assert!(Category::from_name("tile").is_err());
        assert_eq!(Category::from_u8(4).unwrap(), Category::Missile);
        assert_eq!(Category::Item.min_id(), 100);
    }
}
