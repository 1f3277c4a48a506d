//! Frame-group conversions.

use super::types::{Animation, AnimationMode, Category, FrameDuration, FrameGroup, FrameGroupType, ObjectType};
use crate::util::{Error, FrameCell, FrameDimensions, Result};

/// Fold an outfit's walking group into its default group.
///
/// With an animated walking group the result has `walking.frames + 1` frames:
/// frame 0 is the default group's first frame, the rest are the walking
/// frames. A static walking group is dropped. Objects with a single group
/// are returned unchanged.
pub fn to_single_frame_group(object: &ObjectType) -> Result<ObjectType> {
    let Some(walking) = object.frame_group(FrameGroupType::Walking) else {
        return Ok(object.clone());
    };
    let idle = object.default_group();

    let mut single = object.clone();
    single.remove_walking_group();
    if !walking.is_animated() {
        return Ok(single);
    }

    let frames = walking.frames.checked_add(1).ok_or(Error::CapacityExceeded {
        what: "frames per frame group",
        limit: u64::from(u8::MAX),
    })?;
    let dims = FrameDimensions { frames, ..idle.dimensions() };
    let mut group = FrameGroup::new(FrameGroupType::Default, dims)?;
    group.exact_size = idle.exact_size;

    for cell in dims.cells() {
        let id = if cell.frame == 0 {
            idle.sprite_at(&cell)
        } else {
            walking.sprite_at(&FrameCell { frame: cell.frame - 1, ..cell })
        };
        group.set_sprite(&cell, id)?;
    }

    group.animation = Some(merged_animation(object.category(), idle, walking, frames));
    single.set_frame_group(group)?;
    Ok(single)
}

fn merged_animation(category: Category, idle: &FrameGroup, walking: &FrameGroup, frames: u8) -> Animation {
    let fallback = FrameDuration::fixed(category.default_duration());
    let first = idle
        .animation
        .as_ref()
        .and_then(|a| a.durations.first().copied())
        .unwrap_or(fallback);

    let mut durations = Vec::with_capacity(frames as usize);
    durations.push(first);
    match &walking.animation {
        Some(animation) => durations.extend(animation.durations.iter().copied()),
        None => durations.extend(std::iter::repeat(fallback).take(walking.frames as usize)),
    }

    Animation {
        mode: walking.animation.as_ref().map_or(AnimationMode::Asynchronous, |a| a.mode),
        loop_count: walking.animation.as_ref().map_or(0, |a| a.loop_count),
        start_frame: 0,
        durations,
    }
}
