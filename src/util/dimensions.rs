//! Frame-group index arithmetic.
//!
//! A frame group stores its sprite ids as one flat table. The table is a
//! mixed-radix array over seven axes, with width varying fastest and frame
//! slowest:
//!
//! ```text
//! index = ((((((f * pz + z) * py + y) * px + x) * layers + l) * height + h) * width + w
//! ```
//!
//! The same ordering is used on disk, so every reader, writer and
//! conversion must go through these functions.

/// Hard limit on the number of sprites a single frame group may reference.
pub const MAX_FRAME_GROUP_SPRITES: usize = 4096;

/// One cell of a frame group: a sprite-cell position plus its pattern coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrameCell {
    pub w: u8,
    pub h: u8,
    pub layer: u8,
    pub x: u8,
    pub y: u8,
    pub z: u8,
    pub frame: u8,
}

impl FrameCell {
    /// Cell at the given pattern coordinates with `w = h = layer = 0`.
    pub fn pattern(x: u8, y: u8, z: u8, frame: u8) -> Self {
        Self { x, y, z, frame, ..Self::default() }
    }
}

/// Declared dimensions of a frame group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameDimensions {
    pub width: u8,
    pub height: u8,
    pub layers: u8,
    pub pattern_x: u8,
    pub pattern_y: u8,
    pub pattern_z: u8,
    pub frames: u8,
}

impl Default for FrameDimensions {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            layers: 1,
            pattern_x: 1,
            pattern_y: 1,
            pattern_z: 1,
            frames: 1,
        }
    }
}

impl FrameDimensions {
    /// Number of entries in the sprite table (product of all seven axes).
    pub fn total_sprites(&self) -> usize {
        self.total_textures() * self.width as usize * self.height as usize
    }

    /// Number of composite textures (all axes except width and height).
    pub fn total_textures(&self) -> usize {
        self.layers as usize
            * self.pattern_x as usize
            * self.pattern_y as usize
            * self.pattern_z as usize
            * self.frames as usize
    }

    /// Check that no axis is zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.layers > 0
            && self.pattern_x > 0
            && self.pattern_y > 0
            && self.pattern_z > 0
            && self.frames > 0
    }

    /// Check whether a cell lies inside these dimensions.
    pub fn contains(&self, cell: &FrameCell) -> bool {
        cell.w < self.width
            && cell.h < self.height
            && cell.layer < self.layers
            && cell.x < self.pattern_x
            && cell.y < self.pattern_y
            && cell.z < self.pattern_z
            && cell.frame < self.frames
    }

    /// Flat offset of a cell in the sprite table.
    ///
    /// `frame` wraps modulo the frame count; every other coordinate must be in range.
    #[inline]
    pub fn sprite_index(&self, cell: &FrameCell) -> usize {
        debug_assert!(cell.w < self.width && cell.h < self.height);
        (self.texture_index(cell) * self.height as usize + cell.h as usize)
            * self.width as usize
            + cell.w as usize
    }

    /// [`sprite_index`](Self::sprite_index), or `None` when the cell lies outside.
    pub fn checked_sprite_index(&self, cell: &FrameCell) -> Option<usize> {
        self.contains(cell).then(|| self.sprite_index(cell))
    }

    /// [`texture_index`](Self::texture_index), or `None` when a pattern or layer
    /// coordinate lies outside. `w`, `h` and `frame` are not checked.
    pub fn checked_texture_index(&self, cell: &FrameCell) -> Option<usize> {
        let inside = cell.layer < self.layers
            && cell.x < self.pattern_x
            && cell.y < self.pattern_y
            && cell.z < self.pattern_z
            && self.frames > 0;
        inside.then(|| self.texture_index(cell))
    }

    /// Flat offset of a cell's composite texture, ignoring `w` and `h`.
    #[inline]
    pub fn texture_index(&self, cell: &FrameCell) -> usize {
        debug_assert!(cell.layer < self.layers && cell.x < self.pattern_x);
        debug_assert!(cell.y < self.pattern_y && cell.z < self.pattern_z);
        let frame = cell.frame as usize % self.frames.max(1) as usize;
        (((frame * self.pattern_z as usize + cell.z as usize) * self.pattern_y as usize
            + cell.y as usize)
            * self.pattern_x as usize
            + cell.x as usize)
            * self.layers as usize
            + cell.layer as usize
    }

    /// Iterate every cell in on-disk order (width fastest, frame slowest).
    pub fn cells(&self) -> impl Iterator<Item = FrameCell> + '_ {
        let d = *self;
        (0..d.frames).flat_map(move |frame| {
            (0..d.pattern_z).flat_map(move |z| {
                (0..d.pattern_y).flat_map(move |y| {
                    (0..d.pattern_x).flat_map(move |x| {
                        (0..d.layers).flat_map(move |layer| {
                            (0..d.height).flat_map(move |h| {
                                (0..d.width).map(move |w| FrameCell { w, h, layer, x, y, z, frame })
                            })
                        })
                    })
                })
            })
        })
    }
}

impl std::fmt::Display for FrameDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}x{} l{} p{}x{}x{} f{}]",
            self.width, self.height, self.layers, self.pattern_x, self.pattern_y, self.pattern_z, self.frames
        )
    }
}
