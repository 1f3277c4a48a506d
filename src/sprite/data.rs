//! A single sprite record.

use std::borrow::Cow;
use std::sync::OnceLock;

use super::codec::{self, ChannelOrder, PIXEL_DATA_SIZE};
use crate::util::Result;

/// A 32x32 sprite held in compressed form.
///
/// Pixels are decoded lazily and cached as RGBA. Equality compares id,
/// transparency and compressed bytes.
#[derive(Clone, Debug)]
pub struct Sprite {
    id: u32,
    transparent: bool,
    compressed: Vec<u8>,
    pixels: OnceLock<Vec<u8>>,
}

impl Sprite {
    /// An empty (fully transparent) sprite.
    pub fn empty(id: u32, transparent: bool) -> Self {
        Self::from_compressed(id, transparent, Vec::new())
    }

    /// Wrap already-compressed bytes. They are validated on first pixel access.
    pub fn from_compressed(id: u32, transparent: bool, compressed: Vec<u8>) -> Self {
        Self {
            id,
            transparent,
            compressed,
            pixels: OnceLock::new(),
        }
    }

    /// Compress a 4096-byte pixel buffer.
    pub fn from_pixels(id: u32, transparent: bool, pixels: &[u8], order: ChannelOrder) -> Result<Self> {
        let compressed = codec::compress(pixels, order, transparent)?;
        Ok(Self::from_compressed(id, transparent, compressed))
    }

    /// Same sprite under another id.
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether the compressed bytes carry an alpha channel.
    #[inline]
    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    /// True when no pixel is visible.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.compressed.is_empty()
    }

    #[inline]
    pub fn compressed(&self) -> &[u8] {
        &self.compressed
    }

    /// Decoded RGBA pixels (4096 bytes).
    pub fn pixels(&self) -> Result<&[u8]> {
        if let Some(pixels) = self.pixels.get() {
            return Ok(pixels);
        }
        let decoded = codec::decompress(&self.compressed, ChannelOrder::Rgba, self.transparent)?;
        Ok(self.pixels.get_or_init(|| decoded))
    }

    /// Decoded pixels in the requested channel order.
    pub fn pixels_in(&self, order: ChannelOrder) -> Result<Vec<u8>> {
        match order {
            ChannelOrder::Rgba => Ok(self.pixels()?.to_vec()),
            ChannelOrder::Bgra => codec::decompress(&self.compressed, order, self.transparent),
        }
    }

    /// Replace the pixels; the sprite is recompressed at its current transparency.
    pub fn set_pixels(&mut self, pixels: &[u8], order: ChannelOrder) -> Result<()> {
        self.compressed = codec::compress(pixels, order, self.transparent)?;
        self.pixels = OnceLock::new();
        Ok(())
    }

    /// Switch transparency, re-encoding the compressed bytes.
    pub fn set_transparent(&mut self, transparent: bool) -> Result<()> {
        if transparent != self.transparent {
            self.compressed = self.encoded_for(transparent)?.into_owned();
            self.transparent = transparent;
            self.pixels = OnceLock::new();
        }
        Ok(())
    }

    /// Compressed bytes as they must be stored in an archive with the given transparency.
    pub(crate) fn encoded_for(&self, transparent: bool) -> Result<Cow<'_, [u8]>> {
        if transparent == self.transparent || self.compressed.is_empty() {
            return Ok(Cow::Borrowed(&self.compressed));
        }
        let pixels = self.pixels()?;
        debug_assert_eq!(pixels.len(), PIXEL_DATA_SIZE);
        Ok(Cow::Owned(codec::compress(pixels, ChannelOrder::Rgba, transparent)?))
    }
}

impl PartialEq for Sprite {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.transparent == other.transparent && self.compressed == other.compressed
    }
}

impl Eq for Sprite {}
