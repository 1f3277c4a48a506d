//! Run-length sprite pixel codec.
//!
//! A compressed sprite is a sequence of chunks: `u16` transparent-run length,
//! `u16` coloured-run length, then the coloured pixels as R,G,B (plus A when
//! alpha is kept). A pixel is transparent when its alpha is 0. A trailing
//! transparent run is implied, so an all-transparent sprite compresses to
//! nothing.

use crate::util::{Error, Result};

/// Sprite edge length in pixels.
pub const SPRITE_SIZE: usize = 32;
/// Pixels per sprite.
pub const PIXEL_COUNT: usize = SPRITE_SIZE * SPRITE_SIZE;
/// Bytes in an uncompressed 4-channel sprite buffer.
pub const PIXEL_DATA_SIZE: usize = PIXEL_COUNT * 4;

/// Channel order of an uncompressed pixel buffer. Alpha is always last.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChannelOrder {
    #[default]
    Rgba,
    Bgra,
}

impl ChannelOrder {
    #[inline]
    fn to_rgb(self, px: &[u8; 4]) -> [u8; 3] {
        match self {
            Self::Rgba => [px[0], px[1], px[2]],
            Self::Bgra => [px[2], px[1], px[0]],
        }
    }

    #[inline]
    fn from_rgba(self, r: u8, g: u8, b: u8, a: u8) -> [u8; 4] {
        match self {
            Self::Rgba => [r, g, b, a],
            Self::Bgra => [b, g, r, a],
        }
    }
}

/// Compress a 32x32 pixel buffer.
///
/// With `keep_alpha` false the alpha of coloured pixels is dropped.
pub fn compress(pixels: &[u8], order: ChannelOrder, keep_alpha: bool) -> Result<Vec<u8>> {
    if pixels.len() != PIXEL_DATA_SIZE {
        return Err(Error::invalid(format!(
            "sprite buffer must be {} bytes, got {}",
            PIXEL_DATA_SIZE,
            pixels.len()
        )));
    }

    let px: &[[u8; 4]] = bytemuck::cast_slice(pixels);
    let bpp = if keep_alpha { 4 } else { 3 };
    let mut out = Vec::new();
    let mut i = 0;

    while i < PIXEL_COUNT {
        let run_start = i;
        while i < PIXEL_COUNT && px[i][3] == 0 {
            i += 1;
        }
        if i == PIXEL_COUNT {
            break;
        }
        let transparent = i - run_start;

        let colored_start = i;
        while i < PIXEL_COUNT && px[i][3] != 0 {
            i += 1;
        }
        let colored = &px[colored_start..i];

        out.reserve(4 + colored.len() * bpp);
        out.extend_from_slice(&(transparent as u16).to_le_bytes());
        out.extend_from_slice(&(colored.len() as u16).to_le_bytes());
        for p in colored {
            out.extend_from_slice(&order.to_rgb(p));
            if keep_alpha {
                out.push(p[3]);
            }
        }
    }

    Ok(out)
}

/// Expand a compressed sprite into a 32x32 pixel buffer.
///
/// Coloured pixels get alpha 0xFF when `has_alpha` is false; untouched
/// pixels stay fully transparent black.
pub fn decompress(data: &[u8], order: ChannelOrder, has_alpha: bool) -> Result<Vec<u8>> {
    let mut out = vec![0u8; PIXEL_DATA_SIZE];
    let bpp = if has_alpha { 4 } else { 3 };
    let mut pos = 0;
    let mut pixel = 0;

    while pos < data.len() {
        if pos + 4 > data.len() {
            return Err(Error::invalid(format!("sprite chunk header truncated at byte {}", pos)));
        }
        let transparent = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
        let colored = u16::from_le_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;

        pixel += transparent;
        if pixel + colored > PIXEL_COUNT {
            return Err(Error::invalid(format!(
                "sprite runs cover {} pixels, more than {}",
                pixel + colored,
                PIXEL_COUNT
            )));
        }

        let end = pos + colored * bpp;
        if end > data.len() {
            return Err(Error::invalid(format!("sprite colour run truncated at byte {}", data.len())));
        }

        for src in data[pos..end].chunks_exact(bpp) {
            let a = if has_alpha { src[3] } else { 0xFF };
            let dst = pixel * 4;
            out[dst..dst + 4].copy_from_slice(&order.from_rgba(src[0], src[1], src[2], a));
            pixel += 1;
        }
        pos = end;
    }

    Ok(out)
}
