//! Addressed archive constants.
//!
//! Layout: `u32 signature`, record count (`u16`, or `u32` when extended),
//! then one `u32` absolute address per record (id 1 first). Address 0 marks
//! an empty record. Each non-empty record is the colour key, a `u16` payload
//! length and the payload.

/// Size of the signature field.
pub const SIGNATURE_SIZE: u64 = 4;

/// Bytes preceding every record payload: colour key plus `u16` length.
pub const RECORD_PREFIX_SIZE: u64 = 5;

/// Colour-key bytes written before each record.
pub const COLOR_KEY: [u8; 3] = [0xFF, 0x00, 0xFF];

/// Size of one address-table slot.
pub const ADDRESS_SIZE: u64 = 4;

/// Largest record count a compact (16-bit) header can carry.
pub const MAX_COMPACT_COUNT: u32 = u16::MAX as u32;

/// Largest payload a record length field can describe.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Header size (signature plus count) for the given width.
#[inline]
pub const fn header_size(extended: bool) -> u64 {
    if extended {
        SIGNATURE_SIZE + 4
    } else {
        SIGNATURE_SIZE + 2
    }
}

/// Position of the address slot for a 1-based record id.
#[inline]
pub const fn address_slot(id: u32, extended: bool) -> u64 {
    header_size(extended) + (id as u64 - 1) * ADDRESS_SIZE
}

/// Largest record count for the given width.
#[inline]
pub const fn max_count(extended: bool) -> u32 {
    if extended {
        u32::MAX
    } else {
        MAX_COMPACT_COUNT
    }
}
