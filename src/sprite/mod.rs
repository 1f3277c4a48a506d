//! Sprite archive: pixel codec, sprite records and the editable store.

mod codec;
mod data;
mod store;

pub use codec::{compress, decompress, ChannelOrder, PIXEL_COUNT, PIXEL_DATA_SIZE, SPRITE_SIZE};
pub use data::Sprite;
pub use store::SpriteStore;
