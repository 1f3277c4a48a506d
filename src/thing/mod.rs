//! Object-metadata archive: data model, per-format flag tables, record codec and store.

mod codec;
mod convert;
mod flags;
mod store;
mod types;

pub use codec::{read_object, read_properties, write_object, write_properties, RecordLayout};
pub(crate) use codec::{read_group_header, write_group_header, CursorExt};
pub use convert::to_single_frame_group;
pub use flags::{lookup as lookup_flag, table as flag_table, Attr, LAST_FLAG};
pub use store::{ObjectStore, MAX_OBJECT_ID};
pub use types::{
    Animation, AnimationMode, Category, FrameDuration, FrameGroup, FrameGroupType, Light,
    MarketData, ObjectType, Offset, Properties,
};
