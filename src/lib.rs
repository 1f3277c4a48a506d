//! # thingpack
//!
//! Reader, writer and incremental compiler for the asset archives of a
//! tile-based game client: the sprite archive (`.spr`), the object-metadata
//! archive (`.dat`) and the single-object blob (`.obd`).
//!
//! ## Modules
//!
//! - [`util`] - Errors and frame-group index arithmetic
//! - [`core`] - Client versions, feature flags, change and compile plumbing
//! - [`archive`] - Addressed record container used by sprite archives
//! - [`sprite`] - Sprite pixel codec and the editable [`SpriteStore`]
//! - [`thing`] - Object data model, flag tables, record codec and [`ObjectStore`]
//! - [`obd`] - Standalone object blobs
//! - [`config`] - Version catalog and persisted settings
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use thingpack::prelude::*;
//!
//! let version = AssetVersion::new(860, "Client 8.60", 0x4C2C7993, 0x4C220594);
//! let mut sprites = SpriteStore::load("Tibia.spr", version.clone(), Features::empty())?;
//! let pixels = sprites.get_pixels(1, ChannelOrder::Rgba)?;
//!
//! sprites.add_sprite(Sprite::from_pixels(0, false, &pixels, ChannelOrder::Rgba)?)?;
//! sprites.save("out.spr", version, Features::empty(), Arc::new(NoProgress))?;
//! sprites.wait_compile()?;
//! ```

pub mod util;
pub mod core;
pub mod archive;
pub mod sprite;
pub mod thing;
pub mod obd;
pub mod config;

// Re-export commonly used types
pub use util::{Error, Result};
pub use sprite::SpriteStore;
pub use thing::ObjectStore;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, FrameDimensions, Result};
    pub use crate::core::{
        AssetVersion, CancelToken, ChangeBatch, ChangeKind, ChangeSink, CompileOutcome, Features,
        MetadataFormat, NoProgress, ProgressEvent, ProgressSink, SaveStatus,
    };
    pub use crate::sprite::{ChannelOrder, Sprite, SpriteStore};
    pub use crate::thing::{Category, FrameGroup, FrameGroupType, ObjectStore, ObjectType};
    pub use crate::obd::{ObdVersion, ObjectBlob};
    pub use crate::config::{Settings, VersionCatalog};
}
