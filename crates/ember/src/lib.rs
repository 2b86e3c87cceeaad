#![forbid(unsafe_code)]
//! EmberFS public API facade.
//!
//! Re-exports the mount surface through a stable external interface. This
//! is the crate downstream consumers depend on.

pub use ember_error::{EmberError, Result};
pub use ember_flash::{FileFlash, Flash, MemFlash};
pub use ember_obj::{
    Area, AreaDesc, Block, BlockFlags, FsState, GraphSummary, Inode, InodeFlags, ObjLoc, Object,
    ObjectSummary,
};
pub use ember_restore::{
    ROOT_INODE_ID, RestoreConfig, RestoreReport, format, format_area, restore,
};
