//! The post-restore sweep.
//!
//! After every area has been scanned (and any GC recovery has run), the
//! index still holds objects that lost the sequence arbitration, deletion
//! markers, and placeholders that were never resolved. The sweep removes
//! them all, plus anything they were holding up: a block whose owner goes,
//! goes too; a subtree under a removed directory goes with it. Removal runs
//! to fixpoint, so the survivors form a closed graph rooted at the root
//! directory.

use crate::RestoreReport;
use ember_error::Result;
use ember_obj::{Block, FsState, Inode, Object};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
enum Kind {
    Inode,
    Block,
}

fn inode_is_trash(fs: &FsState, inode: &Inode) -> bool {
    if inode.is_deleted() || inode.is_dummy() {
        return true;
    }
    if fs.root_id() == Some(inode.id) {
        return false;
    }
    match inode.parent {
        Some(parent) => !matches!(fs.get(parent), Some(Object::Inode(_))),
        None => true,
    }
}

fn block_is_trash(fs: &FsState, block: &Block) -> bool {
    if block.is_deleted() || block.is_dummy() {
        return true;
    }
    match block.owner {
        Some(owner) => !matches!(fs.get(owner), Some(Object::Inode(_))),
        None => true,
    }
}

/// Remove every deleted, placeholder, and orphaned object from the index.
pub(crate) fn sweep(fs: &mut FsState, report: &mut RestoreReport) -> Result<()> {
    loop {
        let mut removed = 0_u64;

        for id in fs.object_ids() {
            let kind = match fs.get(id) {
                Some(Object::Inode(inode)) if inode_is_trash(fs, inode) => Kind::Inode,
                Some(Object::Block(block)) if block_is_trash(fs, block) => Kind::Block,
                _ => continue,
            };
            match kind {
                Kind::Inode => fs.delete_inode(id)?,
                Kind::Block => fs.delete_block(id)?,
            }
            removed += 1;
        }

        report.swept_objects += removed;
        if removed == 0 {
            break;
        }
    }

    debug!(
        target: "ember::restore",
        swept = report.swept_objects,
        live = fs.object_count(),
        "sweep complete"
    );
    Ok(())
}
