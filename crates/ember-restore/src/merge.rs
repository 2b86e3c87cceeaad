//! Merging disk records into the in-RAM graph.
//!
//! Records arrive in log order, which is not graph order: a child may be
//! logged before its parent, a block before its owner inode. Unresolved
//! references get a placeholder (dummy) inode in the index; the defining
//! record, whenever it arrives, overwrites the placeholder in place and
//! inherits the edges accumulated on it. Placeholders that are never
//! resolved are garbage and fall to the sweep.
//!
//! Between two records with the same id, the higher sequence number wins.
//! Two distinct records carrying the same (id, seq) are corruption, with
//! one exception: re-reading the exact record an object was restored from
//! (same area, same offset) is a no-op, which is what the GC-crash recovery
//! path does when it re-scans the surviving area.

use crate::RestoreReport;
use crate::record::DiskObject;
use ember_error::{EmberError, Result};
use ember_obj::{Block, FsState, Inode, ObjLoc};
use ember_ondisk::{DiskBlock, DiskInode};
use tracing::{debug, trace};

/// Merge one parsed record at `loc` into the graph.
pub(crate) fn merge_object(
    fs: &mut FsState,
    report: &mut RestoreReport,
    object: &DiskObject,
    loc: ObjLoc,
) -> Result<()> {
    match object {
        DiskObject::Inode(disk) => merge_inode(fs, report, disk, loc),
        DiskObject::Block(disk) => merge_block(fs, report, disk, loc),
    }
}

/// Whether `disk` supersedes the in-RAM `existing` inode.
fn inode_gets_replaced(existing: &Inode, disk: &DiskInode, loc: ObjLoc) -> Result<bool> {
    debug_assert_eq!(existing.id, disk.id);

    if existing.is_dummy() {
        return Ok(true);
    }
    if existing.seq < disk.seq {
        return Ok(true);
    }
    if existing.seq == disk.seq {
        if existing.loc == Some(loc) {
            // Re-read of the record this inode was restored from.
            return Ok(false);
        }
        return Err(EmberError::corrupt(format!(
            "two inode records for object {} carry sequence {}",
            disk.id, disk.seq
        )));
    }
    Ok(false)
}

fn merge_inode(
    fs: &mut FsState,
    report: &mut RestoreReport,
    disk: &DiskInode,
    loc: ObjLoc,
) -> Result<()> {
    let accepted = match fs.find_inode(disk.id) {
        Ok(existing) => {
            let replace = inode_gets_replaced(existing, disk, loc)?;
            if replace {
                fs.remove_child(disk.id)?;
                fs.find_inode_mut(disk.id)?.overwrite_from_disk(disk, loc);
                trace!(
                    target: "ember::restore",
                    id = disk.id.0,
                    seq = disk.seq.0,
                    "inode record superseded in-ram object"
                );
            } else {
                report.stale_records += 1;
            }
            replace
        }
        Err(EmberError::NotFound(_)) => {
            fs.insert_inode(Inode::from_disk(disk, loc))?;
            true
        }
        Err(err) => return Err(err),
    };

    if accepted {
        report.inodes_restored += 1;

        if let Some(parent_id) = disk.parent_id {
            if parent_id == disk.id {
                return Err(EmberError::corrupt(format!(
                    "inode {} names itself as parent",
                    disk.id
                )));
            }
            match fs.find_inode(parent_id) {
                Ok(_) => {}
                Err(EmberError::NotFound(_)) => {
                    fs.insert_inode(Inode::new_dummy(parent_id, true))?;
                    report.dummies_created += 1;
                    debug!(
                        target: "ember::restore",
                        parent = parent_id.0,
                        child = disk.id.0,
                        "placeholder directory created for unresolved parent"
                    );
                }
                Err(err) => return Err(err),
            }
            fs.add_child(parent_id, disk.id)?;
        }

        if disk.is_root() {
            fs.set_root_id(Some(disk.id));
        }
    }

    fs.observe_id(disk.id);
    Ok(())
}

/// Whether `disk` supersedes the in-RAM `existing` block.
fn block_gets_replaced(existing: &Block, disk: &DiskBlock, loc: ObjLoc) -> Result<bool> {
    debug_assert_eq!(existing.id, disk.id);

    if existing.is_dummy() {
        return Ok(true);
    }
    if existing.seq < disk.seq {
        return Ok(true);
    }
    if existing.seq == disk.seq {
        if existing.loc == Some(loc) {
            return Ok(false);
        }
        return Err(EmberError::corrupt(format!(
            "two block records for object {} carry sequence {}",
            disk.id, disk.seq
        )));
    }
    Ok(false)
}

fn merge_block(
    fs: &mut FsState,
    report: &mut RestoreReport,
    disk: &DiskBlock,
    loc: ObjLoc,
) -> Result<()> {
    match fs.find_block(disk.id) {
        Ok(existing) => {
            let replace = block_gets_replaced(existing, disk, loc)?;
            if replace {
                // A block is rewritten in place across revisions; its owner
                // is part of its identity and must not drift.
                if existing.owner != Some(disk.inode_id) {
                    return Err(EmberError::corrupt(format!(
                        "block {} changed owner from {:?} to {}",
                        disk.id, existing.owner, disk.inode_id
                    )));
                }
                fs.find_block_mut(disk.id)?.overwrite_from_disk(disk, loc);
                report.blocks_restored += 1;
            } else {
                report.stale_records += 1;
            }
        }
        Err(EmberError::NotFound(_)) => {
            fs.insert_block(Block::from_disk(disk, loc))?;
            report.blocks_restored += 1;

            match fs.find_inode(disk.inode_id) {
                Ok(_) => {}
                Err(EmberError::NotFound(_)) => {
                    fs.insert_inode(Inode::new_dummy(disk.inode_id, false))?;
                    report.dummies_created += 1;
                    debug!(
                        target: "ember::restore",
                        owner = disk.inode_id.0,
                        block = disk.id.0,
                        "placeholder inode created for unresolved block owner"
                    );
                }
                Err(err) => return Err(err),
            }
            fs.link_block(disk.inode_id, disk.id)?;
        }
        Err(err) => return Err(err),
    }

    fs.observe_id(disk.id);
    Ok(())
}
