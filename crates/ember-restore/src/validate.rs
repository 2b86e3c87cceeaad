//! Final mount validation.

use ember_error::{EmberError, Result};
use ember_obj::FsState;
use ember_ondisk::{DISK_AREA_SIZE, DISK_BLOCK_HEADER_SIZE};
use tracing::debug;

/// A mountable filesystem has a scratch area ready for the next GC cycle.
pub(crate) fn validate_scratch(fs: &FsState) -> Result<()> {
    let Some(idx) = fs.scratch_idx() else {
        return Err(EmberError::corrupt("no scratch area registered"));
    };
    let area = fs.area(idx)?;
    if !area.is_scratch() {
        return Err(EmberError::corrupt(format!(
            "area {idx} is registered as scratch but carries a data-area id"
        )));
    }
    Ok(())
}

/// A mountable filesystem has a real root directory.
pub(crate) fn validate_root(fs: &FsState) -> Result<()> {
    match fs.root() {
        Ok(root) if root.is_directory() && !root.is_dummy() => Ok(()),
        Ok(root) => Err(EmberError::corrupt(format!(
            "root object {} is not a restored directory",
            root.id
        ))),
        Err(EmberError::NotFound(id)) => Err(EmberError::corrupt(format!(
            "root directory {id} vanished during sweep"
        ))),
        Err(err) => Err(err),
    }
}

/// Fix the largest permissible block payload from the smallest registered
/// area: a block record must fit entirely within one area.
pub(crate) fn set_max_block_data_len(fs: &mut FsState) -> Result<()> {
    let smallest = fs
        .areas()
        .iter()
        .map(|area| area.length)
        .min()
        .ok_or_else(|| EmberError::corrupt("no areas registered"))?;

    let budget = smallest.saturating_sub((DISK_AREA_SIZE + DISK_BLOCK_HEADER_SIZE) as u32);
    let len = u16::try_from(budget.min(u32::from(u16::MAX)))
        .map_err(|_| EmberError::Invalid("block payload bound overflow"))?;

    fs.set_max_block_data_len(len);
    debug!(
        target: "ember::restore",
        max_block_data_len = len,
        smallest_area = smallest,
        "block payload bound fixed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_alloc::ObjectPools;
    use ember_obj::{Area, AreaDesc, Inode, ObjLoc};
    use ember_ondisk::{DiskArea, DiskInode, INODE_F_DIRECTORY, INODE_F_ROOT};
    use ember_types::{AreaId, AreaIdx, GcSeq, ObjectId, SeqNum};

    fn fs() -> FsState {
        FsState::new(ObjectPools::new(8, 8))
    }

    fn push_area(fs: &mut FsState, offset: u32, length: u32, id: Option<u16>) -> AreaIdx {
        fs.push_area(Area::from_parts(
            AreaDesc::new(offset, length),
            &DiskArea {
                id: id.map(AreaId),
                gc_seq: GcSeq::ZERO,
            },
        ))
        .expect("push area")
    }

    #[test]
    fn scratch_validation() {
        let mut fs = fs();
        assert!(validate_scratch(&fs).is_err());

        let idx = push_area(&mut fs, 0, 512, None);
        fs.set_scratch_idx(Some(idx));
        assert!(validate_scratch(&fs).is_ok());
    }

    #[test]
    fn root_validation() {
        let mut fs = fs();
        assert!(validate_root(&fs).is_err());

        fs.insert_inode(Inode::from_disk(
            &DiskInode {
                id: ObjectId(1),
                seq: SeqNum::ZERO,
                parent_id: None,
                flags: INODE_F_DIRECTORY | INODE_F_ROOT,
                filename: String::new(),
            },
            ObjLoc {
                area: AreaIdx(0),
                offset: 12,
            },
        ))
        .expect("insert root");
        fs.set_root_id(Some(ObjectId(1)));
        assert!(validate_root(&fs).is_ok());
    }

    #[test]
    fn block_payload_bound_follows_smallest_area() {
        let mut fs = fs();
        push_area(&mut fs, 0, 4096, Some(0));
        push_area(&mut fs, 4096, 512, None);

        set_max_block_data_len(&mut fs).expect("bound fixed");
        assert_eq!(
            u32::from(fs.max_block_data_len()),
            512 - (DISK_AREA_SIZE + DISK_BLOCK_HEADER_SIZE) as u32
        );
    }

    #[test]
    fn block_payload_bound_saturates_at_u16() {
        let mut fs = fs();
        push_area(&mut fs, 0, 1_000_000, Some(0));
        set_max_block_data_len(&mut fs).expect("bound fixed");
        assert_eq!(fs.max_block_data_len(), u16::MAX);
    }
}
