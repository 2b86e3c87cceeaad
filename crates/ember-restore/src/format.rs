//! Area formatting.
//!
//! `format_area` erases one flash region and stamps a fresh header on it;
//! the GC-crash recoverer uses it to re-create the scratch area. `format`
//! builds a whole empty filesystem, which is the remedy when restore
//! reports that no mountable filesystem is present.

use ember_error::{EmberError, Result};
use ember_flash::Flash;
use ember_obj::AreaDesc;
use ember_ondisk::{DISK_AREA_SIZE, DiskArea, DiskInode, INODE_F_DIRECTORY, INODE_F_ROOT};
use ember_types::{AreaId, GcSeq, ObjectId, SeqNum};
use tracing::info;

/// Id the root directory record is created with. Restore does not depend on
/// it; the root is recognized by its record flags.
pub const ROOT_INODE_ID: ObjectId = ObjectId(1);

/// Erase the region described by `desc` and write a fresh area header.
/// `id == None` makes it the scratch area.
pub fn format_area(
    flash: &dyn Flash,
    desc: AreaDesc,
    id: Option<AreaId>,
    gc_seq: GcSeq,
) -> Result<DiskArea> {
    if (desc.length as usize) < DISK_AREA_SIZE {
        return Err(EmberError::Invalid("area too small for its header"));
    }

    flash.erase(desc.offset, desc.length)?;
    let header = DiskArea { id, gc_seq };
    flash.write_all_at(desc.offset, &header.encode())?;
    Ok(header)
}

/// Build an empty filesystem across `area_descs`: every region becomes a
/// data area except the last, which becomes the scratch area, and an empty
/// root directory record is written to the first data area.
pub fn format(flash: &dyn Flash, area_descs: &[AreaDesc]) -> Result<()> {
    let descs: Vec<AreaDesc> = area_descs
        .iter()
        .take_while(|desc| !desc.is_sentinel())
        .copied()
        .collect();

    if descs.len() < 2 {
        return Err(EmberError::Invalid(
            "format needs at least one data area and one scratch area",
        ));
    }

    let root = DiskInode {
        id: ROOT_INODE_ID,
        seq: SeqNum::ZERO,
        parent_id: None,
        flags: INODE_F_DIRECTORY | INODE_F_ROOT,
        filename: String::new(),
    };
    let root_record = root.encode();
    if (descs[0].length as usize) < DISK_AREA_SIZE + root_record.len() {
        return Err(EmberError::Invalid(
            "first area too small for the root directory record",
        ));
    }

    let scratch = descs.len() - 1;
    for (idx, desc) in descs.iter().enumerate() {
        let id = if idx == scratch {
            None
        } else {
            let id =
                u16::try_from(idx).map_err(|_| EmberError::Invalid("too many areas to format"))?;
            Some(AreaId(id))
        };
        format_area(flash, *desc, id, GcSeq::ZERO)?;
    }

    let root_offset = descs[0]
        .offset
        .checked_add(DISK_AREA_SIZE as u32)
        .ok_or(EmberError::Invalid("area offset overflow"))?;
    flash.write_all_at(root_offset, &root_record)?;
    flash.sync()?;

    info!(
        target: "ember::format",
        areas = descs.len(),
        "formatted empty filesystem"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_flash::MemFlash;
    use ember_types::FlashOffset;

    #[test]
    fn format_area_erases_and_stamps_header() {
        let flash = MemFlash::new(256);
        flash
            .write_all_at(FlashOffset(40), &[0xAB; 8])
            .expect("dirty the region");

        let header = format_area(
            &flash,
            AreaDesc::new(0, 256),
            Some(AreaId(3)),
            GcSeq(7),
        )
        .expect("format area");
        assert_eq!(header.id, Some(AreaId(3)));

        let mut buf = [0_u8; DISK_AREA_SIZE];
        flash
            .read_exact_at(FlashOffset::ZERO, &mut buf)
            .expect("read header");
        let parsed = DiskArea::parse(&buf).expect("header parses");
        assert_eq!(parsed.id, Some(AreaId(3)));
        assert_eq!(parsed.gc_seq, GcSeq(7));

        let mut rest = [0_u8; 8];
        flash
            .read_exact_at(FlashOffset(40), &mut rest)
            .expect("read body");
        assert!(rest.iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn format_area_rejects_undersized_region() {
        let flash = MemFlash::new(64);
        assert!(matches!(
            format_area(&flash, AreaDesc::new(0, 4), None, GcSeq::ZERO),
            Err(EmberError::Invalid(_))
        ));
    }

    #[test]
    fn format_requires_two_areas() {
        let flash = MemFlash::new(1024);
        assert!(matches!(
            format(&flash, &[AreaDesc::new(0, 1024)]),
            Err(EmberError::Invalid(_))
        ));
    }

    #[test]
    fn format_lays_out_data_then_scratch() {
        let flash = MemFlash::new(2048);
        let descs = [AreaDesc::new(0, 1024), AreaDesc::new(1024, 1024)];
        format(&flash, &descs).expect("format succeeds");

        let mut buf = [0_u8; DISK_AREA_SIZE];
        flash
            .read_exact_at(FlashOffset::ZERO, &mut buf)
            .expect("read first header");
        assert_eq!(DiskArea::parse(&buf).expect("parses").id, Some(AreaId(0)));

        flash
            .read_exact_at(FlashOffset(1024), &mut buf)
            .expect("read second header");
        assert!(DiskArea::parse(&buf).expect("parses").is_scratch());

        let mut record = vec![0_u8; 18];
        flash
            .read_exact_at(FlashOffset(DISK_AREA_SIZE as u32), &mut record)
            .expect("read root record");
        let root = DiskInode::parse(&record).expect("root parses");
        assert!(root.is_root());
        assert_eq!(root.id, ROOT_INODE_ID);
    }
}
