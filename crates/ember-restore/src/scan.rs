//! Area header detection and the append-only log scan.

use crate::RestoreReport;
use crate::merge::merge_object;
use crate::record::read_disk_object;
use ember_error::{EmberError, Result};
use ember_flash::Flash;
use ember_obj::{FsState, ObjLoc};
use ember_ondisk::{DISK_AREA_SIZE, DiskArea};
use ember_types::{AreaIdx, FlashOffset};
use tracing::{trace, warn};

/// Read and parse one area header at an absolute flash offset. Does not
/// touch the area's contents.
///
/// A header that does not parse is `Corrupt` (the caller skips the region);
/// a failed device read is `Flash` (the caller aborts the mount).
pub(crate) fn detect_area(flash: &dyn Flash, offset: FlashOffset) -> Result<DiskArea> {
    let mut buf = [0_u8; DISK_AREA_SIZE];
    flash.read_exact_at(offset, &mut buf)?;
    DiskArea::parse(&buf)
        .map_err(|err| EmberError::corrupt(format!("area header at {offset}: {err}")))
}

/// Walk the record log of a registered area from just past the header,
/// merging every parseable record, until the log ends.
///
/// The log ends cleanly at an erased word or at a record that would cross
/// the end of the area. A garbage word mid-log ends the scan too, keeping
/// the records already merged, unless `strict` is set, in which case it
/// fails the mount. The cursor advances by each record's exact size, so the
/// scan always terminates.
pub(crate) fn scan_area(
    flash: &dyn Flash,
    fs: &mut FsState,
    report: &mut RestoreReport,
    area_idx: AreaIdx,
    strict: bool,
) -> Result<()> {
    fs.area_mut(area_idx)?.cur = DISK_AREA_SIZE as u32;

    loop {
        let area = *fs.area(area_idx)?;
        match read_disk_object(flash, &area, area.cur) {
            Ok(object) => {
                let record_len = u32::try_from(object.record_len())
                    .map_err(|_| EmberError::Invalid("record length overflow"))?;
                merge_object(
                    fs,
                    report,
                    &object,
                    ObjLoc {
                        area: area_idx,
                        offset: area.cur,
                    },
                )?;
                report.records_scanned += 1;

                let area = fs.area_mut(area_idx)?;
                area.cur = area
                    .cur
                    .checked_add(record_len)
                    .ok_or(EmberError::Invalid("area cursor overflow"))?;
            }
            Err(err) if err.is_scan_end() => {
                trace!(
                    target: "ember::restore",
                    area = area_idx.0,
                    cur = area.cur,
                    "log scan reached end of area"
                );
                return Ok(());
            }
            Err(EmberError::Corrupt { detail }) => {
                if strict {
                    return Err(EmberError::Corrupt { detail });
                }
                warn!(
                    target: "ember::restore",
                    area = area_idx.0,
                    cur = area.cur,
                    detail = %detail,
                    "corrupt record treated as end of area log"
                );
                report.corrupt_scan_ends += 1;
                return Ok(());
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_alloc::ObjectPools;
    use ember_obj::{Area, AreaDesc};
    use ember_ondisk::{DiskInode, INODE_F_DIRECTORY, INODE_F_ROOT};
    use ember_types::{AreaId, GcSeq, ObjectId, SeqNum};

    fn fs_with_area(desc: AreaDesc) -> (FsState, AreaIdx) {
        let mut fs = FsState::new(ObjectPools::new(32, 32));
        let idx = fs
            .push_area(Area::from_parts(
                desc,
                &DiskArea {
                    id: Some(AreaId(0)),
                    gc_seq: GcSeq::ZERO,
                },
            ))
            .expect("push area");
        (fs, idx)
    }

    fn root_record() -> Vec<u8> {
        DiskInode {
            id: ObjectId(1),
            seq: SeqNum::ZERO,
            parent_id: None,
            flags: INODE_F_DIRECTORY | INODE_F_ROOT,
            filename: String::new(),
        }
        .encode()
    }

    fn file_record(id: u32, name: &str) -> Vec<u8> {
        DiskInode {
            id: ObjectId(id),
            seq: SeqNum::ZERO,
            parent_id: Some(ObjectId(1)),
            flags: 0,
            filename: name.to_owned(),
        }
        .encode()
    }

    fn seed(flash: &ember_flash::MemFlash, base: u32, records: &[Vec<u8>]) -> u32 {
        let mut off = base + DISK_AREA_SIZE as u32;
        for record in records {
            flash
                .write_all_at(FlashOffset(off), record)
                .expect("seed record");
            off += u32::try_from(record.len()).expect("record length");
        }
        off
    }

    #[test]
    fn detect_area_classifies_header() {
        let flash = ember_flash::MemFlash::new(256);
        assert!(matches!(
            detect_area(&flash, FlashOffset::ZERO),
            Err(EmberError::Corrupt { .. })
        ));

        flash
            .write_all_at(
                FlashOffset::ZERO,
                &DiskArea {
                    id: Some(AreaId(4)),
                    gc_seq: GcSeq(2),
                }
                .encode(),
            )
            .expect("seed header");
        let header = detect_area(&flash, FlashOffset::ZERO).expect("header parses");
        assert_eq!(header.id, Some(AreaId(4)));
        assert_eq!(header.gc_seq, GcSeq(2));
    }

    #[test]
    fn cursor_covers_exactly_the_valid_records() {
        let flash = ember_flash::MemFlash::new(1024);
        let records = vec![root_record(), file_record(2, "a"), file_record(3, "bb")];
        let end = seed(&flash, 0, &records);

        let (mut fs, idx) = fs_with_area(AreaDesc::new(0, 1024));
        let mut report = RestoreReport::default();
        scan_area(&flash, &mut fs, &mut report, idx, false).expect("scan succeeds");

        assert_eq!(fs.area(idx).expect("area").cur, end);
        assert_eq!(report.records_scanned, 3);
        assert_eq!(fs.object_count(), 3);
    }

    #[test]
    fn garbage_word_ends_scan_leniently() {
        let flash = ember_flash::MemFlash::new(1024);
        let end = seed(&flash, 0, &[root_record(), file_record(2, "keep")]);
        flash
            .write_all_at(FlashOffset(end), &0x1234_5678_u32.to_le_bytes())
            .expect("seed garbage");

        let (mut fs, idx) = fs_with_area(AreaDesc::new(0, 1024));
        let mut report = RestoreReport::default();
        scan_area(&flash, &mut fs, &mut report, idx, false).expect("lenient scan succeeds");

        assert_eq!(report.corrupt_scan_ends, 1);
        assert!(fs.find_inode(ObjectId(2)).is_ok());
        assert_eq!(fs.area(idx).expect("area").cur, end);
    }

    #[test]
    fn garbage_word_fails_strict_scan() {
        let flash = ember_flash::MemFlash::new(1024);
        let end = seed(&flash, 0, &[root_record()]);
        flash
            .write_all_at(FlashOffset(end), &0x1234_5678_u32.to_le_bytes())
            .expect("seed garbage");

        let (mut fs, idx) = fs_with_area(AreaDesc::new(0, 1024));
        let mut report = RestoreReport::default();
        let err = scan_area(&flash, &mut fs, &mut report, idx, true).unwrap_err();
        assert!(matches!(err, EmberError::Corrupt { .. }));
    }

    #[test]
    fn merge_corruption_is_fatal_even_when_lenient() {
        let flash = ember_flash::MemFlash::new(1024);
        // Two distinct records with the same (id, seq).
        seed(&flash, 0, &[file_record(2, "a"), file_record(2, "b")]);

        let (mut fs, idx) = fs_with_area(AreaDesc::new(0, 1024));
        let mut report = RestoreReport::default();
        let err = scan_area(&flash, &mut fs, &mut report, idx, false).unwrap_err();
        assert!(matches!(err, EmberError::Corrupt { .. }));
    }
}
