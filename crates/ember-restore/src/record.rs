//! Reading one log record from a registered area.
//!
//! A record position is discriminated by its first 32-bit word: inode magic,
//! block magic, erased flash, or garbage. Record lengths claimed by the
//! fixed header are validated against the area bound before the record is
//! accepted; the scanner advances its cursor by exactly the validated size.

use ember_error::{EmberError, Result};
use ember_flash::Flash;
use ember_obj::Area;
use ember_ondisk::{
    DISK_BLOCK_HEADER_SIZE, DISK_INODE_HEADER_SIZE, DiskBlock, DiskInode, RecordKind,
};

/// One parsed log record plus nothing else; the caller supplies its
/// location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DiskObject {
    Inode(DiskInode),
    Block(DiskBlock),
}

impl DiskObject {
    /// Total on-disk size of the record, variable part included.
    pub(crate) fn record_len(&self) -> usize {
        match self {
            Self::Inode(inode) => inode.record_len(),
            Self::Block(block) => block.record_len(),
        }
    }
}

fn parse_failure(area_offset: u32, err: &ember_types::ParseError) -> EmberError {
    EmberError::corrupt(format!("record at area offset {area_offset}: {err}"))
}

/// Read and parse the record at `area_offset` within `area`.
///
/// Errors:
/// - `Empty`: erased flash at the record position (clean end of log).
/// - `Range`: the record or its claimed payload crosses the end of the
///   area (truncated tail; also a clean end of log).
/// - `Corrupt`: a word that is neither a record magic nor erased flash,
///   or a header that does not parse.
/// - `Flash`: the device read itself failed.
pub(crate) fn read_disk_object(
    flash: &dyn Flash,
    area: &Area,
    area_offset: u32,
) -> Result<DiskObject> {
    let mut word = [0_u8; 4];
    area.read(flash, area_offset, &mut word)?;
    let word = u32::from_le_bytes(word);

    match RecordKind::from_word(word) {
        RecordKind::Inode => read_disk_inode(flash, area, area_offset).map(DiskObject::Inode),
        RecordKind::Block => read_disk_block(flash, area, area_offset).map(DiskObject::Block),
        RecordKind::Empty => Err(EmberError::Empty),
        RecordKind::Unknown(word) => Err(EmberError::corrupt(format!(
            "unrecognized record magic {word:#010x} at area offset {area_offset}"
        ))),
    }
}

/// Read an inode record: fixed header first, then the filename bytes the
/// header claims, bounds-checked against the area.
fn read_disk_inode(flash: &dyn Flash, area: &Area, area_offset: u32) -> Result<DiskInode> {
    let mut header = [0_u8; DISK_INODE_HEADER_SIZE];
    area.read(flash, area_offset, &mut header)?;

    let filename_len = u32::from(header[DISK_INODE_HEADER_SIZE - 1]);
    let record_len = DISK_INODE_HEADER_SIZE as u32 + filename_len;
    let end = area_offset
        .checked_add(record_len)
        .ok_or(EmberError::Invalid("record offset overflow"))?;
    if end > area.length {
        return Err(EmberError::Range {
            offset: area_offset,
            len: record_len,
            area_len: area.length,
        });
    }

    let mut record = vec![0_u8; record_len as usize];
    area.read(flash, area_offset, &mut record)?;
    DiskInode::parse(&record).map_err(|err| parse_failure(area_offset, &err))
}

/// Read a block record header. The data bytes stay on flash; only their
/// claimed extent is validated.
fn read_disk_block(flash: &dyn Flash, area: &Area, area_offset: u32) -> Result<DiskBlock> {
    let mut header = [0_u8; DISK_BLOCK_HEADER_SIZE];
    area.read(flash, area_offset, &mut header)?;

    let block = DiskBlock::parse(&header).map_err(|err| parse_failure(area_offset, &err))?;

    let record_len = u32::try_from(block.record_len())
        .map_err(|_| EmberError::Invalid("record length overflow"))?;
    let end = area_offset
        .checked_add(record_len)
        .ok_or(EmberError::Invalid("record offset overflow"))?;
    if end > area.length {
        return Err(EmberError::Range {
            offset: area_offset,
            len: record_len,
            area_len: area.length,
        });
    }

    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_flash::MemFlash;
    use ember_obj::AreaDesc;
    use ember_ondisk::{DISK_AREA_SIZE, DiskArea};
    use ember_types::{AreaId, GcSeq, ObjectId, SeqNum};

    fn test_area(flash_len: u32, area_len: u32) -> (MemFlash, Area) {
        let flash = MemFlash::new(flash_len);
        let area = Area::from_parts(
            AreaDesc::new(0, area_len),
            &DiskArea {
                id: Some(AreaId(0)),
                gc_seq: GcSeq::ZERO,
            },
        );
        (flash, area)
    }

    fn header_offset() -> u32 {
        DISK_AREA_SIZE as u32
    }

    #[test]
    fn erased_flash_reads_as_empty() {
        let (flash, area) = test_area(256, 256);
        assert!(matches!(
            read_disk_object(&flash, &area, header_offset()),
            Err(EmberError::Empty)
        ));
    }

    #[test]
    fn unknown_magic_is_corrupt() {
        let (flash, area) = test_area(256, 256);
        flash
            .write_all_at(ember_types::FlashOffset(header_offset()), &0xDEAD_BEEF_u32.to_le_bytes())
            .expect("seed flash");
        assert!(matches!(
            read_disk_object(&flash, &area, header_offset()),
            Err(EmberError::Corrupt { .. })
        ));
    }

    #[test]
    fn word_read_past_area_end_is_range() {
        let (flash, area) = test_area(256, 14);
        assert!(matches!(
            read_disk_object(&flash, &area, header_offset()),
            Err(EmberError::Range { .. })
        ));
    }

    #[test]
    fn inode_record_round_trip() {
        let (flash, area) = test_area(256, 256);
        let disk = DiskInode {
            id: ObjectId(2),
            seq: SeqNum(1),
            parent_id: Some(ObjectId(1)),
            flags: 0,
            filename: "notes".to_owned(),
        };
        flash
            .write_all_at(ember_types::FlashOffset(header_offset()), &disk.encode())
            .expect("seed flash");

        let object = read_disk_object(&flash, &area, header_offset()).expect("record parses");
        assert_eq!(object, DiskObject::Inode(disk.clone()));
        assert_eq!(object.record_len(), disk.record_len());
    }

    #[test]
    fn inode_with_lying_filename_length_is_range() {
        let (flash, area) = test_area(256, 64);
        let mut record = DiskInode {
            id: ObjectId(2),
            seq: SeqNum(0),
            parent_id: Some(ObjectId(1)),
            flags: 0,
            filename: String::new(),
        }
        .encode();
        // Claim a filename that runs far past the end of the area.
        record[DISK_INODE_HEADER_SIZE - 1] = 200;
        flash
            .write_all_at(ember_types::FlashOffset(header_offset()), &record)
            .expect("seed flash");

        assert!(matches!(
            read_disk_object(&flash, &area, header_offset()),
            Err(EmberError::Range { .. })
        ));
    }

    #[test]
    fn block_record_skips_data_bytes() {
        let (flash, area) = test_area(256, 256);
        let disk = DiskBlock {
            id: ObjectId(3),
            seq: SeqNum(0),
            inode_id: ObjectId(2),
            data_len: 4,
        };
        flash
            .write_all_at(
                ember_types::FlashOffset(header_offset()),
                &disk.encode_with_data(b"abcd"),
            )
            .expect("seed flash");

        let object = read_disk_object(&flash, &area, header_offset()).expect("record parses");
        assert_eq!(object, DiskObject::Block(disk));
        assert_eq!(object.record_len(), DISK_BLOCK_HEADER_SIZE + 4);
    }

    #[test]
    fn block_with_data_past_area_end_is_range() {
        let (flash, area) = test_area(256, 40);
        let disk = DiskBlock {
            id: ObjectId(3),
            seq: SeqNum(0),
            inode_id: ObjectId(2),
            data_len: 512,
        };
        flash
            .write_all_at(ember_types::FlashOffset(header_offset()), &disk.encode_header())
            .expect("seed flash");

        assert!(matches!(
            read_disk_object(&flash, &area, header_offset()),
            Err(EmberError::Range { .. })
        ));
    }
}
