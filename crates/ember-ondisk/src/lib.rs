#![forbid(unsafe_code)]
//! On-disk format parsing and encoding for EmberFS.
//!
//! Pure codec crate: no I/O, no side effects. Parses byte slices into typed
//! structures for area headers, inode records, and data block records, and
//! encodes them back for the formatter and for test image construction.
//!
//! All integers are little-endian. An area is a fixed-size header followed by
//! an append-only record log; the first erased word (`0xFFFF_FFFF`) at a
//! record position marks the end of the log.

use ember_types::{
    AreaId, FILENAME_MAX, GcSeq, ObjectId, ParseError, SeqNum, ensure_slice, read_le_u16,
    read_le_u32,
};
use serde::{Deserialize, Serialize};

// ── Magics and sizes ────────────────────────────────────────────────────────

/// Area header magic. "EMBA" in little-endian payload.
pub const AREA_MAGIC: u32 = 0x4142_4D45;

/// Inode record magic. "EMBI" in little-endian payload.
pub const INODE_MAGIC: u32 = 0x4942_4D45;

/// Data block record magic. "EMBB" in little-endian payload.
pub const BLOCK_MAGIC: u32 = 0x4242_4D45;

/// Area header format version.
pub const AREA_VERSION: u16 = 1;

/// Size of the on-disk area header.
pub const DISK_AREA_SIZE: usize = 12;

/// Fixed size of an inode record before the filename bytes.
pub const DISK_INODE_HEADER_SIZE: usize = 18;

/// Fixed size of a block record before the data bytes.
pub const DISK_BLOCK_HEADER_SIZE: usize = 18;

/// Largest possible record: an inode record with a maximum-length filename.
pub const MAX_RECORD_LEN: usize = DISK_INODE_HEADER_SIZE + FILENAME_MAX;

// ── On-disk inode flags ─────────────────────────────────────────────────────

/// The record is a deletion marker for its id.
pub const INODE_F_DELETED: u8 = 0x01;
/// The inode is a directory.
pub const INODE_F_DIRECTORY: u8 = 0x02;
/// The inode is the distinguished root directory.
pub const INODE_F_ROOT: u8 = 0x04;

// ── Record discrimination ───────────────────────────────────────────────────

/// Classification of the 32-bit word at a record position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Inode,
    Block,
    /// Erased flash; end of this area's log.
    Empty,
    /// Neither a record magic nor erased flash.
    Unknown(u32),
}

impl RecordKind {
    #[must_use]
    pub fn from_word(word: u32) -> Self {
        match word {
            INODE_MAGIC => Self::Inode,
            BLOCK_MAGIC => Self::Block,
            ember_types::EMPTY_WORD => Self::Empty,
            other => Self::Unknown(other),
        }
    }
}

// ── Area header ─────────────────────────────────────────────────────────────

/// On-disk area header.
///
/// Layout: magic u32 | version u16 | area id u16 | gc seq u32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskArea {
    /// `None` marks the scratch area.
    pub id: Option<AreaId>,
    pub gc_seq: GcSeq,
}

impl DiskArea {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        let magic = read_le_u32(buf, 0)?;
        if magic != AREA_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: AREA_MAGIC,
                actual: magic,
            });
        }

        let version = read_le_u16(buf, 4)?;
        if version != AREA_VERSION {
            return Err(ParseError::InvalidField {
                field: "area_version",
                reason: "unknown version",
            });
        }

        Ok(Self {
            id: AreaId::from_disk(read_le_u16(buf, 6)?),
            gc_seq: GcSeq(read_le_u32(buf, 8)?),
        })
    }

    #[must_use]
    pub fn encode(&self) -> [u8; DISK_AREA_SIZE] {
        let mut out = [0_u8; DISK_AREA_SIZE];
        out[0..4].copy_from_slice(&AREA_MAGIC.to_le_bytes());
        out[4..6].copy_from_slice(&AREA_VERSION.to_le_bytes());
        out[6..8].copy_from_slice(&AreaId::to_disk(self.id).to_le_bytes());
        out[8..12].copy_from_slice(&self.gc_seq.0.to_le_bytes());
        out
    }

    #[must_use]
    pub fn is_scratch(&self) -> bool {
        self.id.is_none()
    }
}

// ── Inode record ────────────────────────────────────────────────────────────

/// On-disk inode record.
///
/// Layout: magic u32 | id u32 | seq u32 | parent id u32 | flags u8 |
/// filename length u8 | filename bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInode {
    pub id: ObjectId,
    pub seq: SeqNum,
    pub parent_id: Option<ObjectId>,
    pub flags: u8,
    pub filename: String,
}

impl DiskInode {
    /// Parse a full inode record (fixed header plus filename bytes) from the
    /// front of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        let magic = read_le_u32(buf, 0)?;
        if magic != INODE_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: INODE_MAGIC,
                actual: magic,
            });
        }

        let id = read_le_u32(buf, 4)?;
        let Some(id) = ObjectId::from_disk(id) else {
            return Err(ParseError::InvalidField {
                field: "inode_id",
                reason: "id is the none sentinel",
            });
        };

        let seq = SeqNum(read_le_u32(buf, 8)?);
        let parent_id = ObjectId::from_disk(read_le_u32(buf, 12)?);

        // Flag bits beyond the ones this crate names belong to layers above
        // the mount path; they are preserved, not validated.
        let flags = ensure_slice(buf, 16, 1)?[0];

        let filename_len = usize::from(ensure_slice(buf, 17, 1)?[0]);
        let name_bytes = ensure_slice(buf, DISK_INODE_HEADER_SIZE, filename_len)?;
        let filename =
            String::from_utf8(name_bytes.to_vec()).map_err(|_| ParseError::InvalidField {
                field: "filename",
                reason: "not valid utf-8",
            })?;

        Ok(Self {
            id,
            seq,
            parent_id,
            flags,
            filename,
        })
    }

    /// Total on-disk size of this record.
    #[must_use]
    pub fn record_len(&self) -> usize {
        DISK_INODE_HEADER_SIZE + self.filename.len()
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.filename.len() <= FILENAME_MAX);
        let mut out = Vec::with_capacity(self.record_len());
        out.extend_from_slice(&INODE_MAGIC.to_le_bytes());
        out.extend_from_slice(&self.id.0.to_le_bytes());
        out.extend_from_slice(&self.seq.0.to_le_bytes());
        out.extend_from_slice(&ObjectId::to_disk(self.parent_id).to_le_bytes());
        out.push(self.flags);
        out.push(u8::try_from(self.filename.len()).unwrap_or(u8::MAX));
        out.extend_from_slice(self.filename.as_bytes());
        out
    }

    /// True for the distinguished root directory record.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.flags & INODE_F_ROOT != 0 && self.parent_id.is_none()
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.flags & INODE_F_DIRECTORY != 0
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.flags & INODE_F_DELETED != 0
    }
}

// ── Block record ────────────────────────────────────────────────────────────

/// On-disk data block record.
///
/// Layout: magic u32 | id u32 | seq u32 | owner inode id u32 | data length
/// u16 | data bytes. The data bytes stay on flash; parsing touches only the
/// fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskBlock {
    pub id: ObjectId,
    pub seq: SeqNum,
    pub inode_id: ObjectId,
    pub data_len: u16,
}

impl DiskBlock {
    /// Parse a block record header from the front of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        let magic = read_le_u32(buf, 0)?;
        if magic != BLOCK_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: BLOCK_MAGIC,
                actual: magic,
            });
        }

        let id = read_le_u32(buf, 4)?;
        let Some(id) = ObjectId::from_disk(id) else {
            return Err(ParseError::InvalidField {
                field: "block_id",
                reason: "id is the none sentinel",
            });
        };

        let seq = SeqNum(read_le_u32(buf, 8)?);

        let inode_id = read_le_u32(buf, 12)?;
        let Some(inode_id) = ObjectId::from_disk(inode_id) else {
            return Err(ParseError::InvalidField {
                field: "block_inode_id",
                reason: "a block must name its owner inode",
            });
        };

        Ok(Self {
            id,
            seq,
            inode_id,
            data_len: read_le_u16(buf, 16)?,
        })
    }

    /// Total on-disk size of this record, data included.
    #[must_use]
    pub fn record_len(&self) -> usize {
        DISK_BLOCK_HEADER_SIZE + usize::from(self.data_len)
    }

    #[must_use]
    pub fn encode_header(&self) -> [u8; DISK_BLOCK_HEADER_SIZE] {
        let mut out = [0_u8; DISK_BLOCK_HEADER_SIZE];
        out[0..4].copy_from_slice(&BLOCK_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&self.id.0.to_le_bytes());
        out[8..12].copy_from_slice(&self.seq.0.to_le_bytes());
        out[12..16].copy_from_slice(&self.inode_id.0.to_le_bytes());
        out[16..18].copy_from_slice(&self.data_len.to_le_bytes());
        out
    }

    /// Encode the full record: header followed by `data`.
    ///
    /// `data.len()` must equal `data_len`.
    #[must_use]
    pub fn encode_with_data(&self, data: &[u8]) -> Vec<u8> {
        debug_assert_eq!(data.len(), usize::from(self.data_len));
        let mut out = Vec::with_capacity(self.record_len());
        out.extend_from_slice(&self.encode_header());
        out.extend_from_slice(data);
        out
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_discrimination() {
        assert_eq!(RecordKind::from_word(INODE_MAGIC), RecordKind::Inode);
        assert_eq!(RecordKind::from_word(BLOCK_MAGIC), RecordKind::Block);
        assert_eq!(RecordKind::from_word(0xFFFF_FFFF), RecordKind::Empty);
        assert_eq!(
            RecordKind::from_word(0xDEAD_BEEF),
            RecordKind::Unknown(0xDEAD_BEEF)
        );
    }

    #[test]
    fn magics_are_mutually_distinct() {
        assert_ne!(AREA_MAGIC, INODE_MAGIC);
        assert_ne!(AREA_MAGIC, BLOCK_MAGIC);
        assert_ne!(INODE_MAGIC, BLOCK_MAGIC);
        assert_ne!(AREA_MAGIC, ember_types::EMPTY_WORD);
        assert_ne!(INODE_MAGIC, ember_types::EMPTY_WORD);
        assert_ne!(BLOCK_MAGIC, ember_types::EMPTY_WORD);
    }

    #[test]
    fn disk_area_round_trip() {
        let area = DiskArea {
            id: Some(AreaId(2)),
            gc_seq: GcSeq(9),
        };
        let bytes = area.encode();
        assert_eq!(bytes.len(), DISK_AREA_SIZE);
        assert_eq!(DiskArea::parse(&bytes).unwrap(), area);
        assert!(!area.is_scratch());

        let scratch = DiskArea {
            id: None,
            gc_seq: GcSeq::ZERO,
        };
        let parsed = DiskArea::parse(&scratch.encode()).unwrap();
        assert!(parsed.is_scratch());
    }

    #[test]
    fn disk_area_rejects_bad_magic_and_version() {
        let mut bytes = DiskArea {
            id: Some(AreaId(0)),
            gc_seq: GcSeq::ZERO,
        }
        .encode();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            DiskArea::parse(&bytes),
            Err(ParseError::InvalidMagic { .. })
        ));

        let mut bytes = DiskArea {
            id: Some(AreaId(0)),
            gc_seq: GcSeq::ZERO,
        }
        .encode();
        bytes[4] = 0x7F;
        assert!(matches!(
            DiskArea::parse(&bytes),
            Err(ParseError::InvalidField { .. })
        ));
    }

    #[test]
    fn disk_inode_round_trip() {
        let inode = DiskInode {
            id: ObjectId(2),
            seq: SeqNum(1),
            parent_id: Some(ObjectId(1)),
            flags: INODE_F_DIRECTORY,
            filename: "logs".to_owned(),
        };
        let bytes = inode.encode();
        assert_eq!(bytes.len(), DISK_INODE_HEADER_SIZE + 4);
        assert_eq!(DiskInode::parse(&bytes).unwrap(), inode);
    }

    #[test]
    fn disk_inode_root_detection() {
        let root = DiskInode {
            id: ObjectId(1),
            seq: SeqNum::ZERO,
            parent_id: None,
            flags: INODE_F_DIRECTORY | INODE_F_ROOT,
            filename: String::new(),
        };
        assert!(root.is_root());

        // A parented record never claims root, whatever its flags say.
        let parented = DiskInode {
            parent_id: Some(ObjectId(1)),
            ..root.clone()
        };
        assert!(!parented.is_root());

        let plain_dir = DiskInode {
            flags: INODE_F_DIRECTORY,
            ..root
        };
        assert!(!plain_dir.is_root());
    }

    #[test]
    fn disk_inode_rejects_truncated_filename() {
        let inode = DiskInode {
            id: ObjectId(5),
            seq: SeqNum::ZERO,
            parent_id: Some(ObjectId(1)),
            flags: 0,
            filename: "config.txt".to_owned(),
        };
        let bytes = inode.encode();
        assert!(matches!(
            DiskInode::parse(&bytes[..bytes.len() - 3]),
            Err(ParseError::InsufficientData { .. })
        ));
    }

    #[test]
    fn disk_inode_rejects_invalid_utf8() {
        let mut bytes = DiskInode {
            id: ObjectId(5),
            seq: SeqNum::ZERO,
            parent_id: Some(ObjectId(1)),
            flags: 0,
            filename: "ab".to_owned(),
        }
        .encode();
        bytes[DISK_INODE_HEADER_SIZE] = 0xFF;
        assert!(matches!(
            DiskInode::parse(&bytes),
            Err(ParseError::InvalidField {
                field: "filename",
                ..
            })
        ));
    }

    #[test]
    fn disk_inode_preserves_unknown_flag_bits() {
        let mut bytes = DiskInode {
            id: ObjectId(5),
            seq: SeqNum::ZERO,
            parent_id: Some(ObjectId(1)),
            flags: 0,
            filename: String::new(),
        }
        .encode();
        bytes[16] = 0x80 | INODE_F_DIRECTORY;
        let parsed = DiskInode::parse(&bytes).expect("unknown flag bits parse");
        assert_eq!(parsed.flags, 0x80 | INODE_F_DIRECTORY);
        assert!(parsed.is_directory());
    }

    #[test]
    fn disk_inode_rejects_none_id() {
        let mut bytes = DiskInode {
            id: ObjectId(5),
            seq: SeqNum::ZERO,
            parent_id: None,
            flags: 0,
            filename: String::new(),
        }
        .encode();
        bytes[4..8].copy_from_slice(&ember_types::OBJECT_ID_NONE.to_le_bytes());
        assert!(matches!(
            DiskInode::parse(&bytes),
            Err(ParseError::InvalidField { field: "inode_id", .. })
        ));
    }

    #[test]
    fn disk_block_round_trip_header_only() {
        let block = DiskBlock {
            id: ObjectId(3),
            seq: SeqNum(0),
            inode_id: ObjectId(2),
            data_len: 4,
        };
        let bytes = block.encode_with_data(b"abcd");
        assert_eq!(bytes.len(), DISK_BLOCK_HEADER_SIZE + 4);

        // Parsing needs only the header; data bytes stay on flash.
        let parsed = DiskBlock::parse(&bytes[..DISK_BLOCK_HEADER_SIZE]).unwrap();
        assert_eq!(parsed, block);
        assert_eq!(parsed.record_len(), bytes.len());
    }

    #[test]
    fn disk_block_requires_owner() {
        let mut bytes = DiskBlock {
            id: ObjectId(3),
            seq: SeqNum(0),
            inode_id: ObjectId(2),
            data_len: 0,
        }
        .encode_header();
        bytes[12..16].copy_from_slice(&ember_types::OBJECT_ID_NONE.to_le_bytes());
        assert!(matches!(
            DiskBlock::parse(&bytes),
            Err(ParseError::InvalidField {
                field: "block_inode_id",
                ..
            })
        ));
    }
}
