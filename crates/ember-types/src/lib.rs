#![forbid(unsafe_code)]
//! Typed identifiers, on-disk constants, and byte-level parse helpers shared
//! across the EmberFS workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ── On-disk sentinels and limits ────────────────────────────────────────────

/// On-disk "no object" id. In RAM this is expressed as `Option<ObjectId>`.
pub const OBJECT_ID_NONE: u32 = 0xFFFF_FFFF;

/// On-disk "no area" id. An area header carrying this id is the scratch area.
pub const AREA_ID_NONE: u16 = 0xFFFF;

/// Erased-flash pattern. A record position whose first 32 bits read as this
/// value marks the end of an area's log.
pub const EMPTY_WORD: u32 = 0xFFFF_FFFF;

/// Maximum inline filename length in bytes (the on-disk length field is u8).
pub const FILENAME_MAX: usize = 255;

// ── Identifier newtypes ─────────────────────────────────────────────────────

/// Stable id shared by inodes and blocks. Ids are allocated from a single
/// monotonic counter, so no two live objects of any type share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// Decode an on-disk id field, mapping the sentinel to `None`.
    #[must_use]
    pub fn from_disk(raw: u32) -> Option<Self> {
        (raw != OBJECT_ID_NONE).then_some(Self(raw))
    }

    /// Encode an optional id back to its on-disk representation.
    #[must_use]
    pub fn to_disk(id: Option<Self>) -> u32 {
        id.map_or(OBJECT_ID_NONE, |id| id.0)
    }

    /// The id a fresh allocation after this one would receive.
    #[must_use]
    pub fn successor(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Per-object record sequence number. The highest-seq record for a given id
/// is the live revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeqNum(pub u32);

impl SeqNum {
    pub const ZERO: Self = Self(0);
}

/// Index into the registered-area table. RAM-only; never written to flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AreaIdx(pub u16);

/// On-disk area id (the scratch area carries the sentinel instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AreaId(pub u16);

impl AreaId {
    /// Decode an on-disk area id field, mapping the scratch sentinel to `None`.
    #[must_use]
    pub fn from_disk(raw: u16) -> Option<Self> {
        (raw != AREA_ID_NONE).then_some(Self(raw))
    }

    /// Encode an optional area id back to its on-disk representation.
    #[must_use]
    pub fn to_disk(id: Option<Self>) -> u16 {
        id.map_or(AREA_ID_NONE, |id| id.0)
    }
}

/// Absolute byte offset on the flash device.
///
/// This is a unit-carrying wrapper to prevent mixing device-absolute and
/// area-relative offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlashOffset(pub u32);

impl FlashOffset {
    pub const ZERO: Self = Self(0);

    /// Add a byte count, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, bytes: u32) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

/// GC cycle counter for one area. Incremented each time garbage collection
/// promotes a scratch area; breaks ties between duplicated areas after an
/// interrupted GC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GcSeq(pub u32);

impl GcSeq {
    pub const ZERO: Self = Self(0);
}

// ── Parse errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid magic: expected {expected:#x}, got {actual:#x}")]
    InvalidMagic { expected: u32, actual: u32 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

// ── Byte-level readers ──────────────────────────────────────────────────────

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

// ── Display impls ───────────────────────────────────────────────────────────

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AreaIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FlashOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for GcSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_sentinel_round_trip() {
        assert_eq!(ObjectId::from_disk(OBJECT_ID_NONE), None);
        assert_eq!(ObjectId::from_disk(7), Some(ObjectId(7)));
        assert_eq!(ObjectId::to_disk(None), OBJECT_ID_NONE);
        assert_eq!(ObjectId::to_disk(Some(ObjectId(7))), 7);
    }

    #[test]
    fn area_id_sentinel_round_trip() {
        assert_eq!(AreaId::from_disk(AREA_ID_NONE), None);
        assert_eq!(AreaId::from_disk(0), Some(AreaId(0)));
        assert_eq!(AreaId::to_disk(None), AREA_ID_NONE);
        assert_eq!(AreaId::to_disk(Some(AreaId(3))), 3);
    }

    #[test]
    fn successor_saturates_at_max() {
        assert_eq!(ObjectId(5).successor(), ObjectId(6));
        assert_eq!(ObjectId(u32::MAX).successor(), ObjectId(u32::MAX));
    }

    #[test]
    fn ensure_slice_rejects_out_of_bounds() {
        let data = [0_u8; 4];
        assert!(ensure_slice(&data, 0, 4).is_ok());
        assert!(matches!(
            ensure_slice(&data, 2, 3),
            Err(ParseError::InsufficientData { .. })
        ));
        assert!(matches!(
            ensure_slice(&data, usize::MAX, 2),
            Err(ParseError::InvalidField { .. })
        ));
    }

    #[test]
    fn read_le_helpers() {
        let data = [0x45, 0x4D, 0x42, 0x41, 0xFF, 0xFF];
        assert_eq!(read_le_u16(&data, 0).unwrap(), 0x4D45);
        assert_eq!(read_le_u32(&data, 0).unwrap(), 0x4142_4D45);
        assert_eq!(read_fixed::<2>(&data, 4).unwrap(), [0xFF, 0xFF]);
        assert!(read_le_u32(&data, 4).is_err());
    }

    #[test]
    fn flash_offset_checked_add() {
        assert_eq!(
            FlashOffset(10).checked_add(20),
            Some(FlashOffset(30))
        );
        assert_eq!(FlashOffset(u32::MAX).checked_add(1), None);
    }
}
