//! RAM descriptors for flash areas.

use ember_error::{EmberError, Result};
use ember_flash::Flash;
use ember_ondisk::{DISK_AREA_SIZE, DiskArea};
use ember_types::{AreaId, FlashOffset, GcSeq};
use serde::{Deserialize, Serialize};

/// Caller-supplied description of one candidate flash region.
///
/// Descriptor arrays may carry a trailing zero-length entry as an explicit
/// terminator; the mount path stops there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaDesc {
    pub offset: FlashOffset,
    pub length: u32,
}

impl AreaDesc {
    #[must_use]
    pub fn new(offset: u32, length: u32) -> Self {
        Self {
            offset: FlashOffset(offset),
            length,
        }
    }

    /// The zero-length terminator entry.
    #[must_use]
    pub fn sentinel() -> Self {
        Self::new(0, 0)
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.length == 0
    }
}

/// One registered flash area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    /// Absolute flash offset of the area header.
    pub offset: FlashOffset,
    /// Total area length, header included.
    pub length: u32,
    /// `None` marks the scratch area.
    pub id: Option<AreaId>,
    pub gc_seq: GcSeq,
    /// First free byte within the area. After restore this equals the header
    /// size plus the sizes of all valid records scanned.
    pub cur: u32,
}

impl Area {
    /// Register an area from its descriptor and parsed header. The write
    /// cursor starts just past the header; the log scan advances it.
    #[must_use]
    pub fn from_parts(desc: AreaDesc, disk: &DiskArea) -> Self {
        Self {
            offset: desc.offset,
            length: desc.length,
            id: disk.id,
            gc_seq: disk.gc_seq,
            cur: DISK_AREA_SIZE as u32,
        }
    }

    #[must_use]
    pub fn is_scratch(&self) -> bool {
        self.id.is_none()
    }

    /// Bytes left between the write cursor and the end of the area.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.length.saturating_sub(self.cur)
    }

    /// Read `buf.len()` bytes at `area_offset` relative to the area base.
    ///
    /// Fails with `Range` when the read would cross the end of the area;
    /// the log scanner treats that as end-of-log.
    pub fn read(&self, flash: &dyn Flash, area_offset: u32, buf: &mut [u8]) -> Result<()> {
        let len = u32::try_from(buf.len()).map_err(|_| EmberError::Invalid("read length overflow"))?;
        let end = area_offset
            .checked_add(len)
            .ok_or(EmberError::Invalid("area offset overflow"))?;
        if end > self.length {
            return Err(EmberError::Range {
                offset: area_offset,
                len,
                area_len: self.length,
            });
        }

        let abs = self
            .offset
            .checked_add(area_offset)
            .ok_or(EmberError::Invalid("area offset overflow"))?;
        flash.read_exact_at(abs, buf)
    }

    /// Write `buf` at `area_offset` relative to the area base, with the same
    /// bounds rule as [`Area::read`].
    pub fn write(&self, flash: &dyn Flash, area_offset: u32, buf: &[u8]) -> Result<()> {
        let len = u32::try_from(buf.len()).map_err(|_| EmberError::Invalid("write length overflow"))?;
        let end = area_offset
            .checked_add(len)
            .ok_or(EmberError::Invalid("area offset overflow"))?;
        if end > self.length {
            return Err(EmberError::Range {
                offset: area_offset,
                len,
                area_len: self.length,
            });
        }

        let abs = self
            .offset
            .checked_add(area_offset)
            .ok_or(EmberError::Invalid("area offset overflow"))?;
        flash.write_all_at(abs, buf)
    }
}
