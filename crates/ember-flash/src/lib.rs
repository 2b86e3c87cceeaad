#![forbid(unsafe_code)]
//! Flash device abstraction.
//!
//! Provides the `Flash` trait for raw byte-addressed access to a flash
//! device, a RAM-backed `MemFlash` used by tests and simulations, and a
//! file-backed `FileFlash` for flash images on a host filesystem.
//!
//! Reads and writes are synchronous; the mount path owns the device for its
//! duration and needs no further coordination.

use ember_error::{EmberError, Result};
use ember_types::FlashOffset;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use tracing::trace;

/// Erased-flash fill byte.
pub const ERASED_BYTE: u8 = 0xFF;

/// Byte-addressed flash device.
///
/// Offsets are absolute device offsets. Implementations must fail reads and
/// writes that cross the end of the device.
pub trait Flash: Send + Sync {
    /// Total device length in bytes.
    fn len_bytes(&self) -> u32;

    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_exact_at(&self, offset: FlashOffset, buf: &mut [u8]) -> Result<()>;

    /// Write all bytes in `buf` starting at `offset`.
    fn write_all_at(&self, offset: FlashOffset, buf: &[u8]) -> Result<()>;

    /// Erase `len` bytes starting at `offset`, resetting them to `0xFF`.
    fn erase(&self, offset: FlashOffset, len: u32) -> Result<()>;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;
}

fn end_of_range(offset: FlashOffset, len: usize) -> Result<u32> {
    let len = u32::try_from(len).map_err(|_| EmberError::Invalid("transfer length overflow"))?;
    offset
        .checked_add(len)
        .map(|end| end.0)
        .ok_or(EmberError::Invalid("flash offset overflow"))
}

fn out_of_bounds(kind: &str, offset: FlashOffset, len: usize, device_len: u32) -> EmberError {
    EmberError::Flash(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("{kind} of {len} bytes at {offset} exceeds device length {device_len}"),
    ))
}

// ── RAM-backed device ───────────────────────────────────────────────────────

/// In-memory flash device. Fresh devices read as erased flash (all `0xFF`).
pub struct MemFlash {
    bytes: Mutex<Vec<u8>>,
}

impl MemFlash {
    /// Create an erased device of `len` bytes.
    #[must_use]
    pub fn new(len: u32) -> Self {
        Self {
            bytes: Mutex::new(vec![ERASED_BYTE; len as usize]),
        }
    }

    /// Create a device from an existing image.
    #[must_use]
    pub fn from_image(image: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(image),
        }
    }

    /// Snapshot the device contents.
    #[must_use]
    pub fn image(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl Flash for MemFlash {
    fn len_bytes(&self) -> u32 {
        let bytes = self.bytes.lock();
        u32::try_from(bytes.len()).unwrap_or(u32::MAX)
    }

    fn read_exact_at(&self, offset: FlashOffset, buf: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.lock();
        let device_len = bytes.len();
        let end = end_of_range(offset, buf.len())? as usize;
        if end > device_len {
            return Err(out_of_bounds(
                "read",
                offset,
                buf.len(),
                u32::try_from(device_len).unwrap_or(u32::MAX),
            ));
        }
        buf.copy_from_slice(&bytes[offset.0 as usize..end]);
        Ok(())
    }

    fn write_all_at(&self, offset: FlashOffset, buf: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock();
        let device_len = bytes.len();
        let end = end_of_range(offset, buf.len())? as usize;
        if end > device_len {
            return Err(out_of_bounds(
                "write",
                offset,
                buf.len(),
                u32::try_from(device_len).unwrap_or(u32::MAX),
            ));
        }
        bytes[offset.0 as usize..end].copy_from_slice(buf);
        Ok(())
    }

    fn erase(&self, offset: FlashOffset, len: u32) -> Result<()> {
        let mut bytes = self.bytes.lock();
        let device_len = bytes.len();
        let end = end_of_range(offset, len as usize)? as usize;
        if end > device_len {
            return Err(out_of_bounds(
                "erase",
                offset,
                len as usize,
                u32::try_from(device_len).unwrap_or(u32::MAX),
            ));
        }
        trace!(target: "ember::flash", offset = offset.0, len, "erase");
        bytes[offset.0 as usize..end].fill(ERASED_BYTE);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

// ── File-backed device ──────────────────────────────────────────────────────

/// Flash image stored in a host file, accessed with `pread`/`pwrite`
/// semantics.
pub struct FileFlash {
    file: File,
    len: u32,
}

impl FileFlash {
    /// Open an existing flash image read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let len = u32::try_from(len).map_err(|_| EmberError::Invalid("flash image too large"))?;
        Ok(Self { file, len })
    }

    /// Create an erased flash image of `len` bytes, truncating any existing
    /// file at `path`.
    pub fn create(path: impl AsRef<Path>, len: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all_at(&vec![ERASED_BYTE; len as usize], 0)?;
        Ok(Self { file, len })
    }
}

impl Flash for FileFlash {
    fn len_bytes(&self) -> u32 {
        self.len
    }

    fn read_exact_at(&self, offset: FlashOffset, buf: &mut [u8]) -> Result<()> {
        let end = end_of_range(offset, buf.len())?;
        if end > self.len {
            return Err(out_of_bounds("read", offset, buf.len(), self.len));
        }
        self.file.read_exact_at(buf, u64::from(offset.0))?;
        Ok(())
    }

    fn write_all_at(&self, offset: FlashOffset, buf: &[u8]) -> Result<()> {
        let end = end_of_range(offset, buf.len())?;
        if end > self.len {
            return Err(out_of_bounds("write", offset, buf.len(), self.len));
        }
        self.file.write_all_at(buf, u64::from(offset.0))?;
        Ok(())
    }

    fn erase(&self, offset: FlashOffset, len: u32) -> Result<()> {
        let end = end_of_range(offset, len as usize)?;
        if end > self.len {
            return Err(out_of_bounds("erase", offset, len as usize, self.len));
        }
        trace!(target: "ember::flash", offset = offset.0, len, "erase");
        self.file
            .write_all_at(&vec![ERASED_BYTE; len as usize], u64::from(offset.0))?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
