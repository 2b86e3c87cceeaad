#![forbid(unsafe_code)]
//! The EmberFS restore/mount pipeline.
//!
//! Restore is the one-shot process that turns raw flash into an in-RAM
//! filesystem ready for client use. It runs once per mount, in a single
//! logical flow with exclusive access to the state it builds:
//!
//! 1. Each candidate flash region's header is read and classified as a data
//!    area, the scratch area, or unreadable.
//! 2. Accepted areas join the area table; data areas get their record logs
//!    scanned immediately, records merging into the object graph under
//!    sequence-number arbitration.
//! 3. If no scratch area was found, the device lost power mid-GC; the
//!    recoverer locates the duplicated area pair, salvages the surviving
//!    twin, and re-creates the scratch area.
//! 4. The sweep removes deletion markers, placeholders, and orphans.
//! 5. Validation refuses the mount unless a scratch area and a real root
//!    directory exist.
//!
//! On success the caller receives the [`FsState`] handle and a
//! [`RestoreReport`]; on any fatal error nothing is observable and the
//! device is exactly as it was (GC recovery's scratch reformat aside).
//!
//! Restoring the same image always produces the same graph, whatever order
//! the caller lists the areas in: arbitration by sequence number makes the
//! merge order-independent.

mod format;
mod merge;
mod record;
mod recover;
mod scan;
mod sweep;
mod validate;

pub use format::{ROOT_INODE_ID, format, format_area};

use ember_alloc::ObjectPools;
use ember_error::{EmberError, Result};
use ember_flash::Flash;
use ember_obj::{Area, AreaDesc, FsState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Mount-time knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Most in-RAM inode records the mount may allocate, placeholders
    /// included.
    pub inode_pool_capacity: usize,
    /// Most in-RAM block records the mount may allocate.
    pub block_pool_capacity: usize,
    /// Fail the mount on a corrupt mid-log record instead of treating it as
    /// that area's end of log. A diagnostic mode; leave off for normal
    /// mounts.
    pub strict_scan: bool,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            inode_pool_capacity: 1024,
            block_pool_capacity: 4096,
            strict_scan: false,
        }
    }
}

/// What one restore run did, as counters. Serializes to a JSON evidence
/// line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Headers that parsed as area headers.
    pub areas_detected: u32,
    /// Regions skipped: unreadable header, or a second scratch area.
    pub areas_skipped: u32,
    /// Areas that joined the area table.
    pub areas_registered: u32,
    /// Records handed to the reconstructor, GC-recovery re-scan included.
    pub records_scanned: u64,
    /// Inode records accepted (installed fresh or superseding).
    pub inodes_restored: u64,
    /// Block records accepted.
    pub blocks_restored: u64,
    /// Records discarded for losing the sequence arbitration.
    pub stale_records: u64,
    /// Placeholder inodes created for forward references.
    pub dummies_created: u64,
    /// Areas whose log ended at a corrupt record rather than erased flash.
    pub corrupt_scan_ends: u32,
    /// Whether the interrupted-GC recovery path ran.
    pub gc_recovery: bool,
    /// Objects removed by the sweep.
    pub swept_objects: u64,
}

impl RestoreReport {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Search the supplied regions for a filesystem and reconstruct it.
///
/// `area_descs` may end with a zero-length terminator entry; scanning stops
/// there. Returns the filesystem handle and the run's counters, or:
///
/// - [`EmberError::Corrupt`]: no mountable filesystem among the regions.
///   The caller may [`format()`] and mount again.
/// - [`EmberError::Flash`] / [`EmberError::OutOfMemory`]: the device or
///   this device's RAM budget failed; nothing was mounted.
pub fn restore(
    flash: &dyn Flash,
    area_descs: &[AreaDesc],
    config: &RestoreConfig,
) -> Result<(FsState, RestoreReport)> {
    let mut fs = FsState::new(ObjectPools::new(
        config.inode_pool_capacity,
        config.block_pool_capacity,
    ));
    let mut report = RestoreReport::default();

    match restore_into(flash, &mut fs, &mut report, area_descs, config) {
        Ok(()) => {
            info!(
                target: "ember::restore",
                areas = report.areas_registered,
                objects = fs.object_count(),
                records = report.records_scanned,
                swept = report.swept_objects,
                gc_recovery = report.gc_recovery,
                "filesystem restored"
            );
            Ok((fs, report))
        }
        Err(err) => {
            fs.reset();
            warn!(target: "ember::restore", error = %err, "restore failed; state reset");
            Err(err)
        }
    }
}

fn restore_into(
    flash: &dyn Flash,
    fs: &mut FsState,
    report: &mut RestoreReport,
    area_descs: &[AreaDesc],
    config: &RestoreConfig,
) -> Result<()> {
    for desc in area_descs {
        if desc.is_sentinel() {
            break;
        }

        let disk_area = match scan::detect_area(flash, desc.offset) {
            Ok(disk_area) => disk_area,
            Err(EmberError::Corrupt { detail }) => {
                debug!(
                    target: "ember::restore",
                    offset = desc.offset.0,
                    detail = %detail,
                    "region skipped"
                );
                report.areas_skipped += 1;
                continue;
            }
            Err(err) => return Err(err),
        };
        report.areas_detected += 1;

        if disk_area.is_scratch() && fs.scratch_idx().is_some() {
            // At most one scratch area; a second one is dropped silently.
            warn!(
                target: "ember::restore",
                offset = desc.offset.0,
                "extra scratch area dropped"
            );
            report.areas_skipped += 1;
            continue;
        }

        let idx = fs.push_area(Area::from_parts(*desc, &disk_area))?;
        report.areas_registered += 1;

        if disk_area.is_scratch() {
            fs.set_scratch_idx(Some(idx));
        } else {
            scan::scan_area(flash, fs, report, idx, config.strict_scan)?;
        }
    }

    if fs.scratch_idx().is_none() {
        recover::recover_corrupt_flash(flash, fs, report, config.strict_scan)?;
    }

    validate::validate_scratch(fs)?;
    sweep::sweep(fs, report)?;
    validate::validate_root(fs)?;
    validate::set_max_block_data_len(fs)?;

    Ok(())
}
