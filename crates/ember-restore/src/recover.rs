//! Recovery from a garbage collection interrupted by power loss.
//!
//! At rest the filesystem always has exactly one scratch area. GC moves
//! survivors from a data area into the scratch area, promotes the scratch
//! (giving it the data area's id and a higher GC sequence), then reformats
//! the old data area as the new scratch. A crash between the promote and
//! the reformat leaves no scratch and two areas sharing an id.
//!
//! The twin with the higher GC sequence is the promoted, complete copy; the
//! other is mid-erase and untrustworthy. Everything restored from the bad
//! twin is flagged as a placeholder, the good twin is scanned again to
//! restore real content, and the bad twin is reformatted as the new scratch
//! area. Records that existed only in the bad twin are unrecoverable and
//! fall to the sweep; the bad twin was already being destroyed when power
//! was lost.

use crate::RestoreReport;
use crate::format::format_area;
use crate::scan::scan_area;
use ember_error::{EmberError, Result};
use ember_flash::Flash;
use ember_obj::{AreaDesc, FsState};
use ember_ondisk::DISK_AREA_SIZE;
use ember_types::{AreaIdx, GcSeq};
use tracing::{info, warn};

/// Diagnose and repair the missing-scratch condition. Any error here is
/// fatal to the mount.
pub(crate) fn recover_corrupt_flash(
    flash: &dyn Flash,
    fs: &mut FsState,
    report: &mut RestoreReport,
    strict: bool,
) -> Result<()> {
    let (good_idx, bad_idx) = find_corrupt_twin(fs)?;
    report.gc_recovery = true;

    let flagged = fs.flag_area_content_dummy(bad_idx);
    warn!(
        target: "ember::restore",
        good = good_idx.0,
        bad = bad_idx.0,
        suspect_objects = flagged,
        "no scratch area; recovering from interrupted garbage collection"
    );

    scan_area(flash, fs, report, good_idx, strict)?;

    let bad = *fs.area(bad_idx)?;
    format_area(
        flash,
        AreaDesc {
            offset: bad.offset,
            length: bad.length,
        },
        None,
        GcSeq::ZERO,
    )?;

    let bad = fs.area_mut(bad_idx)?;
    bad.id = None;
    bad.gc_seq = GcSeq::ZERO;
    bad.cur = DISK_AREA_SIZE as u32;
    fs.set_scratch_idx(Some(bad_idx));

    info!(
        target: "ember::restore",
        scratch = bad_idx.0,
        "interrupted gc repaired; scratch area re-created"
    );
    Ok(())
}

/// Find the twin pair left behind by the interrupted GC: two areas sharing
/// an id. The higher GC sequence is the good copy. No pair, or a tied
/// sequence, means the flash is unrecoverable.
fn find_corrupt_twin(fs: &FsState) -> Result<(AreaIdx, AreaIdx)> {
    let areas = fs.areas();
    for (i, first) in areas.iter().enumerate() {
        let Some(id) = first.id else { continue };
        for (j, second) in areas.iter().enumerate().skip(i + 1) {
            if second.id != Some(id) {
                continue;
            }
            if first.gc_seq == second.gc_seq {
                return Err(EmberError::corrupt(format!(
                    "areas {i} and {j} share id {id} and gc sequence {}",
                    first.gc_seq
                )));
            }
            let (good, bad) = if first.gc_seq > second.gc_seq {
                (i, j)
            } else {
                (j, i)
            };
            let good =
                u16::try_from(good).map_err(|_| EmberError::Invalid("area index overflow"))?;
            let bad = u16::try_from(bad).map_err(|_| EmberError::Invalid("area index overflow"))?;
            return Ok((AreaIdx(good), AreaIdx(bad)));
        }
    }
    Err(EmberError::corrupt(
        "no scratch area and no duplicated area id; filesystem is unrecoverable",
    ))
}
