//! C9: `AccessCheck` — orchestrates one instrumented memory access: fetch
//! the shadow cell(s), classify data sharing, compare against history,
//! prune, insert (spec §4.5).
//!
//! This module is deliberately free of registry/runtime-query plumbing —
//! it operates on a [`TaskData`] and [`ShadowMemory`] the caller already
//! has in hand, so the core happens-before/pruning orchestration can be
//! tested without a mock runtime. [`crate::event_handlers::EventHandlers`]
//! is the stateful glue that resolves "current task" via
//! [`crate::runtime::RuntimeQuery`] and calls through to this module.

use crate::access_history::RaceHit;
use crate::config::{DetectorConfig, Granularity};
use crate::record::{InstrPtr, Record, TaskPtr};
use crate::shadow_memory::ShadowMemory;
use crate::task_data::TaskData;

/// Spec §4.5 step 4 / §11.3: `RompLib/include/DataSharing.h`'s
/// `DataSharingType`, classifying an address relative to the accessing
/// task's stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSharing {
    NonThreadPrivate,
    ThreadPrivateBelowExit,
    ThreadPrivateAboveExit,
    Undefined,
}

/// Classify `addr` against the accessing task's stack frame and its
/// thread's recorded stack bounds (spec §4.5 step 4).
pub fn classify_data_sharing(
    addr: u64,
    task_frame: u64,
    stack_base: u64,
    stack_size: u64,
) -> DataSharing {
    let stack_top = stack_base.saturating_add(stack_size);
    if addr < stack_base || addr >= stack_top {
        return DataSharing::NonThreadPrivate;
    }
    if addr < task_frame {
        DataSharing::ThreadPrivateBelowExit
    } else if addr > task_frame {
        DataSharing::ThreadPrivateAboveExit
    } else {
        DataSharing::Undefined
    }
}

/// Result of one `check_access` call: zero or more confirmed races, one
/// per conflicting byte (spec §5: "at most one race per byte", but a
/// single multi-byte access can confirm a different race on each byte it
/// touches).
pub type CheckOutcome = Vec<(u64, RaceHit)>;

/// Spec §4.5 steps 4-7, given that steps 1-3 (global init, task-info
/// lookup, initial-task skip) have already passed and produced `task`.
#[allow(clippy::too_many_arguments)]
pub fn check_access(
    shadow: &ShadowMemory,
    task: &TaskData,
    task_ptr: TaskPtr,
    addr: u64,
    bytes_accessed: u32,
    instr_ptr: InstrPtr,
    has_hardware_lock: bool,
    is_write: bool,
    sharing: DataSharing,
    config: &DetectorConfig,
) -> CheckOutcome {
    if task.in_reduction {
        // Spec §4.7 "Reduction": checks are skipped outright.
        return CheckOutcome::new();
    }
    if !is_write
        && config.filter_thread_private_reads
        && sharing == DataSharing::ThreadPrivateBelowExit
    {
        // Spec §4.5 step 4 / §9 performance note: a read of memory that
        // belongs exclusively to this task's own, not-yet-exited stack
        // frame can never race.
        return CheckOutcome::new();
    }

    let record = Record::new(is_write, task.label.clone(), task.lockset, task_ptr, instr_ptr);
    let step = granularity_step(config.granularity);
    let mut outcome = CheckOutcome::new();

    let mut b = addr;
    let end = addr + bytes_accessed as u64;
    while b < end {
        let cell = shadow.get_or_create(b);
        let mut guard = cell.lock();
        if let Some(hit) = guard.check_and_record(record.clone(), has_hardware_lock) {
            outcome.push((b, hit));
        }
        b += step;
    }
    outcome
}

fn granularity_step(granularity: Granularity) -> u64 {
    match granularity {
        Granularity::Byte => 1,
        Granularity::Word => 4,
        Granularity::LongWord => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label_mutation::{implicit_task_begin, initial_task_label};

    fn task_for(index: u32, width: u32) -> TaskData {
        TaskData::new(implicit_task_begin(&initial_task_label(), index, width))
    }

    #[test]
    fn classify_below_exit_frame() {
        assert_eq!(
            classify_data_sharing(90, 100, 0, 1000),
            DataSharing::ThreadPrivateBelowExit
        );
        assert_eq!(
            classify_data_sharing(900, 100, 0, 1000),
            DataSharing::ThreadPrivateAboveExit
        );
        assert_eq!(
            classify_data_sharing(2000, 100, 0, 1000),
            DataSharing::NonThreadPrivate
        );
    }

    #[test]
    fn sibling_writes_to_heap_address_race() {
        let shadow = ShadowMemory::new(&DetectorConfig::default().with_page_table_bits(4, 4));
        let config = DetectorConfig::default();
        let t0 = task_for(0, 4);
        let t1 = task_for(1, 4);

        let out0 = check_access(
            &shadow,
            &t0,
            1,
            0x5000,
            4,
            0x1000,
            false,
            true,
            DataSharing::NonThreadPrivate,
            &config,
        );
        assert!(out0.is_empty());

        let out1 = check_access(
            &shadow,
            &t1,
            2,
            0x5000,
            4,
            0x1010,
            false,
            true,
            DataSharing::NonThreadPrivate,
            &config,
        );
        assert_eq!(out1.len(), 1);
    }

    #[test]
    fn filtered_thread_private_read_is_skipped() {
        let shadow = ShadowMemory::new(&DetectorConfig::default().with_page_table_bits(4, 4));
        let config = DetectorConfig::default();
        let t0 = task_for(0, 4);
        let out = check_access(
            &shadow,
            &t0,
            1,
            0x6000,
            4,
            0x1000,
            false,
            false,
            DataSharing::ThreadPrivateBelowExit,
            &config,
        );
        assert!(out.is_empty());
        // And the cell was never touched: a later unfiltered write from a
        // sibling does not see this filtered read as history.
        assert!(shadow.get_allocated(0x6000).is_none());
    }

    #[test]
    fn reduction_flag_suppresses_checks() {
        let shadow = ShadowMemory::new(&DetectorConfig::default().with_page_table_bits(4, 4));
        let config = DetectorConfig::default();
        let mut t0 = task_for(0, 4);
        t0.in_reduction = true;
        let out = check_access(
            &shadow,
            &t0,
            1,
            0x7000,
            4,
            0x1000,
            false,
            true,
            DataSharing::NonThreadPrivate,
            &config,
        );
        assert!(out.is_empty());
    }
}
