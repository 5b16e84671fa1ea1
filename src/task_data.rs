//! Task- and parallel-region-scoped state (spec §3 "TaskData", §4.7,
//! §9 "Cycles through parent <-> child task pointers").
//!
//! Grounded on `RompLib/include/TaskData.h`'s `TaskData` struct plus
//! `DataSharing.h`'s parallel-region bookkeeping. Spec §9 requires that
//! the parent own its explicit children without the children strongly
//! owning the parent back; `childExplicitTasks` here is a `Vec` of the
//! stable [`crate::record::TaskPtr`] identifier the runtime hands back
//! through `task_create`, not a reference or pointer, so there is no
//! cycle to break.

use crate::label::Label;
use crate::lockset::Lockset;
use crate::record::TaskPtr;

/// Per-task state the core owns for the lifetime of one task (spec §3
/// "TaskData (owned by runtime-tool interface)"). The runtime-tool
/// interface is told to treat this as an opaque blob; only this crate
/// interprets its fields.
#[derive(Debug, Clone)]
pub struct TaskData {
    pub label: Label,
    pub lockset: Lockset,
    /// Spec §4.7 "Reduction": while set, data-race checks for this task
    /// are skipped.
    pub in_reduction: bool,
    /// Stable identifiers of explicit children created by this task,
    /// still outstanding (spec §9).
    pub child_explicit_tasks: Vec<TaskPtr>,
}

impl TaskData {
    pub fn new(label: Label) -> Self {
        TaskData {
            label,
            lockset: Lockset::new(),
            in_reduction: false,
            child_explicit_tasks: Vec::new(),
        }
    }

    pub fn register_child(&mut self, child: TaskPtr) {
        self.child_explicit_tasks.push(child);
    }

    pub fn retire_child(&mut self, child: TaskPtr) {
        self.child_explicit_tasks.retain(|&c| c != child);
    }
}

/// Spec §4.7 "Parallel begin": `ParRegionData(numThreads, flags)`,
/// attached to the runtime-provided parallel-region slot for the
/// duration of the region.
#[derive(Debug, Clone, Copy)]
pub struct ParallelRegionData {
    pub num_threads: u32,
    pub flags: u32,
}

impl ParallelRegionData {
    pub fn new(num_threads: u32, flags: u32) -> Self {
        ParallelRegionData { num_threads, flags }
    }
}
