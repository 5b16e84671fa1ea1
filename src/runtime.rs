//! The narrow boundary between this crate and the out-of-scope
//! runtime-tool interface (spec §1 "out of scope: ... the runtime-tool
//! interface that delivers task lifecycle callbacks and provides
//! task/parallel/thread/frame queries", spec §6 "Runtime queries").
//!
//! Grounded on `RompLib/include/QueryFuncs.h` and `CoreUtil.h`'s
//! `AllTaskInfo`/`CheckInfo` structs, which define the same query shape
//! against the OMPT API. This module only defines the *query* direction
//! (core calls out); the *callback* direction (runtime calls in) is
//! `forkrace::event_handlers::EventHandlers`'s public methods, which a
//! binding layer outside this crate would register as OMPT callbacks.

use crate::record::TaskPtr;

/// Spec §6 `getTaskInfo(ancestorLevel)`'s task type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Initial,
    Implicit,
    Explicit,
    Target,
}

/// Spec §6 `getTaskInfo(ancestorLevel) -> (type, threadNum, task_data_ptr,
/// task_frame, parallel_data_ptr)`.
#[derive(Debug, Clone, Copy)]
pub struct TaskInfo {
    pub kind: TaskKind,
    pub thread_num: u32,
    pub task_ptr: TaskPtr,
    pub task_frame: u64,
    pub parallel_ptr: u64,
}

/// Spec §6 `getParallelInfo(ancestorLevel) -> (teamSize, parallel_data_ptr)`.
#[derive(Debug, Clone, Copy)]
pub struct ParallelInfo {
    pub team_size: u32,
    pub parallel_ptr: u64,
}

/// Spec §6 `getThreadData()`'s return value, opaque to the runtime.
pub type ThreadDataHandle = u64;

/// Spec §6 "Runtime queries" — the calls this crate makes *out* to the
/// collaborating runtime-tool interface. `ancestor_level` follows OMPT
/// convention: `0` is the calling task/region itself, `1` its immediate
/// parent, and so on.
pub trait RuntimeQuery {
    fn task_info(&self, ancestor_level: u32) -> Option<TaskInfo>;
    fn parallel_info(&self, ancestor_level: u32) -> Option<ParallelInfo>;
    fn thread_data(&self) -> Option<ThreadDataHandle>;
    /// Spec §6 `getThreadStackInfo() -> (base, size)`.
    fn thread_stack_info(&self) -> Option<(u64, u64)>;
    /// Spec §6 `getTaskMemoryInfo() -> (base, size)`.
    fn task_memory_info(&self) -> Option<(u64, u64)>;
}
