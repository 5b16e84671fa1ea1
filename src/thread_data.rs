//! Per-OS-thread state (spec §4.7 "Thread begin/end", §9 "Coroutine-style
//! task lifecycle": task identity travels with [`crate::task_data::TaskData`],
//! never with thread-local storage, but the *thread's own* stack bounds
//! and recycling bookkeeping are legitimately thread-local).

/// State the core keeps per OS thread, from its `thread_begin` callback
/// until `thread_end` (spec §4.7, §5 "Resource lifecycle").
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadData {
    pub stack_base: u64,
    pub stack_size: u64,
    /// Lowest address this thread has touched since its current task last
    /// scheduled out (spec §4.7 "Task schedule").
    pub lowest_accessed_addr: u64,
    /// Stack frame pointer at the boundary below which memory belongs to
    /// the now-completed task (spec §4.7 "Task schedule").
    pub active_task_exit_frame: u64,
}

impl ThreadData {
    pub fn new(stack_base: u64, stack_size: u64) -> Self {
        ThreadData {
            stack_base,
            stack_size,
            lowest_accessed_addr: stack_base,
            active_task_exit_frame: stack_base,
        }
    }

    /// Widen the recycling range to cover a freshly observed access
    /// address, so the next task-schedule event recycles everything this
    /// thread touched.
    pub fn observe_access(&mut self, addr: u64) {
        if addr < self.lowest_accessed_addr {
            self.lowest_accessed_addr = addr;
        }
    }

    /// Reset the recycling range after acting on it (spec §4.7 "Task
    /// schedule" recycles `[lowestAccessedAddr, activeTaskExitFrame]`,
    /// after which tracking starts over for the next task).
    pub fn reset_range(&mut self, new_exit_frame: u64) {
        self.lowest_accessed_addr = new_exit_frame;
        self.active_task_exit_frame = new_exit_frame;
    }
}
