//! Test-only [`RuntimeQuery`] implementation (spec §10.4 ambient test
//! tooling supplement): lets integration tests drive
//! [`crate::event_handlers::EventHandlers::check_access`] without a real
//! collaborating runtime-tool interface.
//!
//! Grounded on the same shape `samply`'s own crate exposes for its
//! profiler core tests — a small in-memory stand-in for the platform API
//! the real code calls out to, swapped in only under `cfg(test)` /
//! `dev-dependencies`-reachable code.

use parking_lot::Mutex;

use crate::record::TaskPtr;
use crate::runtime::{ParallelInfo, RuntimeQuery, TaskInfo, TaskKind, ThreadDataHandle};

/// A fully scripted stand-in for the runtime-tool interface. Each query
/// call just returns whatever was last set via the `set_*` methods.
pub struct MockRuntime {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    task_info: Option<TaskInfo>,
    parallel_info: Option<ParallelInfo>,
    thread_data: Option<ThreadDataHandle>,
    thread_stack_info: Option<(u64, u64)>,
    task_memory_info: Option<(u64, u64)>,
}

impl MockRuntime {
    pub fn new() -> Self {
        MockRuntime {
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn set_current_task(
        &self,
        kind: TaskKind,
        thread_num: u32,
        task_ptr: TaskPtr,
        task_frame: u64,
        parallel_ptr: u64,
    ) {
        self.state.lock().task_info = Some(TaskInfo {
            kind,
            thread_num,
            task_ptr,
            task_frame,
            parallel_ptr,
        });
    }

    pub fn set_parallel_info(&self, team_size: u32, parallel_ptr: u64) {
        self.state.lock().parallel_info = Some(ParallelInfo {
            team_size,
            parallel_ptr,
        });
    }

    pub fn set_thread_data(&self, handle: ThreadDataHandle) {
        self.state.lock().thread_data = Some(handle);
    }

    pub fn set_stack_info(&self, base: u64, size: u64) {
        self.state.lock().thread_stack_info = Some((base, size));
    }

    pub fn set_task_memory_info(&self, base: u64, size: u64) {
        self.state.lock().task_memory_info = Some((base, size));
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        MockRuntime::new()
    }
}

impl RuntimeQuery for MockRuntime {
    fn task_info(&self, ancestor_level: u32) -> Option<TaskInfo> {
        if ancestor_level != 0 {
            // This stand-in only scripts the innermost task; ancestor
            // queries are out of scope for the scenarios it drives.
            return None;
        }
        self.state.lock().task_info
    }

    fn parallel_info(&self, ancestor_level: u32) -> Option<ParallelInfo> {
        if ancestor_level != 0 {
            return None;
        }
        self.state.lock().parallel_info
    }

    fn thread_data(&self) -> Option<ThreadDataHandle> {
        self.state.lock().thread_data
    }

    fn thread_stack_info(&self) -> Option<(u64, u64)> {
        self.state.lock().thread_stack_info
    }

    fn task_memory_info(&self) -> Option<(u64, u64)> {
        self.state.lock().task_memory_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_queries_return_none() {
        let rt = MockRuntime::new();
        assert!(rt.task_info(0).is_none());
        assert!(rt.thread_stack_info().is_none());
    }

    #[test]
    fn ancestor_level_above_zero_is_unscripted() {
        let rt = MockRuntime::new();
        rt.set_current_task(TaskKind::Implicit, 0, 1, 0x1000, 0x10);
        assert!(rt.task_info(0).is_some());
        assert!(rt.task_info(1).is_none());
    }

    #[test]
    fn scripted_task_info_round_trips() {
        let rt = MockRuntime::new();
        rt.set_current_task(TaskKind::Explicit, 2, 7, 0x2000, 0x20);
        let info = rt.task_info(0).unwrap();
        assert_eq!(info.kind, TaskKind::Explicit);
        assert_eq!(info.task_ptr, 7);
    }
}
