//! C10: `EventHandlers` — adapters from runtime callbacks to
//! [`crate::label_mutation`] and shadow-cell lifecycle (spec §4.7).
//!
//! This is the stateful glue spec §9 calls the "process-wide singleton":
//! it owns the [`ShadowMemory`], the live [`TaskData`]/[`ThreadData`]
//! registries, and the monotone `dataRaceFound` flag, and is the one
//! piece of this crate a binding layer (out of scope — spec §1) would
//! register against a real OMPT-style runtime-tool interface. Registry
//! locking generalizes `samply-symbols`'s `Mutex<HashMap<_, _>>` pattern
//! (see `samply-symbols/src/cache.rs`'s `string_cache`) to an `RwLock`,
//! since these registries are read far more often (every `check_access`)
//! than written (task/thread lifecycle events only), with `rustc-hash`'s
//! `FxHashMap` for the same reason `samply`'s `shared/types.rs` picks it:
//! these keys are plain integers, and the default SipHash is needless
//! overhead.

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::access_check::{self, DataSharing};
use crate::config::DetectorConfig;
use crate::diagnostics::RaceReport;
use crate::error::{fatal, WarnOnce};
use crate::label_mutation::*;
use crate::record::{InstrPtr, TaskPtr};
use crate::runtime::{RuntimeQuery, TaskKind, ThreadDataHandle};
use crate::shadow_memory::ShadowMemory;
use crate::task_data::{ParallelRegionData, TaskData};
use crate::thread_data::ThreadData;

/// Spec §6 `sync_region`'s `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Barrier,
    Taskwait,
    Taskgroup,
    Reduction,
}

/// Spec §6 `mutex_acquired`/`mutex_released`'s `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexKind {
    Ordered,
    Lock,
    Critical,
    Other,
}

/// Spec §6 `work`'s `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    Loop,
    Sections,
    SingleExecutor,
    SingleOther,
    Workshare,
    Distribute,
    Taskloop,
}

/// Spec §6 `dispatch`'s `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    Iteration,
    Section,
}

/// The process-wide detector state (spec §9 "Global mutable state").
pub struct EventHandlers {
    config: DetectorConfig,
    shadow: ShadowMemory,
    tasks: RwLock<FxHashMap<TaskPtr, TaskData>>,
    threads: RwLock<FxHashMap<ThreadDataHandle, ThreadData>>,
    parallel_regions: RwLock<FxHashMap<u64, ParallelRegionData>>,
    race_found: AtomicBool,
    reports: Mutex<Vec<RaceReport>>,
    missing_info_warned: WarnOnce,
}

impl EventHandlers {
    pub fn new(config: DetectorConfig) -> Self {
        EventHandlers {
            shadow: ShadowMemory::new(&config),
            config,
            tasks: RwLock::new(FxHashMap::default()),
            threads: RwLock::new(FxHashMap::default()),
            parallel_regions: RwLock::new(FxHashMap::default()),
            race_found: AtomicBool::new(false),
            reports: Mutex::new(Vec::new()),
            missing_info_warned: WarnOnce::default(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Spec §5 "Global flags: `dataRaceFound` (monotone)".
    pub fn data_race_found(&self) -> bool {
        self.race_found.load(Ordering::Relaxed)
    }

    pub fn reports(&self) -> Vec<RaceReport> {
        self.reports.lock().clone()
    }

    // --- thread lifecycle (spec §4.7 "Thread begin/end") --------------

    pub fn on_thread_begin(&self, handle: ThreadDataHandle, stack_base: u64, stack_size: u64) {
        self.threads
            .write()
            .insert(handle, ThreadData::new(stack_base, stack_size));
    }

    pub fn on_thread_end(&self, handle: ThreadDataHandle) {
        self.threads.write().remove(&handle);
    }

    // --- parallel region lifecycle --------------------------------------

    pub fn on_parallel_begin(&self, parallel_ptr: u64, num_threads: u32, flags: u32) {
        self.parallel_regions
            .write()
            .insert(parallel_ptr, ParallelRegionData::new(num_threads, flags));
    }

    pub fn on_parallel_end(&self, parallel_ptr: u64) {
        self.parallel_regions.write().remove(&parallel_ptr);
    }

    // --- task lifecycle --------------------------------------------------

    /// Spec §4.7 "Implicit task begin": creates the child `TaskData` and
    /// sets its label per spec §4.2.
    pub fn on_implicit_task_begin(
        &self,
        parent_task_ptr: TaskPtr,
        child_task_ptr: TaskPtr,
        index: u32,
        width: u32,
    ) {
        let parent_label = match self.tasks.read().get(&parent_task_ptr) {
            Some(t) => t.label.clone(),
            None => initial_task_label(),
        };
        let child = TaskData::new(implicit_task_begin(&parent_label, index, width));
        self.tasks.write().insert(child_task_ptr, child);
    }

    /// Spec §4.7 "Implicit task begin/end ... on end of index 0, rewrite
    /// the parent label": `index` is the ending task's own index within
    /// its team.
    pub fn on_implicit_task_end(
        &self,
        child_task_ptr: TaskPtr,
        parent_task_ptr: TaskPtr,
        index: u32,
    ) {
        let mut tasks = self.tasks.write();
        let child_label = match tasks.remove(&child_task_ptr) {
            Some(t) => t.label,
            None => return,
        };
        if index == 0 {
            let rewritten = implicit_task_end_parent(&child_label);
            if let Some(parent) = tasks.get_mut(&parent_task_ptr) {
                parent.label = rewritten;
            }
        }
    }

    /// Spec §4.7 "Task create (explicit)".
    pub fn on_task_create(&self, parent_task_ptr: TaskPtr, child_task_ptr: TaskPtr) {
        let mut tasks = self.tasks.write();
        let parent_label = match tasks.get(&parent_task_ptr) {
            Some(t) => t.label.clone(),
            None => fatal("task_create fired for an unknown parent task"),
        };
        let child = TaskData::new(explicit_task_create_child(&parent_label));
        tasks.insert(child_task_ptr, child);
        if let Some(parent) = tasks.get_mut(&parent_task_ptr) {
            parent.label = explicit_task_create_parent(&parent.label);
            parent.register_child(child_task_ptr);
        }
    }

    /// Spec §4.7 "Task schedule": recycles the memory range the
    /// completing task touched, plus the task-private region the runtime
    /// hands back through its task-memory query.
    pub fn on_task_schedule_complete<Q: RuntimeQuery>(
        &self,
        query: &Q,
        thread_handle: ThreadDataHandle,
        completing_task_ptr: TaskPtr,
        new_exit_frame: u64,
    ) {
        let range = {
            let mut threads = self.threads.write();
            threads.get_mut(&thread_handle).map(|t| {
                let range = (t.lowest_accessed_addr, t.active_task_exit_frame);
                t.reset_range(new_exit_frame);
                range
            })
        };
        if let Some((lo, hi)) = range {
            self.recycle_range(lo, hi);
        }
        if let Some((base, size)) = query.task_memory_info() {
            self.recycle_range(base, base + size);
        }
        self.tasks.write().remove(&completing_task_ptr);
    }

    fn recycle_range(&self, lo: u64, hi: u64) {
        if lo >= hi {
            return;
        }
        let mut addr = lo;
        while addr < hi {
            if let Some(cell) = self.shadow.get_allocated(addr) {
                cell.lock().recycle();
            }
            addr += 1;
        }
    }

    // --- sync regions (spec §4.2/§4.7) ----------------------------------

    pub fn on_barrier_end(&self, task_ptr: TaskPtr) {
        self.mutate_task(task_ptr, barrier_end);
    }

    /// Spec §4.2 "mark all outstanding explicit children's last segment as
    /// taskwaited": the children are this task's own `childExplicitTasks`
    /// registry (populated by [`Self::on_task_create`]), not caller-supplied.
    /// Children are retired from that registry once marked, since the
    /// taskwait has now accounted for them.
    pub fn on_taskwait_end(&self, task_ptr: TaskPtr) {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(&task_ptr) else {
            return;
        };
        task.label = taskwait_end(&task.label);
        let phase = task.label.last_kth(1).phase();
        let children = task.child_explicit_tasks.clone();
        for &child_ptr in &children {
            if let Some(child) = tasks.get_mut(&child_ptr) {
                child.label = taskwait_mark_child(&child.label, phase);
            }
        }
        if let Some(task) = tasks.get_mut(&task_ptr) {
            for &child_ptr in &children {
                task.retire_child(child_ptr);
            }
        }
    }

    pub fn on_taskgroup_begin(&self, task_ptr: TaskPtr, task_group_id: u32) {
        self.mutate_task(task_ptr, |label| taskgroup_begin(label, task_group_id));
    }

    /// Spec §4.2's taskgroup-end marking, mirroring [`Self::on_taskwait_end`]:
    /// the children come from this task's own `childExplicitTasks`.
    pub fn on_taskgroup_end(&self, task_ptr: TaskPtr) {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(&task_ptr) else {
            return;
        };
        task.label = taskgroup_end(&task.label);
        let phase = task.label.last_kth(1).phase();
        let children = task.child_explicit_tasks.clone();
        for &child_ptr in &children {
            if let Some(child) = tasks.get_mut(&child_ptr) {
                child.label = taskgroup_mark_child(&child.label, phase);
            }
        }
        if let Some(task) = tasks.get_mut(&task_ptr) {
            for &child_ptr in &children {
                task.retire_child(child_ptr);
            }
        }
    }

    pub fn on_reduction(&self, task_ptr: TaskPtr, active: bool) {
        if let Some(task) = self.tasks.write().get_mut(&task_ptr) {
            task.in_reduction = active;
        }
    }

    pub fn on_sync_region(&self, kind: SyncKind, task_ptr: TaskPtr) {
        match kind {
            SyncKind::Barrier => self.on_barrier_end(task_ptr),
            SyncKind::Taskwait => self.on_taskwait_end(task_ptr),
            SyncKind::Taskgroup => self.on_taskgroup_end(task_ptr),
            SyncKind::Reduction => {}
        }
    }

    // --- mutexes / worksharing -------------------------------------------

    pub fn on_mutex_acquired(&self, task_ptr: TaskPtr, kind: MutexKind, wait_id: u64) {
        match kind {
            MutexKind::Ordered => self.mutate_task(task_ptr, ordered_section_step),
            _ => {
                if let Some(task) = self.tasks.write().get_mut(&task_ptr) {
                    task.lockset.add(wait_id);
                }
            }
        }
    }

    pub fn on_mutex_released(&self, task_ptr: TaskPtr, kind: MutexKind, wait_id: u64) {
        match kind {
            MutexKind::Ordered => self.mutate_task(task_ptr, ordered_section_step),
            _ => {
                if let Some(task) = self.tasks.write().get_mut(&task_ptr) {
                    if let Err(e) = task.lockset.remove(wait_id) {
                        log::warn!("releasing a lock not recorded as held: {e}");
                    }
                }
            }
        }
    }

    pub fn on_work_begin(&self, task_ptr: TaskPtr, kind: WorkKind) {
        match kind {
            WorkKind::Loop | WorkKind::Workshare | WorkKind::Distribute | WorkKind::Taskloop => {
                self.mutate_task(task_ptr, |l| workshare_begin(l, false));
            }
            WorkKind::Sections => self.mutate_task(task_ptr, |l| workshare_begin(l, true)),
            WorkKind::SingleExecutor => self.mutate_task(task_ptr, |l| single_begin(l, true)),
            WorkKind::SingleOther => self.mutate_task(task_ptr, |l| single_begin(l, false)),
        }
    }

    pub fn on_work_end(&self, task_ptr: TaskPtr, kind: WorkKind) {
        match kind {
            WorkKind::SingleExecutor | WorkKind::SingleOther => {
                self.mutate_task(task_ptr, single_end);
            }
            _ => self.mutate_task(task_ptr, workshare_end),
        }
    }

    pub fn on_dispatch(&self, task_ptr: TaskPtr, kind: DispatchKind, id: u64) {
        match kind {
            DispatchKind::Iteration => self.mutate_task(task_ptr, |l| iteration_dispatch(l, id)),
            DispatchKind::Section => self.mutate_task(task_ptr, |l| section_dispatch(l, id)),
        }
    }

    fn mutate_task(&self, task_ptr: TaskPtr, f: impl FnOnce(&crate::label::Label) -> crate::label::Label) {
        if let Some(task) = self.tasks.write().get_mut(&task_ptr) {
            task.label = f(&task.label);
        }
    }

    // --- the instrumentation entry point (spec §6 `checkAccess`) --------

    /// Spec §6 `checkAccess(address, bytesAccessed, instrAddress,
    /// hasHardwareLock, isWrite)`, orchestrated per spec §4.5 steps 1-7.
    #[allow(clippy::too_many_arguments)]
    pub fn check_access<Q: RuntimeQuery>(
        &self,
        query: &Q,
        addr: u64,
        bytes_accessed: u32,
        instr_ptr: InstrPtr,
        has_hardware_lock: bool,
        is_write: bool,
    ) {
        // Step 2: obtain current task info.
        let Some(info) = query.task_info(0) else {
            self.missing_info_warned
                .warn("check_access: task info unavailable, skipping check");
            return;
        };
        // Step 3: skip the initial task.
        if info.kind == TaskKind::Initial {
            return;
        }
        let stack = query.thread_stack_info().unwrap_or((0, u64::MAX));

        if let Some(handle) = query.thread_data() {
            if let Some(thread) = self.threads.write().get_mut(&handle) {
                thread.observe_access(addr);
            }
        }

        let sharing = access_check::classify_data_sharing(addr, info.task_frame, stack.0, stack.1);

        let tasks = self.tasks.read();
        let Some(task) = tasks.get(&info.task_ptr) else {
            self.missing_info_warned
                .warn("check_access: no TaskData registered for current task");
            return;
        };

        let outcome = access_check::check_access(
            &self.shadow,
            task,
            info.task_ptr,
            addr,
            bytes_accessed,
            instr_ptr,
            has_hardware_lock,
            is_write,
            sharing,
            &self.config,
        );
        drop(tasks);

        if !outcome.is_empty() {
            self.race_found.store(true, Ordering::Relaxed);
            let mut reports = self.reports.lock();
            for (byte_addr, hit) in outcome {
                reports.push(RaceReport::from_hit(byte_addr, hit));
            }
            if self.config.abort_on_first_race {
                fatal("aborting on first reported data race (abort_on_first_race is set)");
            }
        }
    }
}
