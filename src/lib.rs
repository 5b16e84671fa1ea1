//! `forkrace`: a dynamic data-race detector for fork-join, task-based
//! parallel programs (implicit/explicit tasks, workshare constructs,
//! ordered sections, barriers, taskwait/taskgroup, locks, reductions).
//!
//! The detector works by tagging every task with a [`label::Label`] that
//! encodes its position in the fork-join task graph, and deciding whether
//! two recorded accesses to the same byte are ordered by testing their
//! labels with [`happens_before::happens_before`] rather than by tracking
//! vector clocks per thread — the same label-based approach
//! `RompLib/src/Core.cpp` (this crate's grounding source) takes.
//!
//! This crate does not itself talk to any particular OpenMP runtime: the
//! [`runtime::RuntimeQuery`] trait is the narrow boundary a binding layer
//! implements, and [`event_handlers::EventHandlers`] is the stateful core
//! that boundary drives.

pub mod access_check;
pub mod access_history;
pub mod config;
pub mod detector;
pub mod diagnostics;
pub mod error;
pub mod event_handlers;
pub mod happens_before;
pub mod label;
pub mod label_mutation;
pub mod lockset;
pub mod record;
pub mod runtime;
pub mod segment;
pub mod shadow_memory;
pub mod task_data;
pub mod testing;
pub mod thread_data;

pub use config::{DetectorConfig, Granularity};
pub use diagnostics::{NullResolver, RaceReport, SourceLocation, SourceResolver};
pub use error::ForkraceError;
pub use event_handlers::{DispatchKind, EventHandlers, MutexKind, SyncKind, WorkKind};
pub use record::{InstrPtr, TaskPtr};
pub use runtime::{ParallelInfo, RuntimeQuery, TaskInfo, TaskKind, ThreadDataHandle};
