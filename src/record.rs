//! C4: `Record` — the immutable snapshot of one memory access, as kept in
//! an [`crate::access_history::AccessHistory`] cell.
//!
//! Grounded on `RompLib/include/Record.h`'s `Record` class, generalized
//! from its opaque `_taskPtr`/`_state`-byte fields into the label and
//! lockset snapshots spec §3 calls for.

use crate::label::Label;
use crate::lockset::Lockset;

/// Opaque identifiers carried alongside a record purely for diagnostics —
/// the core never dereferences them (spec §6: task/instruction pointers
/// are supplied by the out-of-scope runtime-tool interface).
pub type TaskPtr = u64;
pub type InstrPtr = u64;

/// One instrumented memory access, as recorded in an access-history cell.
/// Immutable once placed there (spec §3 "Immutable once placed in an
/// AccessHistory").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    is_write: bool,
    label: Label,
    lockset: Lockset,
    task_ptr: TaskPtr,
    instr_ptr: InstrPtr,
}

impl Record {
    pub fn new(
        is_write: bool,
        label: Label,
        lockset: Lockset,
        task_ptr: TaskPtr,
        instr_ptr: InstrPtr,
    ) -> Self {
        Record {
            is_write,
            label,
            lockset,
            task_ptr,
            instr_ptr,
        }
    }

    pub fn is_write(&self) -> bool {
        self.is_write
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn lockset(&self) -> &Lockset {
        &self.lockset
    }

    pub fn task_ptr(&self) -> TaskPtr {
        self.task_ptr
    }

    pub fn instr_ptr(&self) -> InstrPtr {
        self.instr_ptr
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{:#x} label={} locks={}",
            if self.is_write { "W" } else { "R" },
            self.instr_ptr,
            self.label,
            self.lockset
        )
    }
}
