//! Error types and the fatal-invariant-violation helper.
//!
//! Grounded on `samply/src/error.rs`'s `SamplingError`: a small `thiserror`
//! enum for the few genuinely recoverable failure modes. Spec §7's
//! "invariant violation" and "capacity overflow" classes are not recoverable
//! by contract, so they go through [`fatal`] instead of this enum, the way
//! the original source calls `RAW_LOG(FATAL, ...)` in `RompLib/src/Core.cpp`.

use thiserror::Error;

/// Errors returned by fallible, recoverable entry points of `forkrace`.
#[derive(Debug, Clone, Error)]
pub enum ForkraceError {
    #[error("shadow memory configuration is invalid: {0}")]
    InvalidShadowConfig(&'static str),

    #[error("lockset capacity exceeded (max {max} locks held at once)")]
    LocksetOverflow { max: usize },

    #[error("attempted to remove lock {lock:#x} that was not held")]
    LockNotHeld { lock: u64 },
}

/// Logs at `error` level and then panics. Used for the invariant violations
/// spec §7 classifies as fatal: a history label strictly in the current
/// task's future, a segment span mismatch between two labels being
/// compared, a workshare segment nested directly inside another workshare
/// segment, or a counter value that does not fit its encoded width.
///
/// Mirrors `RAW_LOG(FATAL, ...)` in `RompLib/src/Core.cpp`: these indicate a
/// bug in the detector itself (or a runtime event delivered out of order),
/// never a property of the program under test.
#[track_caller]
pub fn fatal(message: impl AsRef<str>) -> ! {
    log::error!("forkrace: invariant violation: {}", message.as_ref());
    panic!("forkrace: invariant violation: {}", message.as_ref());
}

/// Emits a `warn!` at most once per call site, for spec §7's "missing
/// required info" class: the runtime query returned nothing mid-check, so
/// the check is skipped rather than treated as an error.
///
/// Grounded on `samply/src/shared/ctrl_c.rs`'s single-fire guard: a static
/// `AtomicBool` flips once and subsequent calls are silent.
pub struct WarnOnce(std::sync::atomic::AtomicBool);

impl WarnOnce {
    pub const fn new() -> Self {
        Self(std::sync::atomic::AtomicBool::new(false))
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        use std::sync::atomic::Ordering;
        if self.0.swap(true, Ordering::Relaxed) {
            return;
        }
        log::warn!("forkrace: {} (further occurrences suppressed)", message.as_ref());
    }
}

impl Default for WarnOnce {
    fn default() -> Self {
        Self::new()
    }
}
