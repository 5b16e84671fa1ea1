//! C5: `AccessHistory` — the per-shadow-byte cell: a small vector of past
//! [`Record`]s plus race/recycle flags, pruned by dominance.
//!
//! Grounded on `RompLib/include/AccessHistory.h` and
//! `RompLib/src/AccessHistory.cpp`'s `checkDataRace`/history-pruning
//! logic, and on spec §4.5's "AccessCheck orchestration" /
//! "Pruning policy" subsections, which this module implements almost
//! verbatim — `access_check.rs` only supplies the shadow-memory lookup
//! and the current task's label/lockset/instr-ptr.

use crate::happens_before::happens_before;
use crate::record::{InstrPtr, Record};

/// Coarse tag on an access-history cell, tracking whether its records all
/// descend from one task branch — lets the common "same task keeps
/// writing this byte" case skip straight to a fast path (spec §4.5
/// "Pruning policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// No record has ever been stored here.
    Init,
    /// Exactly one record stored.
    Single,
    /// All stored records descend from a single sibling chain.
    Sibling,
    /// Records come from more than one unrelated branch.
    NonSibling,
}

/// A confirmed data race, as detected at one byte. `access_check.rs`
/// attaches the byte address before handing this to the diagnostics
/// sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceHit {
    pub hist_instr: InstrPtr,
    pub cur_instr: InstrPtr,
    pub hist_is_write: bool,
    pub cur_is_write: bool,
}

/// Per-byte (or per-granularity-chunk) access history cell. Callers
/// external to this module are expected to hold the cell's own mutex
/// (spec §4.5 step 6: "acquire `cell.mutex`"); this type itself does no
/// locking — see [`crate::shadow_memory::ShadowMemory`] for the mutex
/// that wraps it.
#[derive(Debug, Default)]
pub struct AccessHistory {
    records: Vec<Record>,
    data_race_found: bool,
    memory_recycled: bool,
    state: RecordStateCell,
}

#[derive(Debug, Clone, Copy)]
struct RecordStateCell(RecordState);

impl Default for RecordStateCell {
    fn default() -> Self {
        RecordStateCell(RecordState::Init)
    }
}

impl AccessHistory {
    pub fn new() -> Self {
        AccessHistory::default()
    }

    pub fn data_race_found(&self) -> bool {
        self.data_race_found
    }

    pub fn memory_recycled(&self) -> bool {
        self.memory_recycled
    }

    pub fn record_state(&self) -> RecordState {
        self.state.0
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Spec §4.7 "Task schedule": mark this cell's range recycled,
    /// emptying its records — whatever was here is now known-dead.
    pub fn recycle(&mut self) {
        self.records.clear();
        self.memory_recycled = true;
        self.data_race_found = false;
        self.state.0 = RecordState::Init;
    }

    /// Spec §4.5 step 6 `checkDataRace`, run while holding the cell's
    /// mutex. `hw_lock` is the instrumentation's own hint that a hardware
    /// lock already serializes this access (spec §4.5 step 6c: `¬hwLock`
    /// is part of the race condition).
    ///
    /// Returns `Some(RaceHit)` the first time a race is confirmed on this
    /// cell; from then on the cell is quenched (`data_race_found`) and
    /// every subsequent call drops its candidate record and returns
    /// `None` without re-checking (spec §4.5 step 6a, §5 "reports at most
    /// one race per byte").
    pub fn check_and_record(&mut self, candidate: Record, hw_lock: bool) -> Option<RaceHit> {
        if self.data_race_found {
            return None;
        }
        if self.records.is_empty() {
            self.records.push(candidate);
            self.state.0 = RecordState::Single;
            return None;
        }

        let mut survivors: Vec<Record> = Vec::with_capacity(self.records.len());
        let mut subsumed_by_candidate = false;
        let mut candidate_subsumed = false;

        for hist in self.records.drain(..) {
            if self.data_race_found {
                // A previous iteration already confirmed a race; nothing
                // left to do but drop the rest (spec §4.5 step 6: "raise
                // cell.DataRaceFound ... clear the vector, return").
                continue;
            }
            let ordered = happens_before(hist.label(), candidate.label());
            let either_write = hist.is_write() || candidate.is_write();
            let locks_intersect = hist.lockset().intersects(candidate.lockset());

            if !ordered && either_write && !locks_intersect && !hw_lock {
                self.data_race_found = true;
                let hit = RaceHit {
                    hist_instr: hist.instr_ptr(),
                    cur_instr: candidate.instr_ptr(),
                    hist_is_write: hist.is_write(),
                    cur_is_write: candidate.is_write(),
                };
                self.records.clear();
                self.state.0 = RecordState::Init;
                return Some(hit);
            }

            // Pruning policy (spec §4.5): dominance by happens-before plus
            // matching write-ness and a lockset-subset relation.
            if ordered
                && hist.is_write() == candidate.is_write()
                && candidate.lockset().is_subset_of(hist.lockset())
            {
                // candidate subsumes hist: drop hist.
                subsumed_by_candidate = true;
                continue;
            }
            if happens_before(candidate.label(), hist.label())
                && candidate.is_write() == hist.is_write()
                && hist.lockset().is_subset_of(candidate.lockset())
            {
                // hist subsumes candidate: keep hist, skip inserting candidate.
                candidate_subsumed = true;
            }
            survivors.push(hist);
        }

        let _ = subsumed_by_candidate;
        if !candidate_subsumed {
            survivors.push(candidate);
        }
        self.state.0 = if survivors.len() <= 1 {
            RecordState::Single
        } else {
            RecordState::NonSibling
        };
        self.records = survivors;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label_mutation::{implicit_task_begin, initial_task_label};
    use crate::lockset::Lockset;

    fn label_for(index: u32, width: u32) -> crate::label::Label {
        implicit_task_begin(&initial_task_label(), index, width)
    }

    #[test]
    fn first_access_just_records() {
        let mut cell = AccessHistory::new();
        let rec = Record::new(true, label_for(0, 4), Lockset::new(), 1, 0x1000);
        assert!(cell.check_and_record(rec, false).is_none());
        assert_eq!(cell.record_state(), RecordState::Single);
        assert_eq!(cell.records().len(), 1);
    }

    #[test]
    fn concurrent_writes_from_siblings_race() {
        let mut cell = AccessHistory::new();
        let w0 = Record::new(true, label_for(0, 4), Lockset::new(), 1, 0x1000);
        let w1 = Record::new(true, label_for(1, 4), Lockset::new(), 2, 0x1010);
        assert!(cell.check_and_record(w0, false).is_none());
        let hit = cell.check_and_record(w1, false).expect("race expected");
        assert_eq!(hit.hist_instr, 0x1000);
        assert_eq!(hit.cur_instr, 0x1010);
        assert!(cell.data_race_found());
        assert!(cell.records().is_empty());
    }

    #[test]
    fn intersecting_locksets_suppress_the_race() {
        let mut cell = AccessHistory::new();
        let mut ls_a = Lockset::new();
        ls_a.add(0xaa);
        let mut ls_b = Lockset::new();
        ls_b.add(0xaa);
        let w0 = Record::new(true, label_for(0, 4), ls_a, 1, 0x1000);
        let w1 = Record::new(true, label_for(1, 4), ls_b, 2, 0x1010);
        assert!(cell.check_and_record(w0, false).is_none());
        assert!(cell.check_and_record(w1, false).is_none());
        assert!(!cell.data_race_found());
    }

    #[test]
    fn hardware_lock_hint_suppresses_the_race() {
        let mut cell = AccessHistory::new();
        let w0 = Record::new(true, label_for(0, 4), Lockset::new(), 1, 0x1000);
        let w1 = Record::new(true, label_for(1, 4), Lockset::new(), 2, 0x1010);
        assert!(cell.check_and_record(w0, false).is_none());
        assert!(cell.check_and_record(w1, true).is_none());
        assert!(!cell.data_race_found());
    }

    #[test]
    fn ordered_same_write_access_is_pruned() {
        let mut cell = AccessHistory::new();
        let root = initial_task_label();
        let worker = label_for(0, 1);
        let later = crate::label_mutation::barrier_end(&worker);
        let _ = root;
        let hist = Record::new(true, worker, Lockset::new(), 1, 0x1000);
        let cur = Record::new(true, later, Lockset::new(), 1, 0x1010);
        assert!(cell.check_and_record(hist, false).is_none());
        assert!(cell.check_and_record(cur, false).is_none());
        // hist is dominated by cur (same write-ness, ordered, equal empty
        // locksets): it should have been pruned away.
        assert_eq!(cell.records().len(), 1);
        assert_eq!(cell.records()[0].instr_ptr(), 0x1010);
    }
}
