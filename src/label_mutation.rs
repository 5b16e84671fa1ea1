//! C7: `LabelMutation` — one pure function per runtime event, each copying
//! the label and popping/appending/replacing exactly the segments spec
//! §4.2's table specifies.
//!
//! Every function here takes `&Label` (and any event parameters) and
//! returns a brand-new `Label`; none of them observe their input change
//! (spec §4.2 "Each mutation is a pure function: old label is never
//! observed to change" — spec §8 testable property #5).
//!
//! A program always starts inside the root "initial task", whose label is
//! a single `Implicit(0, 1)` segment (spec §4.2's "Initial task created"
//! row). That root segment is what makes [`barrier_end`]'s `last_kth(2)`
//! always resolve: the moment any parallel region is active, a task's
//! label has at least two segments — the (possibly deeply nested) ancestor
//! chain ending in that shared root, and the region's own `Implicit`
//! segment.

use crate::label::Label;
use crate::segment::Segment;

/// "Initial task created": `label = [Implicit(off=0, span=1)]`.
pub fn initial_task_label() -> Label {
    Label::new().appended(Segment::implicit(0, 1))
}

/// "Implicit task begin (index `i`, width `N`, parent label `P`)":
/// `P ∥ Implicit(off=i, span=N)`.
pub fn implicit_task_begin(parent: &Label, index: u32, width: u32) -> Label {
    parent.appended(Segment::implicit(index, width))
}

/// "Implicit task end → parent": the parent's new label is the child's
/// label with its own `Implicit` segment popped off — what remains is
/// exactly the parent's old ancestor chain, including whatever barrier
/// bumps were applied to its tail while the child was alive (spec §4.2:
/// "parent pops its last segment, appends a copy of the child's
/// second-last segment").
pub fn implicit_task_end_parent(child: &Label) -> Label {
    child.popped()
}

/// "Explicit task created": the new child label is `parent ∥ Explicit(0, 1)`.
pub fn explicit_task_create_child(parent: &Label) -> Label {
    parent.appended(Segment::explicit())
}

/// Companion mutation applied to the *parent's own* retained label:
/// "bump parent's last-segment `taskCreate`".
pub fn explicit_task_create_parent(parent: &Label) -> Label {
    let last = parent.last_kth(1);
    parent.with_last(last.with_task_create(last.task_create() + 1))
}

/// "Barrier end: on last segment *k=2* ..., offset += span". Every worker
/// in a team shares an identical ancestor segment at this position at fork
/// time, so applying this mutation independently to each worker's own
/// label produces the same resulting segment value for every member of
/// the team (spec §8 scenario S2).
pub fn barrier_end(label: &Label) -> Label {
    let target = label.last_kth(2);
    label.with_last_kth(2, target.barrier_bump())
}

/// "Taskwait end": the waiting task's own last segment's `taskwait += 1`.
pub fn taskwait_end(label: &Label) -> Label {
    let last = label.last_kth(1);
    label.with_last(last.with_taskwait(last.taskwait() + 1))
}

/// Companion mutation applied to each outstanding explicit child's label:
/// "mark all outstanding explicit children's last segment as taskwaited
/// (store `taskwaitPhase` = parent's current phase)".
pub fn taskwait_mark_child(child: &Label, parent_phase: u32) -> Label {
    let last = child.last_kth(1);
    child.with_last(last.with_taskwaited(parent_phase))
}

/// "Ordered-section enter/leave: last segment's `phase += 1`" — the same
/// mutation applies on both enter and leave.
pub fn ordered_section_step(label: &Label) -> Label {
    let last = label.last_kth(1);
    label.with_last(last.with_phase(last.phase() + 1))
}

/// "Workshare loop begin" / "Sections begin": append a WorkShare placeholder.
pub fn workshare_begin(label: &Label, is_section: bool) -> Label {
    label.appended(Segment::workshare_placeholder(is_section))
}

/// "Workshare loop end" / "Sections end": pop the placeholder, bump the
/// new last segment's `loopCount`.
pub fn workshare_end(label: &Label) -> Label {
    let popped = label.popped();
    let last = popped.last_kth(1);
    popped.with_last(last.with_loop_count(last.loop_count() + 1))
}

/// "Single begin (executor)" / "Single begin (other)": append a WorkShare
/// segment carrying the relevant single-construct flag.
pub fn single_begin(label: &Label, is_executor: bool) -> Label {
    label.appended(Segment::single(is_executor))
}

/// "Single end": pop the WorkShare segment.
pub fn single_end(label: &Label) -> Label {
    label.popped()
}

/// "Iteration dispatch (id `x`)": replace the last WorkShare segment,
/// setting `workShareId = x` and clearing the placeholder flag.
pub fn iteration_dispatch(label: &Label, id: u64) -> Label {
    let last = label.last_kth(1);
    let is_section = last.is_section();
    label.with_last(last.with_workshare_dispatch(id, is_section))
}

/// "Section dispatch (id `p`)": same as iteration dispatch, with
/// `isSection = true`.
pub fn section_dispatch(label: &Label, id: u64) -> Label {
    let last = label.last_kth(1);
    label.with_last(last.with_workshare_dispatch(id, true))
}

/// "Taskgroup begin": last segment's `taskGroupLevel += 1`, new
/// `taskGroupId`.
pub fn taskgroup_begin(label: &Label, new_task_group_id: u32) -> Label {
    let last = label.last_kth(1);
    label.with_last(last.with_task_group(last.task_group_level() + 1, new_task_group_id))
}

/// "Taskgroup end": `taskGroupLevel -= 1`.
pub fn taskgroup_end(label: &Label) -> Label {
    let last = label.last_kth(1);
    label.with_last(last.with_task_group(last.task_group_level().saturating_sub(1), last.task_group_id()))
}

/// Companion mutation applied to each direct explicit child still alive
/// when a taskgroup ends: "propagate `taskGroupPhase` = current phase to
/// direct explicit children, mark them `isTaskGroupSync`".
pub fn taskgroup_mark_child(child: &Label, phase: u32) -> Label {
    let last = child.last_kth(1);
    child.with_last(last.with_taskgroup_sync(phase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_barrier_orders_different_workers() {
        // Scenario S2: a 4-worker parallel region nested under the root
        // initial task. Worker 0 writes x, all workers hit a barrier,
        // worker 1 writes x.
        let root = initial_task_label();
        let worker0_pre = implicit_task_begin(&root, 0, 4);
        let worker1_pre = implicit_task_begin(&root, 1, 4);

        // Barrier crosses independently for every worker, but the bumped
        // segment (k=2, the shared root) ends up identical for everyone.
        let worker0_post = barrier_end(&worker0_pre);
        let worker1_post = barrier_end(&worker1_pre);

        assert_eq!(worker0_post.last_kth(2), worker1_post.last_kth(2));

        let diff = worker0_pre.compare(&worker1_post);
        match diff {
            crate::label::LabelOrder::DiffAt(0) => {}
            other => panic!("expected diff at index 0, got {other:?}"),
        }
    }

    #[test]
    fn implicit_task_end_parent_preserves_barrier_bumps() {
        let root = initial_task_label();
        let worker0 = implicit_task_begin(&root, 0, 4);
        let bumped_root = barrier_end(&worker0);
        let parent_after = implicit_task_end_parent(&bumped_root);
        assert_eq!(parent_after.len(), root.len());
        assert_eq!(parent_after.last_kth(1).offset(), 1);
    }

    #[test]
    fn mutation_does_not_observe_input_change() {
        let root = initial_task_label();
        let before = root.clone();
        let _ = barrier_end(&implicit_task_begin(&root, 0, 2));
        assert_eq!(root, before);
    }
}
