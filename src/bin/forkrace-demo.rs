//! Small CLI that drives the detector core through a couple of the
//! scenarios from spec §8, to make it easy to see what a race report
//! looks like without wiring up a real OpenMP runtime.

use forkrace::runtime::TaskKind;
use forkrace::testing::MockRuntime;
use forkrace::{DetectorConfig, TaskPtr};

const THREAD: u64 = 1;
const PARALLEL_REGION: u64 = 100;
const WORKER0: TaskPtr = 10;
const WORKER1: TaskPtr = 11;

fn main() {
    env_logger::init();

    forkrace::detector::init(DetectorConfig::default().with_page_table_bits(10, 10));
    let detector = forkrace::detector::detector();
    let rt = MockRuntime::new();
    rt.set_stack_info(0, 0);

    detector.on_thread_begin(THREAD, 0, 1 << 20);
    detector.on_parallel_begin(PARALLEL_REGION, 2, 0);
    detector.on_implicit_task_begin(0, WORKER0, 0, 2);
    detector.on_implicit_task_begin(0, WORKER1, 1, 2);

    println!("-- scenario S1: unsynchronized sibling writes --");
    rt.set_current_task(TaskKind::Implicit, 0, WORKER0, 0, PARALLEL_REGION);
    detector.check_access(&rt, 0x4000, 1, 0x1000, false, true);

    rt.set_current_task(TaskKind::Implicit, 1, WORKER1, 0, PARALLEL_REGION);
    detector.check_access(&rt, 0x4000, 1, 0x1004, false, true);

    report(detector);

    println!("-- scenario S2: same address, separated by a barrier --");
    detector.on_barrier_end(WORKER1);
    detector.check_access(&rt, 0x5000, 1, 0x2000, false, true);
    detector.on_barrier_end(WORKER0);
    rt.set_current_task(TaskKind::Implicit, 0, WORKER0, 0, PARALLEL_REGION);
    detector.check_access(&rt, 0x5000, 1, 0x2004, false, true);

    report(detector);

    detector.on_parallel_end(PARALLEL_REGION);
    detector.on_thread_end(THREAD);
}

fn report(detector: &forkrace::EventHandlers) {
    if detector.data_race_found() {
        for r in detector.reports() {
            println!("{r}");
        }
    } else {
        println!("no race found so far");
    }
}
