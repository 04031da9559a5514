//! Shared fixtures for sequencer integration tests.

use std::cell::RefCell;
use std::rc::Rc;

use patseq_sequencer::{PatternSequence, RecordingSink, SequenceReport};
use proptest::prelude::*;
use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};

/// Fixed seed so failures reproduce.
pub const SEED: [u8; 32] = [
    0x50, 0x61, 0x74, 0x53, 0x65, 0x71, 0x53, 0x63, // "PatSeqSc"
    0x68, 0x65, 0x64, 0x75, 0x6C, 0x65, 0x72, 0x54, // "hedulerT"
    0x65, 0x73, 0x74, 0x53, 0x75, 0x69, 0x74, 0x65, // "estSuite"
    0x56, 0x31, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // "V1"
];

pub fn make_runner(cases: u32) -> TestRunner {
    TestRunner::new_with_rng(
        Config {
            cases,
            ..Config::default()
        },
        TestRng::from_seed(RngAlgorithm::ChaCha, &SEED),
    )
}

/// Per-thread lists of `cycle()` requests.
pub fn plan_strategy() -> impl Strategy<Value = Vec<Vec<u64>>> {
    prop::collection::vec(prop::collection::vec(1u64..6, 1..4), 1..4)
}

/// Main spawns `t0..tN` from `plan`, then waits for all of them.
pub fn sequence_from_plan(plan: &[Vec<u64>]) -> PatternSequence {
    let plan = plan.to_vec();
    PatternSequence::new("plan", move |main| async move {
        for (index, cycles) in plan.into_iter().enumerate() {
            let id = format!("t{index}");
            main.thread(Some(id.as_str()), move |branch| async move {
                for n in cycles {
                    branch.cycle(n).await?;
                }
                Ok(())
            })?;
        }
        main.wait_for_threads_to_complete(["all"]).await
    })
}

pub fn run_plan(plan: &[Vec<u64>]) -> (SequenceReport, RecordingSink) {
    let mut sink = RecordingSink::new();
    let report = sequence_from_plan(plan).execute(&mut sink).unwrap();
    (report, sink)
}

/// Shared log written from inside branch bodies.
pub type Log<T> = Rc<RefCell<Vec<T>>>;

pub fn log<T>() -> Log<T> {
    Rc::new(RefCell::new(Vec::new()))
}
