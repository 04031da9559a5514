//! Execution records returned by [`crate::PatternSequence::execute`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tester::PinFrame;
use crate::thread::{ThreadEvent, ThreadId, ThreadStatus};

/// One batch of cycles emitted by the scheduler in a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emission {
    /// Scheduler tick.
    pub tick: u64,
    /// Global cycle at which the batch starts.
    pub cycle: u64,
    /// Number of cycles emitted (the minimum pending request).
    pub cycles: u64,
    /// Frame emitted.
    pub frame: PinFrame,
    /// Threads that had a pending request and were credited.
    pub threads: Vec<ThreadId>,
}

/// Final state of one thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Thread id.
    pub id: ThreadId,
    /// Final status.
    pub status: ThreadStatus,
    /// Cycle at which the thread started.
    pub cycle_count_start: Option<u64>,
    /// Cycle at which the body returned.
    pub cycle_count_stop: Option<u64>,
    /// State changes, in order.
    pub events: Vec<ThreadEvent>,
    /// Whether the body returned.
    pub completed: bool,
    /// Sum of all `cycle()` requests.
    pub requested_cycles: u64,
    /// Cycles credited by the scheduler.
    pub granted_cycles: u64,
}

/// Result of a completed sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceReport {
    /// Sequence name.
    pub name: String,
    /// Final global cycle count.
    pub cycles: u64,
    /// Scheduler ticks executed.
    pub ticks: u64,
    /// Every thread, in registration order.
    pub threads: Vec<ThreadSummary>,
    /// Every emission, in order.
    pub emissions: Vec<Emission>,
}

impl SequenceReport {
    /// Summary for one thread.
    #[must_use]
    pub fn thread(&self, id: &str) -> Option<&ThreadSummary> {
        self.threads.iter().find(|t| t.id.as_str() == id)
    }

    /// Cycles credited to each thread.
    #[must_use]
    pub fn granted_by_thread(&self) -> BTreeMap<ThreadId, u64> {
        self.threads
            .iter()
            .map(|t| (t.id.clone(), t.granted_cycles))
            .collect()
    }

    /// Emitted batch sizes in order.
    #[must_use]
    pub fn emitted_batches(&self) -> Vec<u64> {
        self.emissions.iter().map(|e| e.cycles).collect()
    }

    /// Whether every thread ran to completion.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.threads.iter().all(|t| t.completed)
    }
}
