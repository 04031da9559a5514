//! Sequencer error taxonomy.
//!
//! Invariant violations carry the offending thread and state so the pattern
//! author can find the misbehaving parallel block. Errors raised by branch
//! bodies are wrapped with the id of the thread that returned them.

use crate::thread::{BlockReason, ThreadId};

/// Errors from sequence construction and execution.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    /// More cycles were granted globally than the thread had pending.
    #[error("thread {thread}: {granted} cycles granted with only {pending} pending")]
    PendingUnderflow {
        /// Thread whose counter underflowed.
        thread: ThreadId,
        /// Cycles the thread had pending.
        pending: u64,
        /// Cycles the scheduler granted.
        granted: u64,
    },
    /// A thread requested cycles while an earlier request was still pending.
    #[error("thread {thread} requested cycles while {pending} cycles were still pending")]
    PendingOverlap {
        /// Offending thread.
        thread: ThreadId,
        /// Cycles still pending from the earlier request.
        pending: u64,
    },
    /// A thread id was registered twice in one sequence.
    #[error("thread id {0} is already registered")]
    DuplicateThread(ThreadId),
    /// A wait named a thread that was never registered.
    #[error("thread {thread} waits on unknown thread {target}")]
    UnknownThread {
        /// Waiting thread.
        thread: ThreadId,
        /// Unknown target id.
        target: ThreadId,
    },
    /// A thread asked to wait for its own completion.
    #[error("thread {0} cannot wait for its own completion")]
    SelfWait(ThreadId),
    /// The scheduler lost track of a thread it was asked about.
    #[error("thread {0} has no record in this sequence")]
    MissingThread(ThreadId),
    /// A serialize lock handle from another sequence was used.
    #[error("serialize lock {0} does not belong to this sequence")]
    UnknownLock(String),
    /// `run` named a pattern absent from the library.
    #[error("unknown pattern {0}")]
    UnknownPattern(String),
    /// Every active thread is blocked and none can make progress.
    #[error("deadlock at cycle {cycle}: {}", describe_blocked(.blocked))]
    Deadlock {
        /// Cycle at which the deadlock was detected.
        cycle: u64,
        /// Active threads and what each is blocked on.
        blocked: Vec<(ThreadId, Option<BlockReason>)>,
    },
    /// The configured tick limit was reached.
    #[error("tick limit of {limit} exceeded at cycle {cycle}")]
    TickLimit {
        /// Configured limit.
        limit: u64,
        /// Cycle at which execution stopped.
        cycle: u64,
    },
    /// A branch body awaited a future that is not a sequencer suspension point.
    #[error("thread {0} awaited a future that is not driven by the sequencer")]
    ForeignAwait(ThreadId),
    /// The cycle sink rejected an emission.
    #[error("cycle sink error: {0}")]
    Sink(String),
    /// A branch body aborted with a message of its own.
    #[error("aborted: {0}")]
    Aborted(String),
    /// An error surfaced from a specific thread.
    #[error("thread {thread}: {source}")]
    Thread {
        /// Thread that returned the error.
        thread: ThreadId,
        /// Underlying error.
        #[source]
        source: Box<SequenceError>,
    },
    /// Configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SequenceError {
    /// Abort the current branch body with a message.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted(message.into())
    }

    /// Attach a thread id, unless the error already names one.
    #[must_use]
    pub fn in_thread(self, thread: &ThreadId) -> Self {
        match self {
            Self::Thread { .. } => self,
            other => Self::Thread {
                thread: thread.clone(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with thread wrappers removed.
    #[must_use]
    pub fn root(&self) -> &SequenceError {
        match self {
            Self::Thread { source, .. } => source.root(),
            other => other,
        }
    }
}

fn describe_blocked(blocked: &[(ThreadId, Option<BlockReason>)]) -> String {
    blocked
        .iter()
        .map(|(id, reason)| match reason {
            Some(reason) => format!("{id} blocked on {reason}"),
            None => format!("{id} idle"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
