//! Thread handles: one cooperative branch of a pattern sequence.
//!
//! A branch body is an `async` block polled by the scheduler on the calling
//! OS thread. Every suspension point returns `Pending` exactly once, so one
//! poll of the body runs it from one suspension point to the next. This gives
//! the wait/advance handshake without spawning native threads:
//!
//! - [`ThreadHandle::start`] drives the body to its first suspension point.
//! - [`ThreadHandle::advance`] resumes it once, up to the next one.
//!
//! Only one body is ever being polled at a time, so only one branch executes
//! pattern logic at any instant.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::SequenceError;
use crate::sequence::SequenceState;

/// Result returned by every branch body.
pub type BranchResult = Result<(), SequenceError>;

/// Boxed, not-yet-finished branch body.
pub(crate) type BranchFuture = LocalBoxFuture<'static, BranchResult>;

/// Identity of a thread, unique within one sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Id of the implicit main branch.
    pub const MAIN: &'static str = "main";

    /// The main branch id.
    #[must_use]
    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    /// Whether this is the main branch.
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.0 == Self::MAIN
    }

    /// String form of the id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status of a thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    /// Registered but not yet started.
    #[default]
    NotStarted,
    /// Running, or released by the scheduler this tick.
    Active,
    /// Parked at a suspension point.
    Waiting,
    /// Body has returned.
    Stopped,
}

/// State recorded in a thread's diagnostic event list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    /// Generating cycles or computing.
    Active,
    /// Blocked on another thread, a barrier, or a serialize lock.
    Waiting,
    /// Finished.
    Stopped,
}

/// One entry of a thread's event list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadEvent {
    /// State entered.
    pub state: ThreadState,
    /// Global cycle at which it was entered.
    pub cycle: u64,
}

/// What a waiting thread is blocked on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockReason {
    /// Waiting for other threads to complete.
    Threads {
        /// Threads still outstanding.
        targets: Vec<ThreadId>,
    },
    /// Waiting at a sync-up barrier.
    Barrier {
        /// Barrier location.
        location: String,
    },
    /// Waiting to enter a serialize block.
    Serialize {
        /// Lock name.
        lock: String,
    },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threads { targets } => {
                let names: Vec<&str> = targets.iter().map(ThreadId::as_str).collect();
                write!(f, "wait_for_threads({})", names.join(", "))
            }
            Self::Barrier { location } => write!(f, "sync_up({location})"),
            Self::Serialize { lock } => write!(f, "serialize({lock})"),
        }
    }
}

/// Per-thread bookkeeping shared between the scheduler and the branch body.
#[derive(Debug, Clone, Default)]
pub(crate) struct ThreadRecord {
    pub(crate) status: ThreadStatus,
    pub(crate) pending_cycles: Option<u64>,
    pub(crate) cycle_count_start: Option<u64>,
    pub(crate) cycle_count_stop: Option<u64>,
    pub(crate) events: Vec<ThreadEvent>,
    pub(crate) completed: bool,
    pub(crate) blocked_on: Option<BlockReason>,
    pub(crate) requested_cycles: u64,
    pub(crate) granted_cycles: u64,
    /// Set by a suspension point during the current poll.
    pub(crate) parked: bool,
}

impl ThreadRecord {
    /// Append an event unless the thread is already in that state.
    pub(crate) fn record(&mut self, state: ThreadState, cycle: u64) {
        if self.events.last().map(|e| e.state) == Some(state) {
            return;
        }
        self.events.push(ThreadEvent { state, cycle });
    }
}

/// Suspension point: yields to the scheduler exactly once.
pub(crate) struct Suspend {
    state: Rc<RefCell<SequenceState>>,
    id: ThreadId,
    yielded: bool,
}

impl Suspend {
    pub(crate) fn new(state: Rc<RefCell<SequenceState>>, id: ThreadId) -> Self {
        Self {
            state,
            id,
            yielded: false,
        }
    }
}

impl Future for Suspend {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        if let Some(record) = self.state.borrow_mut().threads.get_mut(&self.id) {
            record.parked = true;
        }
        Poll::Pending
    }
}

/// Scheduler-side handle for one branch.
pub struct ThreadHandle {
    id: ThreadId,
    body: Option<BranchFuture>,
    state: Rc<RefCell<SequenceState>>,
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("id", &self.id)
            .field("running", &self.body.is_some())
            .finish()
    }
}

impl ThreadHandle {
    pub(crate) fn new(id: ThreadId, body: BranchFuture, state: Rc<RefCell<SequenceState>>) -> Self {
        Self {
            id,
            body: Some(body),
            state,
        }
    }

    /// Thread id.
    #[must_use]
    pub fn id(&self) -> &ThreadId {
        &self.id
    }

    /// Start the branch and run it to its first suspension point.
    ///
    /// # Errors
    ///
    /// Returns the body's error if it fails before its first suspension, or
    /// an invariant violation if the thread has no record.
    pub fn start(&mut self) -> Result<(), SequenceError> {
        {
            let mut state = self.state.borrow_mut();
            let cycle = state.clock.cycle;
            let record = state.record_mut(&self.id)?;
            record.cycle_count_start = Some(cycle);
            record.status = ThreadStatus::Active;
            record.record(ThreadState::Active, cycle);
            state.bump_epoch();
        }
        tracing::info!(thread = %self.id, "thread started");
        self.poll_body()
    }

    /// Release the branch until it reaches its next suspension point.
    ///
    /// # Errors
    ///
    /// Returns the body's error if it fails while running.
    pub fn advance(&mut self) -> Result<(), SequenceError> {
        if self.body.is_none() {
            return Ok(());
        }
        self.state.borrow_mut().record_mut(&self.id)?.status = ThreadStatus::Active;
        tracing::trace!(thread = %self.id, "advance");
        self.poll_body()
    }

    /// Report that `cycles` global cycles were just emitted.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::PendingUnderflow`] if more cycles were granted
    /// than this thread had pending.
    pub fn executed_cycles(&self, cycles: u64) -> Result<(), SequenceError> {
        let mut state = self.state.borrow_mut();
        let record = state.record_mut(&self.id)?;
        if let Some(pending) = record.pending_cycles {
            let left = pending
                .checked_sub(cycles)
                .ok_or_else(|| SequenceError::PendingUnderflow {
                    thread: self.id.clone(),
                    pending,
                    granted: cycles,
                })?;
            record.pending_cycles = Some(left);
            record.granted_cycles += cycles;
        }
        Ok(())
    }

    /// Cycles requested but not yet granted.
    #[must_use]
    pub fn pending_cycles(&self) -> Option<u64> {
        self.state
            .borrow()
            .threads
            .get(&self.id)
            .and_then(|record| record.pending_cycles)
    }

    /// Whether the body has returned.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.body.is_none()
    }

    fn poll_body(&mut self) -> Result<(), SequenceError> {
        let Some(body) = self.body.as_mut() else {
            return Ok(());
        };
        self.state.borrow_mut().record_mut(&self.id)?.parked = false;

        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        match body.as_mut().poll(&mut cx) {
            Poll::Pending => {
                let mut state = self.state.borrow_mut();
                let record = state.record_mut(&self.id)?;
                if !record.parked {
                    return Err(SequenceError::ForeignAwait(self.id.clone()));
                }
                record.status = ThreadStatus::Waiting;
                Ok(())
            }
            Poll::Ready(result) => {
                self.body = None;
                self.complete()?;
                result.map_err(|err| err.in_thread(&self.id))
            }
        }
    }

    fn complete(&mut self) -> Result<(), SequenceError> {
        let mut state = self.state.borrow_mut();
        let cycle = state.clock.cycle;
        let record = state.record_mut(&self.id)?;
        record.completed = true;
        record.cycle_count_stop = Some(cycle);
        record.status = ThreadStatus::Stopped;
        record.blocked_on = None;
        record.record(ThreadState::Stopped, cycle);
        state.bump_epoch();
        tracing::info!(thread = %self.id, cycle, "thread completed");
        Ok(())
    }
}
