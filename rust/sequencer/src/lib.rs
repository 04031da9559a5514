//! Deterministic, cycle-accurate scheduler for parallel pattern branches.
//!
//! A pattern is written as a main branch that may spawn parallel branches.
//! Every branch is an `async` body that talks to the sequence through a
//! [`Branch`] context. The scheduler polls one branch at a time and emits
//! tester cycles in batches equal to the minimum outstanding request, so the
//! cycle stream is identical on every run.
//!
//! # Architecture
//!
//! - **Clock** ([`clock::CycleClock`]): global cycle and tick counters
//! - **Threads** ([`thread::ThreadHandle`]): start/advance handshake per branch
//! - **Branch** ([`branch::Branch`]): cycle requests, waits, barriers, locks
//! - **Sequence** ([`sequence::PatternSequence`]): the scheduler loop
//! - **Sync** ([`sync`]): sync-up barriers and serialize locks
//! - **Library** ([`library::PatternLibrary`]): named sub-patterns for `run`
//! - **Tester** ([`tester::CycleSink`]): the hand-off to vector generation
//! - **Profile** ([`profile::ExecutionProfile`]): per-thread timeline
//!
//! # Usage
//!
//! ```
//! use patseq_sequencer::{PatternSequence, RecordingSink};
//!
//! let seq = PatternSequence::new("handshake", |main| async move {
//!     main.thread(Some("a"), |a| async move { a.cycle(5).await })?;
//!     main.thread(Some("b"), |b| async move { b.cycle(3).await })?;
//!     main.wait_for_threads_to_complete(["a", "b"]).await
//! });
//! let mut sink = RecordingSink::new();
//! let report = seq.execute(&mut sink)?;
//! assert_eq!(report.cycles, 5);
//! # Ok::<(), patseq_sequencer::SequenceError>(())
//! ```

pub mod branch;
pub mod clock;
pub mod config;
pub mod error;
pub mod library;
pub mod profile;
pub mod sequence;
pub mod sync;
pub mod telemetry;
pub mod tester;
pub mod thread;
pub mod trace;

pub use branch::Branch;
pub use clock::CycleClock;
pub use config::{ProfileConfig, SequenceConfig};
pub use error::SequenceError;
pub use library::{PatternFn, PatternLibrary};
pub use profile::{ExecutionProfile, ProfileInterval, ThreadProfile};
pub use sequence::PatternSequence;
pub use sync::{BarrierRecord, SerializeLock, SyncOptions};
pub use tester::{CycleSink, PinFrame, RecordingSink, SinkRecord};
pub use thread::{
    BlockReason, BranchResult, ThreadEvent, ThreadHandle, ThreadId, ThreadState, ThreadStatus,
};
pub use trace::{Emission, SequenceReport, ThreadSummary};
