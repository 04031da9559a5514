//! Pattern sequence: the deterministic scheduler.
//!
//! Each tick of [`PatternSequence::execute`]:
//!
//! 1. advances every active thread once, in insertion order;
//! 2. takes the minimum pending cycle request across active threads;
//! 3. emits exactly that many cycles and credits every thread;
//! 4. starts threads queued during the tick.
//!
//! Since only one body runs at a time and the clock only moves by the
//! computed minimum, the emitted stream depends on nothing but the bodies.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::FutureExt;

use crate::branch::{spawn_thread, Branch};
use crate::clock::CycleClock;
use crate::config::SequenceConfig;
use crate::error::SequenceError;
use crate::library::PatternLibrary;
use crate::profile::ExecutionProfile;
use crate::sync::{Barriers, Locks, SerializeLock};
use crate::telemetry;
use crate::tester::{CycleSink, PinFrame};
use crate::thread::{BranchFuture, BranchResult, ThreadHandle, ThreadId, ThreadRecord};
use crate::trace::{Emission, SequenceReport, ThreadSummary};

/// State shared between the scheduler and every [`Branch`].
pub(crate) struct SequenceState {
    pub(crate) name: String,
    pub(crate) config: SequenceConfig,
    pub(crate) clock: CycleClock,
    pub(crate) threads: BTreeMap<ThreadId, ThreadRecord>,
    /// Registration order.
    pub(crate) order: Vec<ThreadId>,
    /// Started and not yet finished, in insertion order.
    pub(crate) active: Vec<ThreadId>,
    /// Registered this tick, started at its end.
    pub(crate) queued: Vec<(ThreadId, BranchFuture)>,
    pub(crate) barriers: Barriers,
    pub(crate) locks: Locks,
    pub(crate) frame: PinFrame,
    pub(crate) comments: Vec<String>,
    pub(crate) library: PatternLibrary,
    /// Bumped on every change another thread could be waiting for.
    pub(crate) epoch: u64,
    next_auto_id: u64,
}

impl SequenceState {
    fn new(name: String) -> Self {
        Self {
            name,
            config: SequenceConfig::default(),
            clock: CycleClock::new(),
            threads: BTreeMap::new(),
            order: Vec::new(),
            active: Vec::new(),
            queued: Vec::new(),
            barriers: Barriers::default(),
            locks: Locks::default(),
            frame: PinFrame::new(),
            comments: Vec::new(),
            library: PatternLibrary::new(),
            epoch: 0,
            next_auto_id: 1,
        }
    }

    pub(crate) fn record_mut(&mut self, id: &ThreadId) -> Result<&mut ThreadRecord, SequenceError> {
        self.threads
            .get_mut(id)
            .ok_or_else(|| SequenceError::MissingThread(id.clone()))
    }

    pub(crate) fn bump_epoch(&mut self) {
        self.epoch += 1;
    }

    pub(crate) fn has_threads_waiting_to_start(&self) -> bool {
        !self.queued.is_empty()
    }

    pub(crate) fn is_completed(&self, id: &ThreadId) -> bool {
        self.threads.get(id).is_some_and(|record| record.completed)
    }

    /// Registered threads whose bodies have not returned, in registration order.
    pub(crate) fn unfinished_threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.order
            .iter()
            .filter(|id| !self.is_completed(id))
            .cloned()
    }

    /// Reserve a thread id and create its record.
    pub(crate) fn register(&mut self, id: Option<&str>) -> Result<ThreadId, SequenceError> {
        let id = match id {
            Some(id) => {
                let id = ThreadId::from(id);
                if self.threads.contains_key(&id) {
                    return Err(SequenceError::DuplicateThread(id));
                }
                id
            }
            None => loop {
                let candidate = ThreadId::from(format!("thread{}", self.next_auto_id));
                self.next_auto_id += 1;
                if !self.threads.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        self.threads.insert(id.clone(), ThreadRecord::default());
        self.order.push(id.clone());
        self.bump_epoch();
        Ok(id)
    }
}

type StartHook = Box<dyn FnMut(&ThreadId, u64)>;

/// A pattern described as a main body plus any parallel threads it spawns.
pub struct PatternSequence {
    name: String,
    state: Rc<RefCell<SequenceState>>,
    main: BranchFuture,
    before_start: Option<StartHook>,
}

impl fmt::Debug for PatternSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternSequence")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PatternSequence {
    /// Create a sequence with the body of its main thread.
    pub fn new<F, Fut>(name: impl Into<String>, main: F) -> Self
    where
        F: FnOnce(Branch) -> Fut,
        Fut: Future<Output = BranchResult> + 'static,
    {
        let name = name.into();
        let state = Rc::new(RefCell::new(SequenceState::new(name.clone())));
        let main_id = ThreadId::main();
        {
            let mut st = state.borrow_mut();
            st.threads.insert(main_id.clone(), ThreadRecord::default());
            st.order.push(main_id.clone());
        }
        let main = main(Branch::new(main_id, Rc::clone(&state))).boxed_local();
        Self {
            name,
            state,
            main,
            before_start: None,
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(self, config: SequenceConfig) -> Self {
        self.state.borrow_mut().config = config;
        self
    }

    /// Attach a library of sub-patterns for [`Branch::run`].
    #[must_use]
    pub fn with_library(self, library: PatternLibrary) -> Self {
        self.state.borrow_mut().library = library;
        self
    }

    /// Call `hook` with the thread id and current cycle just before each
    /// thread starts.
    #[must_use]
    pub fn before_thread_start(mut self, hook: impl FnMut(&ThreadId, u64) + 'static) -> Self {
        self.before_start = Some(Box::new(hook));
        self
    }

    /// Sequence name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle for the serialize lock called `name`.
    #[must_use]
    pub fn serialize_lock(&self, name: &str) -> SerializeLock {
        self.state.borrow_mut().locks.handle(name)
    }

    /// Register a thread before execution starts. It starts at the end of the
    /// first tick, like a thread registered by main.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::DuplicateThread`] if `id` is taken.
    pub fn thread<F, Fut>(&self, id: Option<&str>, body: F) -> Result<ThreadId, SequenceError>
    where
        F: FnOnce(Branch) -> Fut,
        Fut: Future<Output = BranchResult> + 'static,
    {
        spawn_thread(&self.state, id, body)
    }

    /// Alias of [`PatternSequence::thread`].
    ///
    /// # Errors
    ///
    /// See [`PatternSequence::thread`].
    pub fn in_parallel<F, Fut>(&self, id: Option<&str>, body: F) -> Result<ThreadId, SequenceError>
    where
        F: FnOnce(Branch) -> Fut,
        Fut: Future<Output = BranchResult> + 'static,
    {
        self.thread(id, body)
    }

    /// Run the sequence to completion, emitting cycles into `sink`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a thread body (wrapped with its
    /// thread id), a scheduler invariant violation, a sink failure, a
    /// detected deadlock, or [`SequenceError::TickLimit`].
    pub fn execute<S>(mut self, sink: &mut S) -> Result<SequenceReport, SequenceError>
    where
        S: CycleSink + ?Sized,
    {
        let span = telemetry::execute_span(&self.name);
        let _entered = span.enter();

        let config = self.state.borrow().config.clone();
        config.validate()?;

        let main = std::mem::replace(&mut self.main, futures::future::ready(Ok(())).boxed_local());
        let mut handles = Vec::new();
        self.start_thread(
            ThreadHandle::new(ThreadId::main(), main, Rc::clone(&self.state)),
            &mut handles,
        )?;

        let mut emissions = Vec::new();
        while !handles.is_empty() {
            let (tick, epoch_before) = {
                let mut state = self.state.borrow_mut();
                state.clock.begin_tick();
                (state.clock.tick, state.epoch)
            };
            if let Some(limit) = config.max_ticks {
                if tick > limit {
                    return Err(SequenceError::TickLimit {
                        limit,
                        cycle: self.state.borrow().clock.cycle,
                    });
                }
            }

            for handle in &mut handles {
                handle.advance()?;
            }
            self.retire(&mut handles);

            let cycles = handles
                .iter()
                .filter_map(ThreadHandle::pending_cycles)
                .filter(|pending| *pending > 0)
                .min();

            self.flush_comments(sink);
            if let Some(cycles) = cycles {
                emissions.push(self.emit(sink, &handles, tick, cycles)?);
            }

            let started = self.start_queued(&mut handles)?;

            tracing::debug!(
                target: telemetry::events::TICK,
                tick,
                cycle = self.state.borrow().clock.cycle,
                emitted = cycles.unwrap_or(0),
                started,
                active = handles.len(),
                "tick"
            );

            if config.deadlock_detection
                && cycles.is_none()
                && started == 0
                && !handles.is_empty()
                && self.state.borrow().epoch == epoch_before
            {
                return Err(self.deadlock());
            }
        }
        self.flush_comments(sink);

        let report = self.report(emissions);
        if config.profile.enabled {
            ExecutionProfile::from_report(&report).log(config.profile.columns);
        }
        tracing::info!(
            target: telemetry::events::COMPLETE,
            sequence = %self.name,
            cycles = report.cycles,
            ticks = report.ticks,
            "sequence complete"
        );
        Ok(report)
    }

    fn emit<S>(
        &self,
        sink: &mut S,
        handles: &[ThreadHandle],
        tick: u64,
        cycles: u64,
    ) -> Result<Emission, SequenceError>
    where
        S: CycleSink + ?Sized,
    {
        let (frame, start) = {
            let state = self.state.borrow();
            (state.frame.clone(), state.clock.cycle)
        };
        let threads = handles
            .iter()
            .filter(|handle| handle.pending_cycles().is_some_and(|p| p > 0))
            .map(|handle| handle.id().clone())
            .collect();

        telemetry::trace_emit(tick, start, cycles, &frame.to_string());
        sink.emit(&frame, cycles).map_err(SequenceError::Sink)?;
        self.state.borrow_mut().clock.advance(cycles);
        for handle in handles {
            handle.executed_cycles(cycles)?;
        }
        Ok(Emission {
            tick,
            cycle: start,
            cycles,
            frame,
            threads,
        })
    }

    fn start_thread(
        &mut self,
        mut handle: ThreadHandle,
        handles: &mut Vec<ThreadHandle>,
    ) -> Result<(), SequenceError> {
        if let Some(hook) = self.before_start.as_mut() {
            let cycle = self.state.borrow().clock.cycle;
            hook(handle.id(), cycle);
        }
        self.state.borrow_mut().active.push(handle.id().clone());
        handle.start()?;
        handles.push(handle);
        self.retire(handles);
        Ok(())
    }

    fn start_queued(&mut self, handles: &mut Vec<ThreadHandle>) -> Result<usize, SequenceError> {
        let queued = std::mem::take(&mut self.state.borrow_mut().queued);
        let started = queued.len();
        for (id, body) in queued {
            let handle = ThreadHandle::new(id, body, Rc::clone(&self.state));
            self.start_thread(handle, handles)?;
        }
        Ok(started)
    }

    fn retire(&self, handles: &mut Vec<ThreadHandle>) {
        if handles.iter().all(|handle| !handle.is_completed()) {
            return;
        }
        handles.retain(|handle| !handle.is_completed());
        let mut state = self.state.borrow_mut();
        let SequenceState {
            active, threads, ..
        } = &mut *state;
        active.retain(|id| threads.get(id).is_some_and(|record| !record.completed));
    }

    fn flush_comments<S>(&self, sink: &mut S)
    where
        S: CycleSink + ?Sized,
    {
        let comments = std::mem::take(&mut self.state.borrow_mut().comments);
        for comment in &comments {
            sink.comment(comment);
        }
    }

    fn deadlock(&self) -> SequenceError {
        let state = self.state.borrow();
        let blocked: Vec<_> = state
            .active
            .iter()
            .map(|id| {
                let reason = state.threads.get(id).and_then(|r| r.blocked_on.clone());
                (id.clone(), reason)
            })
            .collect();
        tracing::warn!(
            target: telemetry::events::DEADLOCK,
            sequence = %self.name,
            cycle = state.clock.cycle,
            blocked = blocked.len(),
            "no thread can make progress"
        );
        SequenceError::Deadlock {
            cycle: state.clock.cycle,
            blocked,
        }
    }

    fn report(&self, emissions: Vec<Emission>) -> SequenceReport {
        let state = self.state.borrow();
        let threads = state
            .order
            .iter()
            .filter_map(|id| {
                state.threads.get(id).map(|record| ThreadSummary {
                    id: id.clone(),
                    status: record.status,
                    cycle_count_start: record.cycle_count_start,
                    cycle_count_stop: record.cycle_count_stop,
                    events: record.events.clone(),
                    completed: record.completed,
                    requested_cycles: record.requested_cycles,
                    granted_cycles: record.granted_cycles,
                })
            })
            .collect();
        SequenceReport {
            name: state.name.clone(),
            cycles: state.clock.cycle,
            ticks: state.clock.tick,
            threads,
            emissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tester::RecordingSink;

    #[test]
    fn test_auto_ids_skip_taken_names() {
        let seq = PatternSequence::new("auto", |_branch| async { Ok(()) });
        seq.thread(Some("thread1"), |_b| async { Ok(()) }).unwrap();
        let id = seq.thread(None, |_b| async { Ok(()) }).unwrap();
        assert_eq!(id.as_str(), "thread2");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let seq = PatternSequence::new("dup", |_branch| async { Ok(()) });
        seq.thread(Some("a"), |_b| async { Ok(()) }).unwrap();
        let err = seq.thread(Some("a"), |_b| async { Ok(()) }).unwrap_err();
        assert!(matches!(err, SequenceError::DuplicateThread(id) if id.as_str() == "a"));
        let err = seq.thread(Some("main"), |_b| async { Ok(()) }).unwrap_err();
        assert!(matches!(err, SequenceError::DuplicateThread(_)));
    }

    #[test]
    fn test_main_only_sequence() {
        let seq = PatternSequence::new("solo", |branch| async move {
            branch.drive("tck", '1');
            branch.cycle(4).await?;
            branch.drive("tck", '0');
            branch.cycle_once().await
        });
        let mut sink = RecordingSink::new();
        let report = seq.execute(&mut sink).unwrap();
        assert_eq!(report.cycles, 5);
        assert_eq!(report.emitted_batches(), vec![4, 1]);
        assert_eq!(sink.expanded(), vec!["1", "1", "1", "1", "0"]);
        let main = report.thread("main").unwrap();
        assert_eq!(main.cycle_count_start, Some(0));
        assert_eq!(main.cycle_count_stop, Some(5));
        assert!(main.completed);
    }

    #[test]
    fn test_before_thread_start_hook_sees_start_cycles() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let seq = PatternSequence::new("hook", |branch| async move {
            branch.thread(Some("child"), |b| async move { b.cycle(1).await })?;
            branch.cycle(3).await
        })
        .before_thread_start(move |id, cycle| log.borrow_mut().push((id.to_string(), cycle)));
        seq.execute(&mut RecordingSink::new()).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![("main".to_string(), 0), ("child".to_string(), 1)]
        );
    }

    #[test]
    fn test_foreign_await_is_rejected() {
        let seq = PatternSequence::new("foreign", |_branch| async {
            futures::future::pending::<()>().await;
            Ok(())
        });
        let err = seq.execute(&mut RecordingSink::new()).unwrap_err();
        assert!(matches!(err, SequenceError::ForeignAwait(id) if id.is_main()));
    }
}
