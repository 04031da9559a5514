//! The context handed to every branch body.
//!
//! A [`Branch`] is the explicit replacement for "current sequence" and
//! "current thread" globals: it names the thread it belongs to and shares the
//! sequence state. All operations a pattern body can perform live here.
//!
//! No method holds a borrow of the shared state across an `.await`.
//!
//! Parking is only reachable through the blocking operations, which record
//! what the thread is blocked on:
//!
//! ```compile_fail
//! use patseq_sequencer::{PatternSequence, RecordingSink};
//!
//! let seq = PatternSequence::new("park", |main| async move {
//!     main.waiting_for_thread(false).await;
//!     main.cycle(1).await
//! });
//! seq.execute(&mut RecordingSink::new()).unwrap();
//! ```

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::FutureExt;

use crate::error::SequenceError;
use crate::sequence::SequenceState;
use crate::sync::{BarrierRecord, SerializeLock, SyncOptions};
use crate::thread::{BlockReason, BranchResult, Suspend, ThreadId, ThreadState};

/// Handle through which a branch body talks to its sequence.
#[derive(Clone)]
pub struct Branch {
    id: ThreadId,
    state: Rc<RefCell<SequenceState>>,
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch").field("id", &self.id).finish()
    }
}

/// Wait target resolved from a list of ids.
enum WaitTargets {
    All,
    Named(Vec<ThreadId>),
}

impl Branch {
    pub(crate) fn new(id: ThreadId, state: Rc<RefCell<SequenceState>>) -> Self {
        Self { id, state }
    }

    /// Id of the thread this branch runs in.
    #[must_use]
    pub fn id(&self) -> &ThreadId {
        &self.id
    }

    /// Name of the owning sequence.
    #[must_use]
    pub fn sequence_name(&self) -> String {
        self.state.borrow().name.clone()
    }

    /// Global cycles emitted so far.
    #[must_use]
    pub fn cycle_count(&self) -> u64 {
        self.state.borrow().clock.cycle
    }

    /// Set a pin's drive state for subsequent cycles.
    pub fn drive(&self, pin: impl Into<String>, state: char) {
        self.state.borrow_mut().frame.drive(pin, state);
    }

    /// Queue a comment ahead of the next emitted cycles.
    pub fn comment(&self, text: impl Into<String>) {
        self.state.borrow_mut().comments.push(text.into());
    }

    /// Request `repeat` cycles and park until all of them have been emitted.
    ///
    /// The scheduler grants the minimum pending request across all threads
    /// each tick, so a long request may be satisfied over several ticks.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::PendingOverlap`] if a request is already
    /// outstanding for this thread.
    pub async fn cycle(&self, repeat: u64) -> BranchResult {
        if repeat == 0 {
            return Ok(());
        }
        self.state.borrow_mut().record_mut(&self.id)?.requested_cycles += repeat;

        let mut remaining = repeat;
        while remaining > 0 {
            let ask = self.request_cycles(remaining)?;
            self.suspend().await;
            let left = self.take_pending(ask)?;
            remaining -= ask - left;
        }
        Ok(())
    }

    /// Request a single cycle.
    ///
    /// # Errors
    ///
    /// See [`Branch::cycle`].
    pub async fn cycle_once(&self) -> BranchResult {
        self.cycle(1).await
    }

    /// Register a parallel branch. It starts at the end of the current tick.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::DuplicateThread`] if `id` is already taken.
    pub fn thread<F, Fut>(&self, id: Option<&str>, body: F) -> Result<ThreadId, SequenceError>
    where
        F: FnOnce(Branch) -> Fut,
        Fut: Future<Output = BranchResult> + 'static,
    {
        spawn_thread(&self.state, id, body)
    }

    /// Alias of [`Branch::thread`].
    ///
    /// # Errors
    ///
    /// See [`Branch::thread`].
    pub fn in_parallel<F, Fut>(&self, id: Option<&str>, body: F) -> Result<ThreadId, SequenceError>
    where
        F: FnOnce(Branch) -> Fut,
        Fut: Future<Output = BranchResult> + 'static,
    {
        self.thread(id, body)
    }

    /// Park until the named threads have completed.
    ///
    /// An empty list, or one containing `all`, waits for every thread except
    /// the caller and, when the caller is not main, main.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::UnknownThread`] for an unregistered id and
    /// [`SequenceError::SelfWait`] if the caller names itself.
    pub async fn wait_for_threads_to_complete<I, T>(&self, ids: I) -> BranchResult
    where
        I: IntoIterator<Item = T>,
        T: Into<ThreadId>,
    {
        let targets = self.resolve_wait_targets(ids)?;
        if let WaitTargets::Named(named) = &targets {
            if named.contains(&self.id) {
                return Err(SequenceError::SelfWait(self.id.clone()));
            }
        }
        let mut skip_event = false;
        loop {
            let outstanding = self.outstanding(&targets);
            if outstanding.is_empty() {
                break;
            }
            self.set_blocked(BlockReason::Threads {
                targets: outstanding,
            })?;
            self.waiting_for_thread(skip_event).await;
            skip_event = true;
        }
        self.resume_active()
    }

    /// Park until one thread has completed.
    ///
    /// # Errors
    ///
    /// See [`Branch::wait_for_threads_to_complete`].
    pub async fn wait_for_thread(&self, id: &str) -> BranchResult {
        self.wait_for_threads_to_complete([id]).await
    }

    /// Rendezvous with other threads at `location`.
    ///
    /// With no ids (or `all`) every registered, unfinished thread takes part,
    /// main only if `options.include_main` is set. Threads outside the
    /// participant set pass straight through. All participants leave the
    /// barrier together, on the tick after the last one arrives.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::UnknownThread`] for an unregistered id.
    pub async fn sync_up<I, T>(&self, location: &str, ids: I, options: SyncOptions) -> BranchResult
    where
        I: IntoIterator<Item = T>,
        T: Into<ThreadId>,
    {
        let generation = {
            let mut state = self.state.borrow_mut();
            let required = match self.resolve_wait_targets_in(&state, ids)? {
                WaitTargets::All => state
                    .unfinished_threads()
                    .filter(|id| options.include_main || !id.is_main())
                    .collect::<BTreeSet<_>>(),
                WaitTargets::Named(named) => named.into_iter().collect(),
            };
            if !required.contains(&self.id) {
                return Ok(());
            }
            let tick = state.clock.tick;
            let generation = state.barriers.arrive(location, required, &self.id, tick);
            state.bump_epoch();
            generation
        };

        let mut skip_event = false;
        loop {
            self.set_blocked(BlockReason::Barrier {
                location: location.to_string(),
            })?;
            self.waiting_for_thread(skip_event).await;
            skip_event = true;
            let mut state = self.state.borrow_mut();
            let tick = state.clock.tick;
            if state.barriers.released(location, generation, tick) {
                state.bump_epoch();
                break;
            }
        }
        self.resume_active()
    }

    /// Handle for the serialize lock called `name`.
    #[must_use]
    pub fn serialize_lock(&self, name: &str) -> SerializeLock {
        self.state.borrow_mut().locks.handle(name)
    }

    /// Current barrier generation at `location`, if any thread has arrived.
    #[must_use]
    pub fn barrier(&self, location: &str) -> Option<BarrierRecord> {
        self.state.borrow().barriers.get(location).cloned()
    }

    /// Thread currently holding `lock`.
    #[must_use]
    pub fn lock_holder(&self, lock: &SerializeLock) -> Option<ThreadId> {
        self.state.borrow().locks.holder(lock).cloned()
    }

    /// Run `block` while holding `lock`.
    ///
    /// Other threads contending for the same lock park until it is released;
    /// everything else keeps running. The lock is re-entrant and is released
    /// whether the block succeeds or fails.
    ///
    /// # Errors
    ///
    /// Returns the block's error, or [`SequenceError::UnknownLock`] if the
    /// handle came from another sequence.
    pub async fn serialize<T, Fut>(&self, lock: &SerializeLock, block: Fut) -> Result<T, SequenceError>
    where
        Fut: Future<Output = Result<T, SequenceError>>,
    {
        let mut skip_event = false;
        loop {
            let acquired = {
                let mut state = self.state.borrow_mut();
                let acquired = state
                    .locks
                    .try_acquire(lock, &self.id)
                    .ok_or_else(|| SequenceError::UnknownLock(lock.name().to_string()))?;
                if acquired {
                    state.bump_epoch();
                }
                acquired
            };
            if acquired {
                break;
            }
            self.set_blocked(BlockReason::Serialize {
                lock: lock.name().to_string(),
            })?;
            self.waiting_for_serialize(lock, skip_event).await;
            skip_event = true;
        }
        self.resume_active()?;

        let result = block.await;

        let mut state = self.state.borrow_mut();
        state.locks.release(lock, &self.id);
        state.bump_epoch();
        result
    }

    /// Run the named sub-pattern inline, in this thread.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::UnknownPattern`] if the library has no such
    /// pattern, or the sub-pattern's own error.
    pub async fn run(&self, name: &str) -> BranchResult {
        let pattern = self
            .state
            .borrow()
            .library
            .get(name)
            .ok_or_else(|| SequenceError::UnknownPattern(name.to_string()))?;
        tracing::debug!(thread = %self.id, pattern = name, "run sub-pattern");
        pattern(self.clone()).await
    }

    /// Park because another thread must finish or arrive first.
    pub(crate) async fn waiting_for_thread(&self, skip_event: bool) {
        self.record_waiting(skip_event);
        self.suspend().await;
    }

    /// Park because `lock` is held by another thread.
    pub(crate) async fn waiting_for_serialize(&self, lock: &SerializeLock, skip_event: bool) {
        if !skip_event {
            tracing::trace!(thread = %self.id, lock = lock.name(), "waiting for serialize");
        }
        self.record_waiting(skip_event);
        self.suspend().await;
    }

    fn suspend(&self) -> Suspend {
        Suspend::new(Rc::clone(&self.state), self.id.clone())
    }

    fn request_cycles(&self, remaining: u64) -> Result<u64, SequenceError> {
        let mut state = self.state.borrow_mut();
        let deferred = remaining > 1
            && state.config.defer_repeat_for_pending_starts
            && state.has_threads_waiting_to_start();
        let ask = if deferred { 1 } else { remaining };
        let cycle = state.clock.cycle;
        let record = state.record_mut(&self.id)?;
        if let Some(pending) = record.pending_cycles.filter(|p| *p > 0) {
            return Err(SequenceError::PendingOverlap {
                thread: self.id.clone(),
                pending,
            });
        }
        record.pending_cycles = Some(ask);
        record.blocked_on = None;
        record.record(ThreadState::Active, cycle);
        state.bump_epoch();
        tracing::trace!(thread = %self.id, ask, remaining, deferred, "cycle request");
        Ok(ask)
    }

    fn take_pending(&self, ask: u64) -> Result<u64, SequenceError> {
        let mut state = self.state.borrow_mut();
        let record = state.record_mut(&self.id)?;
        Ok(record.pending_cycles.take().unwrap_or(ask))
    }

    fn record_waiting(&self, skip_event: bool) {
        if skip_event {
            return;
        }
        let mut state = self.state.borrow_mut();
        let cycle = state.clock.cycle;
        if let Some(record) = state.threads.get_mut(&self.id) {
            record.record(ThreadState::Waiting, cycle);
        }
    }

    fn set_blocked(&self, reason: BlockReason) -> Result<(), SequenceError> {
        self.state.borrow_mut().record_mut(&self.id)?.blocked_on = Some(reason);
        Ok(())
    }

    fn resume_active(&self) -> BranchResult {
        let mut state = self.state.borrow_mut();
        let cycle = state.clock.cycle;
        let record = state.record_mut(&self.id)?;
        if record.blocked_on.take().is_some() {
            record.record(ThreadState::Active, cycle);
        }
        Ok(())
    }

    fn resolve_wait_targets<I, T>(&self, ids: I) -> Result<WaitTargets, SequenceError>
    where
        I: IntoIterator<Item = T>,
        T: Into<ThreadId>,
    {
        let state = self.state.borrow();
        self.resolve_wait_targets_in(&state, ids)
    }

    fn resolve_wait_targets_in<I, T>(
        &self,
        state: &SequenceState,
        ids: I,
    ) -> Result<WaitTargets, SequenceError>
    where
        I: IntoIterator<Item = T>,
        T: Into<ThreadId>,
    {
        let named: Vec<ThreadId> = ids.into_iter().map(Into::into).collect();
        if named.is_empty() || named.iter().any(|id| id.as_str() == "all") {
            return Ok(WaitTargets::All);
        }
        for target in &named {
            if !state.threads.contains_key(target) {
                return Err(SequenceError::UnknownThread {
                    thread: self.id.clone(),
                    target: target.clone(),
                });
            }
        }
        Ok(WaitTargets::Named(named))
    }

    fn outstanding(&self, targets: &WaitTargets) -> Vec<ThreadId> {
        let state = self.state.borrow();
        match targets {
            WaitTargets::All => state
                .unfinished_threads()
                .filter(|id| *id != self.id && (self.id.is_main() || !id.is_main()))
                .collect(),
            WaitTargets::Named(named) => named
                .iter()
                .filter(|id| !state.is_completed(id))
                .cloned()
                .collect(),
        }
    }
}

/// Queue a new thread on `state`, building its body future immediately.
pub(crate) fn spawn_thread<F, Fut>(
    state: &Rc<RefCell<SequenceState>>,
    id: Option<&str>,
    body: F,
) -> Result<ThreadId, SequenceError>
where
    F: FnOnce(Branch) -> Fut,
    Fut: Future<Output = BranchResult> + 'static,
{
    let id = state.borrow_mut().register(id)?;
    let future = body(Branch::new(id.clone(), Rc::clone(state))).boxed_local();
    state.borrow_mut().queued.push((id.clone(), future));
    tracing::debug!(thread = %id, "thread queued");
    Ok(id)
}
