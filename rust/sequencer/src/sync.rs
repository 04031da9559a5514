//! Synchronization state: sync-up barriers and serialize locks.
//!
//! Both are plain data owned by the sequence state. The suspension logic that
//! consults them lives on [`crate::Branch`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::thread::ThreadId;

/// Options for [`crate::Branch::sync_up`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Include the main branch when the participant list defaults to all.
    #[serde(default)]
    pub include_main: bool,
}

impl SyncOptions {
    /// Options that make main a participant of an "all" barrier.
    #[must_use]
    pub fn with_main() -> Self {
        Self { include_main: true }
    }
}

/// One generation of a barrier at a location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarrierRecord {
    /// Generation number, incremented each time the location is reused.
    pub generation: u64,
    /// Threads that must arrive.
    pub required: BTreeSet<ThreadId>,
    /// Threads that have arrived.
    pub arrived: BTreeSet<ThreadId>,
    /// Whether every required thread has arrived.
    pub completed: bool,
    /// Tick on which the last required thread arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_tick: Option<u64>,
}

impl BarrierRecord {
    fn refresh(&mut self, tick: u64) {
        self.completed = self.required.is_subset(&self.arrived);
        if self.completed && self.completed_tick.is_none() {
            self.completed_tick = Some(tick);
        }
    }
}

/// Barriers keyed by location.
#[derive(Debug, Clone, Default)]
pub(crate) struct Barriers {
    records: BTreeMap<String, BarrierRecord>,
}

impl Barriers {
    /// Register an arrival and return the generation joined.
    ///
    /// A location whose previous barrier already completed starts a fresh
    /// generation.
    pub(crate) fn arrive(
        &mut self,
        location: &str,
        required: BTreeSet<ThreadId>,
        thread: &ThreadId,
        tick: u64,
    ) -> u64 {
        let record = self.records.entry(location.to_string()).or_default();
        if record.completed {
            *record = BarrierRecord {
                generation: record.generation + 1,
                ..BarrierRecord::default()
            };
        }
        record.required.extend(required);
        record.arrived.insert(thread.clone());
        record.refresh(tick);
        tracing::debug!(
            location,
            generation = record.generation,
            arrived = record.arrived.len(),
            required = record.required.len(),
            "sync_up arrival"
        );
        record.generation
    }

    /// Whether the given generation at `location` has been released as of
    /// `tick`.
    ///
    /// A generation is released on the tick after the one it completed on,
    /// so every participant leaves together whatever its insertion order.
    pub(crate) fn released(&self, location: &str, generation: u64, tick: u64) -> bool {
        self.records.get(location).map_or(true, |record| {
            record.generation > generation
                || record.completed_tick.is_some_and(|completed| tick > completed)
        })
    }

    /// Current record at a location.
    pub(crate) fn get(&self, location: &str) -> Option<&BarrierRecord> {
        self.records.get(location)
    }
}

/// Explicit handle to a serialize lock.
///
/// Created once per name by [`crate::PatternSequence::serialize_lock`] or
/// [`crate::Branch::serialize_lock`] and passed to the blocks that need it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SerializeLock {
    pub(crate) index: usize,
    pub(crate) name: String,
}

impl SerializeLock {
    /// Lock name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct LockState {
    pub(crate) name: String,
    pub(crate) holder: Option<ThreadId>,
    pub(crate) depth: usize,
}

/// Serialize lock table.
#[derive(Debug, Clone, Default)]
pub(crate) struct Locks {
    locks: Vec<LockState>,
    by_name: BTreeMap<String, usize>,
}

impl Locks {
    /// Handle for `name`, creating the lock on first use.
    pub(crate) fn handle(&mut self, name: &str) -> SerializeLock {
        let index = *self.by_name.entry(name.to_string()).or_insert_with(|| {
            self.locks.push(LockState {
                name: name.to_string(),
                ..LockState::default()
            });
            self.locks.len() - 1
        });
        SerializeLock {
            index,
            name: name.to_string(),
        }
    }

    /// Try to take the lock. Re-entrant for the current holder.
    pub(crate) fn try_acquire(&mut self, lock: &SerializeLock, thread: &ThreadId) -> Option<bool> {
        let state = self.get_mut(lock)?;
        match &state.holder {
            Some(holder) if holder != thread => Some(false),
            _ => {
                state.holder = Some(thread.clone());
                state.depth += 1;
                Some(true)
            }
        }
    }

    /// Release one level of the lock held by `thread`.
    pub(crate) fn release(&mut self, lock: &SerializeLock, thread: &ThreadId) {
        let Some(state) = self.get_mut(lock) else {
            return;
        };
        if state.holder.as_ref() != Some(thread) {
            return;
        }
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.holder = None;
        }
    }

    /// Current holder of a lock.
    pub(crate) fn holder(&self, lock: &SerializeLock) -> Option<&ThreadId> {
        self.locks.get(lock.index)?.holder.as_ref()
    }

    fn get_mut(&mut self, lock: &SerializeLock) -> Option<&mut LockState> {
        self.locks
            .get_mut(lock.index)
            .filter(|state| state.name == lock.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> BTreeSet<ThreadId> {
        names.iter().map(|n| ThreadId::from(*n)).collect()
    }

    #[test]
    fn test_barrier_completes_when_all_arrive() {
        let mut barriers = Barriers::default();
        let required = ids(&["x", "y"]);
        let gen = barriers.arrive("loc", required.clone(), &ThreadId::from("x"), 1);
        assert!(!barriers.released("loc", gen, 1));
        let gen_y = barriers.arrive("loc", required, &ThreadId::from("y"), 3);
        assert_eq!(gen, gen_y);
        assert_eq!(barriers.get("loc").and_then(|r| r.completed_tick), Some(3));
        assert!(!barriers.released("loc", gen, 3));
        assert!(barriers.released("loc", gen, 4));
    }

    #[test]
    fn test_barrier_reuse_starts_fresh_generation() {
        let mut barriers = Barriers::default();
        let required = ids(&["x"]);
        let first = barriers.arrive("loc", required.clone(), &ThreadId::from("x"), 1);
        let second = barriers.arrive("loc", ids(&["x", "y"]), &ThreadId::from("x"), 2);
        assert_eq!(second, first + 1);
        assert!(barriers.released("loc", first, 2));
        assert!(!barriers.released("loc", second, 9));
        assert_eq!(barriers.get("loc").map(|r| r.arrived.len()), Some(1));
    }

    #[test]
    fn test_lock_is_reentrant_for_holder_only() {
        let mut locks = Locks::default();
        let lock = locks.handle("counter");
        assert_eq!(locks.handle("counter"), lock);
        let a = ThreadId::from("a");
        let b = ThreadId::from("b");
        assert_eq!(locks.try_acquire(&lock, &a), Some(true));
        assert_eq!(locks.try_acquire(&lock, &a), Some(true));
        assert_eq!(locks.try_acquire(&lock, &b), Some(false));
        locks.release(&lock, &a);
        assert_eq!(locks.holder(&lock), Some(&a));
        locks.release(&lock, &a);
        assert_eq!(locks.holder(&lock), None);
        assert_eq!(locks.try_acquire(&lock, &b), Some(true));
    }

    #[test]
    fn test_foreign_lock_is_rejected() {
        let mut locks = Locks::default();
        let foreign = SerializeLock {
            index: 0,
            name: "elsewhere".to_string(),
        };
        assert_eq!(locks.try_acquire(&foreign, &ThreadId::from("a")), None);
    }
}
