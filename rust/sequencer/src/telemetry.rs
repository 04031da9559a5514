//! Tracing conventions for sequence execution.
//!
//! # Span Fields
//!
//! The root `sequence.execute` span carries:
//! - `sequence`: name of the pattern sequence
//!
//! Tick and emit events carry `tick`, `cycle` and `emitted`; thread
//! events carry `thread`.
//!
//! # Event Targets
//!
//! - `sequence.tick`: one scheduler tick finished (debug)
//! - `sequence.emit`: cycles handed to the sink (debug)
//! - `sequence.deadlock`: no thread can make progress (warn)
//! - `sequence.complete`: every thread finished (info)
//! - `sequence.profile`: rendered execution profile (info)

use tracing::{info_span, Span};

/// Event targets.
pub mod events {
    /// Scheduler tick finished
    pub const TICK: &str = "sequence.tick";
    /// Cycles emitted
    pub const EMIT: &str = "sequence.emit";
    /// Deadlock detected
    pub const DEADLOCK: &str = "sequence.deadlock";
    /// Sequence finished
    pub const COMPLETE: &str = "sequence.complete";
    /// Execution profile
    pub const PROFILE: &str = "sequence.profile";
}

/// Root span for one call to [`crate::PatternSequence::execute`].
pub fn execute_span(sequence: &str) -> Span {
    info_span!("sequence.execute", sequence = sequence)
}

/// Log one emitted batch.
pub fn trace_emit(tick: u64, cycle: u64, cycles: u64, frame: &str) {
    tracing::debug!(
        target: events::EMIT,
        tick,
        cycle,
        emitted = cycles,
        frame,
        "emitting cycles"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::span::{Attributes, Id, Record};
    use tracing::{Event, Metadata, Subscriber};

    use super::*;

    #[derive(Clone, Default)]
    struct Targets(Arc<Mutex<Vec<String>>>);

    impl Subscriber for Targets {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _: &Attributes<'_>) -> Id {
            Id::from_u64(1)
        }
        fn record(&self, _: &Id, _: &Record<'_>) {}
        fn record_follows_from(&self, _: &Id, _: &Id) {}
        fn event(&self, event: &Event<'_>) {
            if let Ok(mut targets) = self.0.lock() {
                targets.push(event.metadata().target().to_string());
            }
        }
        fn enter(&self, _: &Id) {}
        fn exit(&self, _: &Id) {}
    }

    #[test]
    fn test_emit_uses_event_target() {
        let targets = Targets::default();
        tracing::subscriber::with_default(targets.clone(), || {
            trace_emit(1, 0, 4, "01");
        });
        assert_eq!(*targets.0.lock().unwrap(), vec![events::EMIT.to_string()]);
    }
}
