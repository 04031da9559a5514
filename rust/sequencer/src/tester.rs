//! Hand-off to the tester layer.
//!
//! The scheduler knows nothing about vector encoding. When it emits cycles it
//! passes the current [`PinFrame`] and a cycle count to a [`CycleSink`], which
//! is free to format, compress or discard them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Current drive state of every pin touched by any branch.
///
/// Pins are kept in name order so that the frame renders identically on
/// every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinFrame {
    pins: BTreeMap<String, char>,
}

impl PinFrame {
    /// Empty frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state character of a pin.
    pub fn drive(&mut self, pin: impl Into<String>, state: char) {
        self.pins.insert(pin.into(), state);
    }

    /// State of one pin.
    #[must_use]
    pub fn get(&self, pin: &str) -> Option<char> {
        self.pins.get(pin).copied()
    }

    /// Pins in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, char)> {
        self.pins.iter().map(|(pin, state)| (pin.as_str(), *state))
    }

    /// Whether no pin has been driven.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

impl fmt::Display for PinFrame {
    /// Pin states concatenated in pin-name order, e.g. `01X`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for state in self.pins.values() {
            write!(f, "{state}")?;
        }
        Ok(())
    }
}

/// The tester primitive consumed by the scheduler: "emit N cycles now".
pub trait CycleSink {
    /// Emit `cycles` cycles of `frame`.
    ///
    /// # Errors
    ///
    /// Returns an error string if the tester cannot accept the cycles; the
    /// sequence aborts with [`crate::SequenceError::Sink`].
    fn emit(&mut self, frame: &PinFrame, cycles: u64) -> Result<(), String>;

    /// Attach a comment before the next emitted cycle.
    fn comment(&mut self, _text: &str) {}
}

impl<S: CycleSink + ?Sized> CycleSink for &mut S {
    fn emit(&mut self, frame: &PinFrame, cycles: u64) -> Result<(), String> {
        (**self).emit(frame, cycles)
    }

    fn comment(&mut self, text: &str) {
        (**self).comment(text);
    }
}

/// One emission captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkRecord {
    /// A comment.
    Comment(String),
    /// A run of identical cycles.
    Cycles {
        /// Frame emitted.
        frame: PinFrame,
        /// Number of cycles.
        cycles: u64,
    },
}

/// Sink that keeps every emission in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Vec<SinkRecord>,
}

impl RecordingSink {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn records(&self) -> &[SinkRecord] {
        &self.records
    }

    /// Total cycles recorded.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.records
            .iter()
            .map(|record| match record {
                SinkRecord::Cycles { cycles, .. } => *cycles,
                SinkRecord::Comment(_) => 0,
            })
            .sum()
    }

    /// Expand the recording into one rendered frame per cycle.
    #[must_use]
    pub fn expanded(&self) -> Vec<String> {
        let mut out = Vec::new();
        for record in &self.records {
            if let SinkRecord::Cycles { frame, cycles } = record {
                let rendered = frame.to_string();
                for _ in 0..*cycles {
                    out.push(rendered.clone());
                }
            }
        }
        out
    }
}

impl CycleSink for RecordingSink {
    fn emit(&mut self, frame: &PinFrame, cycles: u64) -> Result<(), String> {
        self.records.push(SinkRecord::Cycles {
            frame: frame.clone(),
            cycles,
        });
        Ok(())
    }

    fn comment(&mut self, text: &str) {
        self.records.push(SinkRecord::Comment(text.to_string()));
    }
}
