//! Execution profile: per-thread active and waiting intervals.

use serde::{Deserialize, Serialize};

use crate::telemetry;
use crate::thread::{ThreadId, ThreadState};
use crate::trace::SequenceReport;

/// A span of cycles a thread spent in one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileInterval {
    /// State held for the interval.
    pub state: ThreadState,
    /// First cycle.
    pub start: u64,
    /// Cycle after the last.
    pub stop: u64,
}

/// Intervals for one thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadProfile {
    /// Thread id.
    pub id: ThreadId,
    /// Non-empty intervals in order.
    pub intervals: Vec<ProfileInterval>,
}

impl ThreadProfile {
    /// Cycles spent in `state`.
    #[must_use]
    pub fn cycles_in(&self, state: ThreadState) -> u64 {
        self.intervals
            .iter()
            .filter(|i| i.state == state)
            .map(|i| i.stop - i.start)
            .sum()
    }

    fn occupies(&self, state: ThreadState, from: u64, to: u64) -> bool {
        self.intervals
            .iter()
            .any(|i| i.state == state && i.start < to && i.stop > from)
    }
}

/// Timeline of a finished sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    /// Sequence name.
    pub name: String,
    /// Total cycles.
    pub cycles: u64,
    /// One entry per thread, in registration order.
    pub threads: Vec<ThreadProfile>,
}

impl ExecutionProfile {
    /// Build the profile from each thread's event list.
    #[must_use]
    pub fn from_report(report: &SequenceReport) -> Self {
        let threads = report
            .threads
            .iter()
            .map(|thread| {
                let mut intervals = Vec::new();
                let mut events = thread.events.iter().peekable();
                while let Some(event) = events.next() {
                    if event.state == ThreadState::Stopped {
                        break;
                    }
                    let stop = events.peek().map_or(report.cycles, |next| next.cycle);
                    if stop > event.cycle {
                        intervals.push(ProfileInterval {
                            state: event.state,
                            start: event.cycle,
                            stop,
                        });
                    }
                }
                ThreadProfile {
                    id: thread.id.clone(),
                    intervals,
                }
            })
            .collect();
        Self {
            name: report.name.clone(),
            cycles: report.cycles,
            threads,
        }
    }

    /// Render the timeline in at most `columns` characters per row.
    ///
    /// `#` marks cycles where the thread was active, `-` where it waited.
    /// A column covering both shows `#`.
    #[must_use]
    pub fn render(&self, columns: usize) -> Vec<String> {
        let columns = columns.max(1) as u64;
        let per_column = self.cycles.div_ceil(columns).max(1);
        let used = self.cycles.div_ceil(per_column);
        let width = self
            .threads
            .iter()
            .map(|t| t.id.as_str().len())
            .max()
            .unwrap_or(0);

        let mut lines = vec![format!(
            "{}: cycles 0..{}, {} cycles/column",
            self.name, self.cycles, per_column
        )];
        for thread in &self.threads {
            let cells: String = (0..used)
                .map(|column| {
                    let from = column * per_column;
                    let to = from + per_column;
                    if thread.occupies(ThreadState::Active, from, to) {
                        '#'
                    } else if thread.occupies(ThreadState::Waiting, from, to) {
                        '-'
                    } else {
                        ' '
                    }
                })
                .collect();
            lines.push(format!("{:<width$} |{cells}|", thread.id.as_str()));
        }
        lines
    }

    /// Log the rendered timeline: the header, then one line per thread.
    pub fn log(&self, columns: usize) {
        for line in self.render(columns) {
            tracing::info!(target: telemetry::events::PROFILE, "{line}");
        }
    }
}
