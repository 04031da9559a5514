//! TOML scenario runner for the pattern sequencer.
//!
//! A [`Scenario`] describes a pattern as data: the ops of the main branch,
//! parallel branches, barriers, serialize blocks and named sub-patterns.
//! [`run_scenario`] interprets it on a
//! [`PatternSequence`](patseq_sequencer::PatternSequence) and returns the
//! report together with the emitted (optionally compressed) vector stream.

pub mod error;
pub mod runner;
pub mod scenario;

pub use error::ScenarioError;
pub use runner::{build_sequence, run_scenario, RunOptions, RunOutput};
pub use scenario::{Op, PatternSpec, PipelineSpec, Scenario};
