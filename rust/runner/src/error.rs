//! Scenario runner errors.

use std::path::PathBuf;

use patseq_pipeline::PipelineError;
use patseq_sequencer::SequenceError;

/// Errors from loading or running a scenario.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The scenario file could not be read.
    #[error("read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The scenario is not valid TOML or does not match the format.
    #[error("parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// A `run` op names a pattern the scenario does not define.
    #[error("{context} runs undefined pattern {pattern}")]
    UndefinedPattern {
        /// Where the reference appears.
        context: String,
        /// Missing pattern name.
        pattern: String,
    },
    /// The `[pipeline]` table is invalid.
    #[error("pipeline: {0}")]
    Pipeline(#[from] PipelineError),
    /// The sequence failed while executing.
    #[error("sequence: {0}")]
    Sequence(#[from] SequenceError),
    /// The run output could not be encoded.
    #[error("encode output: {0}")]
    Encode(#[from] serde_json::Error),
}
