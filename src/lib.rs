//! Deterministic concurrent pattern sequencing for ATE test-pattern generation.
//!
//! This facade re-exports the workspace crates:
//!
//! - [`sequencer`]: the cooperative scheduler, branch context and sync primitives
//! - [`pipeline`]: vector group compression (feature `pipeline`, on by default)
//! - [`runner`]: TOML scenario runner (feature `runner`)
//!
//! Most users only need the [`prelude`].

pub use patseq_sequencer as sequencer;

#[cfg(feature = "pipeline")]
pub use patseq_pipeline as pipeline;

#[cfg(feature = "runner")]
pub use patseq_runner as runner;

/// Common imports for writing patterns.
pub mod prelude {
    pub use patseq_sequencer::{
        Branch, BranchResult, CycleSink, PatternLibrary, PatternSequence, RecordingSink,
        SequenceConfig, SequenceError, SequenceReport, SerializeLock, SyncOptions, ThreadId,
    };

    #[cfg(feature = "pipeline")]
    pub use patseq_pipeline::{PipelineItem, PipelinedSink, VectorPipeline};
}
