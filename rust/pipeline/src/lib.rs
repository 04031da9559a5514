//! Vector group compression for the pattern sequencer.
//!
//! Some testers emit vectors in fixed-size groups. [`VectorPipeline`] buffers
//! the vector stream, folds runs of identical groups into one group with a
//! trailing repeat count, and yields the result in order. [`PipelinedSink`]
//! plugs the pipeline into [`patseq_sequencer::PatternSequence::execute`].

pub mod error;
pub mod pipeline;
pub mod sink;
pub mod vector;

pub use error::PipelineError;
pub use pipeline::{PipelineStats, VectorPipeline};
pub use sink::PipelinedSink;
pub use vector::{PipelineItem, Vector};
