//! Pipeline configuration errors.

/// Errors from [`crate::VectorPipeline`] construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Group size of zero.
    #[error("vector group size must be non-zero")]
    ZeroGroupSize,
    /// Grouped tester formats pair edges, so the size must be even.
    #[error("vector group size must be even, got {0}")]
    OddGroupSize(usize),
}
