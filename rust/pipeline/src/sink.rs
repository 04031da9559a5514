//! A [`CycleSink`] that feeds emitted cycles through a [`VectorPipeline`].

use patseq_sequencer::{CycleSink, PinFrame};

use crate::error::PipelineError;
use crate::pipeline::{PipelineStats, VectorPipeline};
use crate::vector::PipelineItem;

/// Collects the compressed vector stream for a sequence.
#[derive(Debug, Clone)]
pub struct PipelinedSink {
    pipeline: VectorPipeline,
    items: Vec<PipelineItem>,
}

impl PipelinedSink {
    /// Sink grouping vectors by `group_size`.
    ///
    /// # Errors
    ///
    /// See [`VectorPipeline::new`].
    pub fn new(group_size: usize) -> Result<Self, PipelineError> {
        Ok(Self {
            pipeline: VectorPipeline::new(group_size)?,
            items: Vec::new(),
        })
    }

    /// Items finalized so far.
    #[must_use]
    pub fn items(&self) -> &[PipelineItem] {
        &self.items
    }

    /// Pipeline counters.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// Empty the pipeline and return the complete stream.
    #[must_use]
    pub fn finish(mut self) -> (Vec<PipelineItem>, PipelineStats) {
        let items = &mut self.items;
        self.pipeline.empty(|item| items.push(item));
        (self.items, self.pipeline.stats())
    }
}

impl CycleSink for PipelinedSink {
    fn emit(&mut self, frame: &PinFrame, cycles: u64) -> Result<(), String> {
        self.pipeline.push_vector(frame.to_string(), cycles);
        let items = &mut self.items;
        self.pipeline.flush(|item| items.push(item));
        Ok(())
    }

    fn comment(&mut self, text: &str) {
        self.pipeline.push_comment(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emissions_become_vectors() {
        let mut sink = PipelinedSink::new(2).unwrap();
        let mut frame = PinFrame::new();
        frame.drive("clk", '1');
        sink.comment("idle");
        sink.emit(&frame, 5).unwrap();
        let (items, stats) = sink.finish();
        assert_eq!(stats.cycles_in, 5);
        assert_eq!(stats.cycles_out, 5);
        assert_eq!(items[0], PipelineItem::Comment { text: "idle".into() });
        assert_eq!(
            items[1..],
            [
                PipelineItem::Vector { data: "1".into(), repeat: 1 },
                PipelineItem::Vector { data: "1".into(), repeat: 2 },
                PipelineItem::Vector { data: "1".into(), repeat: 1 },
            ]
        );
    }
}
