//! Vector group pipeline.
//!
//! Vectors are buffered until the lead group of `group_size` vectors can be
//! finalized. While at least two whole groups are buffered, the lead group
//! is compared with the one after it: an exact repeat is folded into the
//! lead group's trailing repeat count, anything else finalizes the lead
//! group. The buffer therefore never reaches `2 × group_size` vectors.
//!
//! A vector with repeat `r > 1` on the last slot of a group repeats the
//! whole group `r` times, covering `group_size × r` cycles.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::vector::{PipelineItem, Vector};

/// Counters kept by a [`VectorPipeline`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Vectors pushed.
    pub vectors_in: u64,
    /// Cycles pushed.
    pub cycles_in: u64,
    /// Vectors yielded.
    pub vectors_out: u64,
    /// Cycles covered by the yielded vectors.
    pub cycles_out: u64,
    /// Groups folded into the group before them.
    pub merged_groups: u64,
}

/// Buffer that compresses runs of identical vector groups.
#[derive(Debug, Clone)]
pub struct VectorPipeline {
    group_size: usize,
    buffer: VecDeque<Vector>,
    ready: VecDeque<Vector>,
    comments: Vec<String>,
    stats: PipelineStats,
}

impl VectorPipeline {
    /// Create a pipeline with groups of `group_size` vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if `group_size` is zero or odd.
    pub fn new(group_size: usize) -> Result<Self, PipelineError> {
        if group_size == 0 {
            return Err(PipelineError::ZeroGroupSize);
        }
        if group_size % 2 != 0 {
            return Err(PipelineError::OddGroupSize(group_size));
        }
        Ok(Self {
            group_size,
            buffer: VecDeque::with_capacity(2 * group_size),
            ready: VecDeque::new(),
            comments: Vec::new(),
            stats: PipelineStats::default(),
        })
    }

    /// Vectors per group.
    #[must_use]
    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Vectors not yet finalized.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing remains to be yielded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.ready.is_empty() && self.comments.is_empty()
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Push a comment or a vector.
    pub fn push(&mut self, item: PipelineItem) {
        match item {
            PipelineItem::Comment { text } => self.push_comment(text),
            PipelineItem::Vector { data, repeat } => self.push_vector(data, repeat),
        }
    }

    /// Buffer a comment until the next vector.
    pub fn push_comment(&mut self, text: impl Into<String>) {
        self.comments.push(text.into());
    }

    /// Push a vector repeated `repeat` times. A zero repeat is ignored.
    pub fn push_vector(&mut self, data: impl Into<String>, repeat: u64) {
        if repeat == 0 {
            return;
        }
        let mut vector = Vector::new(data, repeat);
        vector.comments = std::mem::take(&mut self.comments);
        self.stats.vectors_in += 1;
        self.stats.cycles_in += repeat;

        if repeat == 1 {
            self.append(vector);
        } else {
            self.add_repeat_vector(vector);
        }
    }

    /// Yield every finalized vector, comments first.
    pub fn flush(&mut self, mut f: impl FnMut(PipelineItem)) {
        while let Some(vector) = self.ready.pop_front() {
            self.yield_vector(vector, &mut f);
        }
    }

    /// Yield everything still buffered, regardless of alignment.
    pub fn empty(&mut self, mut f: impl FnMut(PipelineItem)) {
        self.flush(&mut f);
        while let Some(vector) = self.buffer.pop_front() {
            self.yield_vector(vector, &mut f);
        }
        for text in std::mem::take(&mut self.comments) {
            f(PipelineItem::Comment { text });
        }
        tracing::debug!(
            vectors_in = self.stats.vectors_in,
            vectors_out = self.stats.vectors_out,
            cycles = self.stats.cycles_out,
            merged = self.stats.merged_groups,
            "vector pipeline emptied"
        );
    }

    /// Split a repeated vector into: singles up to group alignment, one
    /// full group carrying the aggregated repeat, then the remainder as
    /// singles.
    fn add_repeat_vector(&mut self, vector: Vector) {
        let group = self.group_size as u64;
        let template = vector.single();
        let mut comments = vector.comments;
        let mut count = vector.repeat;

        while count > 0 && self.buffer.len() % self.group_size != 0 {
            self.append(with_comments(&template, &mut comments));
            count -= 1;
        }
        if count > group {
            for slot in 0..self.group_size {
                let mut copy = with_comments(&template, &mut comments);
                if slot + 1 == self.group_size {
                    copy.repeat = count / group;
                }
                self.append(copy);
            }
            count %= group;
        }
        for _ in 0..count {
            self.append(with_comments(&template, &mut comments));
        }
    }

    fn append(&mut self, vector: Vector) {
        self.buffer.push_back(vector);
        self.compress();
    }

    fn compress(&mut self) {
        let g = self.group_size;
        while self.buffer.len() >= 2 * g {
            if self.next_group_repeats_lead() {
                let extra = self.buffer[2 * g - 1].repeat;
                self.buffer.drain(g..2 * g);
                self.buffer[g - 1].repeat += extra;
                self.stats.merged_groups += 1;
                tracing::trace!(repeat = self.buffer[g - 1].repeat, "merged vector group");
            } else {
                self.ready.extend(self.buffer.drain(..g));
            }
        }
    }

    fn next_group_repeats_lead(&self) -> bool {
        let g = self.group_size;
        (0..g).all(|i| {
            let lead = &self.buffer[i];
            let next = &self.buffer[g + i];
            next.comments.is_empty() && lead.same_as(next, i + 1 == g)
        })
    }

    fn yield_vector(&mut self, vector: Vector, f: &mut impl FnMut(PipelineItem)) {
        self.stats.vectors_out += 1;
        self.stats.cycles_out += match vector.repeat {
            0 | 1 => 1,
            r => 1 + self.group_size as u64 * (r - 1),
        };
        PipelineItem::expand(vector, f);
    }
}

fn with_comments(template: &Vector, comments: &mut Vec<String>) -> Vector {
    let mut vector = template.single();
    vector.comments = std::mem::take(comments);
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(pipeline: &mut VectorPipeline) -> Vec<PipelineItem> {
        let mut out = Vec::new();
        pipeline.flush(|item| out.push(item));
        pipeline.empty(|item| out.push(item));
        out
    }

    fn vectors(items: &[PipelineItem]) -> Vec<(String, u64)> {
        items
            .iter()
            .filter_map(|item| match item {
                PipelineItem::Vector { data, repeat } => Some((data.clone(), *repeat)),
                PipelineItem::Comment { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_group_size_validation() {
        assert_eq!(VectorPipeline::new(0).unwrap_err(), PipelineError::ZeroGroupSize);
        assert_eq!(VectorPipeline::new(3).unwrap_err(), PipelineError::OddGroupSize(3));
        assert!(VectorPipeline::new(2).is_ok());
    }

    #[test]
    fn test_two_identical_groups_fold_into_one() {
        let mut pipeline = VectorPipeline::new(4).unwrap();
        for _ in 0..8 {
            pipeline.push_vector("10", 1);
        }
        let out = vectors(&drain(&mut pipeline));
        assert_eq!(
            out,
            vec![
                ("10".to_string(), 1),
                ("10".to_string(), 1),
                ("10".to_string(), 1),
                ("10".to_string(), 2),
            ]
        );
        assert_eq!(pipeline.stats().cycles_out, 8);
        assert_eq!(pipeline.stats().merged_groups, 1);
    }

    #[test]
    fn test_repeat_splits_to_alignment_then_singles() {
        let mut pipeline = VectorPipeline::new(4).unwrap();
        pipeline.push_vector("A", 1);
        pipeline.push_vector("B", 7);
        let out = vectors(&drain(&mut pipeline));
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], ("A".to_string(), 1));
        assert!(out[1..].iter().all(|v| *v == ("B".to_string(), 1)));
        let stats = pipeline.stats();
        assert_eq!(stats.cycles_in, 8);
        assert_eq!(stats.cycles_out, 8);
    }

    #[test]
    fn test_long_repeat_uses_one_group_plus_remainder() {
        let mut pipeline = VectorPipeline::new(4).unwrap();
        pipeline.push_vector("C", 10);
        let out = vectors(&drain(&mut pipeline));
        assert_eq!(
            out,
            vec![
                ("C".to_string(), 1),
                ("C".to_string(), 1),
                ("C".to_string(), 1),
                ("C".to_string(), 2),
                ("C".to_string(), 1),
                ("C".to_string(), 1),
            ]
        );
        assert_eq!(pipeline.stats().cycles_out, 10);
    }

    #[test]
    fn test_comments_attach_to_next_vector_and_block_merging() {
        let mut pipeline = VectorPipeline::new(2).unwrap();
        pipeline.push_vector("0", 1);
        pipeline.push_vector("1", 1);
        pipeline.push_comment("second half");
        pipeline.push_vector("0", 1);
        pipeline.push_vector("1", 1);
        pipeline.push_comment("trailing");
        let out = drain(&mut pipeline);
        assert_eq!(
            out,
            vec![
                PipelineItem::Vector { data: "0".into(), repeat: 1 },
                PipelineItem::Vector { data: "1".into(), repeat: 1 },
                PipelineItem::Comment { text: "second half".into() },
                PipelineItem::Vector { data: "0".into(), repeat: 1 },
                PipelineItem::Vector { data: "1".into(), repeat: 1 },
                PipelineItem::Comment { text: "trailing".into() },
            ]
        );
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_flush_yields_only_finalized_groups() {
        let mut pipeline = VectorPipeline::new(2).unwrap();
        for data in ["a", "b", "c", "d", "e"] {
            pipeline.push_vector(data, 1);
        }
        let mut out = Vec::new();
        pipeline.flush(|item| out.push(item));
        assert_eq!(vectors(&out).len(), 2);
        assert_eq!(pipeline.buffered(), 3);
    }
}
