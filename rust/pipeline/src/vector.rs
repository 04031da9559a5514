//! Vectors and the items yielded by the pipeline.

use serde::{Deserialize, Serialize};

/// One tester vector: rendered pin states plus a repeat count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector {
    /// Rendered pin states.
    pub data: String,
    /// Repeat count. On the last vector of a full group this repeats the
    /// whole group.
    pub repeat: u64,
    /// Comments attached ahead of this vector.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
}

impl Vector {
    /// Vector with no comments.
    #[must_use]
    pub fn new(data: impl Into<String>, repeat: u64) -> Self {
        Self {
            data: data.into(),
            repeat,
            comments: Vec::new(),
        }
    }

    /// Single-cycle copy of this vector without comments.
    #[must_use]
    pub(crate) fn single(&self) -> Self {
        Self::new(self.data.clone(), 1)
    }

    /// Same data and, ignoring the trailing group repeat, same repeat.
    pub(crate) fn same_as(&self, other: &Self, is_last: bool) -> bool {
        self.data == other.data && (is_last || self.repeat == other.repeat)
    }
}

/// A comment or vector, as pushed into or yielded by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineItem {
    /// A comment.
    Comment {
        /// Text.
        text: String,
    },
    /// A vector.
    Vector {
        /// Rendered pin states.
        data: String,
        /// Repeat count.
        repeat: u64,
    },
}

impl PipelineItem {
    pub(crate) fn expand(vector: Vector, out: &mut impl FnMut(PipelineItem)) {
        for text in vector.comments {
            out(Self::Comment { text });
        }
        out(Self::Vector {
            data: vector.data,
            repeat: vector.repeat,
        });
    }
}
