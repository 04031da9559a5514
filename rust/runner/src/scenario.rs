//! TOML scenario format for pattern sequences.
//!
//! A scenario names a sequence, its optional configuration and vector
//! pipeline, the ops of the main branch, and a set of named sub-patterns:
//!
//! ```toml
//! name = "handshake"
//!
//! [pipeline]
//! group_size = 2
//!
//! [[main]]
//! op = "thread"
//! id = "a"
//! ops = [{ op = "cycle", repeat = 5 }]
//!
//! [[main]]
//! op = "wait"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use patseq_sequencer::SequenceConfig;
use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;

fn default_repeat() -> u64 {
    1
}

/// A pattern sequence loaded from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Sequence name.
    pub name: String,
    /// Scheduler configuration.
    #[serde(default)]
    pub config: SequenceConfig,
    /// Vector group compression. Cycles are recorded as-is when absent.
    #[serde(default)]
    pub pipeline: Option<PipelineSpec>,
    /// Ops of the main branch.
    #[serde(default)]
    pub main: Vec<Op>,
    /// Sub-patterns callable with `run`.
    #[serde(default)]
    pub patterns: BTreeMap<String, PatternSpec>,
}

/// `[pipeline]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Vectors per group. Must be even.
    pub group_size: usize,
}

/// `[patterns.<name>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Ops run inline by `run`.
    #[serde(default)]
    pub ops: Vec<Op>,
}

/// One step of a branch body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Request cycles.
    Cycle {
        /// Cycles to request.
        #[serde(default = "default_repeat")]
        repeat: u64,
    },
    /// Set a pin state.
    Drive {
        /// Pin name.
        pin: String,
        /// State character.
        state: char,
    },
    /// Comment ahead of the next cycles.
    Comment {
        /// Text.
        text: String,
    },
    /// Spawn a parallel branch.
    Thread {
        /// Thread id. Generated when absent.
        #[serde(default)]
        id: Option<String>,
        /// Branch body.
        #[serde(default)]
        ops: Vec<Op>,
    },
    /// Wait for threads to complete. Empty means all.
    Wait {
        /// Thread ids.
        #[serde(default)]
        threads: Vec<String>,
    },
    /// Barrier at a named location. Empty means all.
    SyncUp {
        /// Barrier location.
        location: String,
        /// Participants.
        #[serde(default)]
        threads: Vec<String>,
        /// Include main in an "all" barrier.
        #[serde(default)]
        include_main: bool,
    },
    /// Run ops under a serialize lock.
    Serialize {
        /// Lock name.
        lock: String,
        /// Guarded ops.
        #[serde(default)]
        ops: Vec<Op>,
    },
    /// Run a sub-pattern inline.
    Run {
        /// Pattern name.
        pattern: String,
    },
}

impl Scenario {
    /// Load a scenario file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn parse(s: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = toml::from_str(s)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check cross references and configuration ranges.
    ///
    /// # Errors
    ///
    /// Returns an error for a `run` of an undefined pattern, an invalid
    /// configuration, or an invalid pipeline group size.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.config.validate()?;
        if let Some(pipeline) = self.pipeline {
            patseq_pipeline::VectorPipeline::new(pipeline.group_size)?;
        }
        self.check_runs("main", &self.main)?;
        for (name, pattern) in &self.patterns {
            self.check_runs(&format!("pattern {name}"), &pattern.ops)?;
        }
        Ok(())
    }

    fn check_runs(&self, context: &str, ops: &[Op]) -> Result<(), ScenarioError> {
        for op in ops {
            match op {
                Op::Run { pattern } if !self.patterns.contains_key(pattern) => {
                    return Err(ScenarioError::UndefinedPattern {
                        context: context.to_string(),
                        pattern: pattern.clone(),
                    });
                }
                Op::Thread { ops, .. } | Op::Serialize { ops, .. } => {
                    self.check_runs(context, ops)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}
