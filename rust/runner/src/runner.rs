//! Scenario interpreter and run output.

use futures::future::{FutureExt, LocalBoxFuture};
use patseq_pipeline::{PipelineItem, PipelineStats, PipelinedSink};
use patseq_sequencer::{
    Branch, BranchResult, ExecutionProfile, PatternLibrary, PatternSequence, RecordingSink,
    SequenceReport, SinkRecord, SyncOptions,
};
use serde::Serialize;

use crate::error::ScenarioError;
use crate::scenario::{Op, Scenario};

/// Options for [`run_scenario`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Include the rendered execution profile in the output.
    pub profile: bool,
    /// Timeline width for the profile.
    pub profile_columns: Option<usize>,
}

/// Everything a scenario run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    /// Scenario name.
    pub scenario: String,
    /// Scheduler report.
    pub report: SequenceReport,
    /// Raw sink records, when no pipeline is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<SinkRecord>>,
    /// Compressed vector stream, when a pipeline is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vectors: Option<Vec<PipelineItem>>,
    /// Pipeline counters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineStats>,
    /// Rendered execution profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Vec<String>>,
}

impl RunOutput {
    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Encode`] if serialization fails.
    pub fn to_json(&self, pretty: bool) -> Result<String, ScenarioError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

/// Build the sequence described by a scenario.
#[must_use]
pub fn build_sequence(scenario: &Scenario) -> PatternSequence {
    let mut library = PatternLibrary::new();
    for (name, pattern) in &scenario.patterns {
        let ops = pattern.ops.clone();
        library.register(name.clone(), move |branch| interpret(branch, ops.clone()));
    }
    let main = scenario.main.clone();
    PatternSequence::new(scenario.name.clone(), move |branch| interpret(branch, main))
        .with_config(scenario.config.clone())
        .with_library(library)
        .before_thread_start(|thread, cycle| {
            tracing::debug!(%thread, cycle, "starting thread");
        })
}

/// Execute a scenario and collect its output.
///
/// # Errors
///
/// Returns an error if the pipeline is misconfigured or the sequence fails.
pub fn run_scenario(scenario: &Scenario, options: &RunOptions) -> Result<RunOutput, ScenarioError> {
    tracing::info!(scenario = %scenario.name, "running scenario");
    let sequence = build_sequence(scenario);

    let (report, records, vectors, pipeline) = match scenario.pipeline {
        Some(spec) => {
            let mut sink = PipelinedSink::new(spec.group_size)?;
            let report = sequence.execute(&mut sink)?;
            let (items, stats) = sink.finish();
            (report, None, Some(items), Some(stats))
        }
        None => {
            let mut sink = RecordingSink::new();
            let report = sequence.execute(&mut sink)?;
            (report, Some(sink.records().to_vec()), None, None)
        }
    };

    let profile = options.profile.then(|| {
        let columns = options
            .profile_columns
            .unwrap_or(scenario.config.profile.columns);
        ExecutionProfile::from_report(&report).render(columns)
    });

    Ok(RunOutput {
        scenario: scenario.name.clone(),
        report,
        records,
        vectors,
        pipeline,
        profile,
    })
}

/// Run `ops` in `branch`, one after another.
fn interpret(branch: Branch, ops: Vec<Op>) -> LocalBoxFuture<'static, BranchResult> {
    async move {
        for op in ops {
            match op {
                Op::Cycle { repeat } => branch.cycle(repeat).await?,
                Op::Drive { pin, state } => branch.drive(pin, state),
                Op::Comment { text } => branch.comment(text),
                Op::Thread { id, ops } => {
                    branch.thread(id.as_deref(), move |child| interpret(child, ops))?;
                }
                Op::Wait { threads } => {
                    branch
                        .wait_for_threads_to_complete(threads.iter().map(String::as_str))
                        .await?;
                }
                Op::SyncUp {
                    location,
                    threads,
                    include_main,
                } => {
                    branch
                        .sync_up(
                            &location,
                            threads.iter().map(String::as_str),
                            SyncOptions { include_main },
                        )
                        .await?;
                }
                Op::Serialize { lock, ops } => {
                    let lock = branch.serialize_lock(&lock);
                    branch
                        .serialize(&lock, interpret(branch.clone(), ops))
                        .await?;
                }
                Op::Run { pattern } => branch.run(&pattern).await?,
            }
        }
        Ok(())
    }
    .boxed_local()
}
