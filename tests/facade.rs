//! The facade prelude is enough to write and run a pattern.

use patseq::prelude::*;

#[test]
fn prelude_runs_parallel_pattern() {
    let seq = PatternSequence::new("facade", |main| async move {
        main.drive("clk", '0');
        main.in_parallel(Some("worker"), |w| async move {
            w.cycle(2).await?;
            w.sync_up("done", ["worker"], SyncOptions::default()).await
        })?;
        main.cycle(4).await?;
        main.wait_for_thread("worker").await
    });
    let mut sink = RecordingSink::new();
    let report = seq.execute(&mut sink).unwrap();
    assert_eq!(report.cycles, 4);
    assert!(report.all_completed());
}

#[cfg(feature = "pipeline")]
#[test]
fn prelude_pipeline_sink() {
    let seq = PatternSequence::new("grouped", |main| async move {
        main.drive("clk", '1');
        main.cycle(6).await
    });
    let mut sink = PipelinedSink::new(2).unwrap();
    seq.execute(&mut sink).unwrap();
    let (items, stats) = sink.finish();
    assert_eq!(stats.cycles_out, 6);
    assert_eq!(
        items,
        vec![
            PipelineItem::Vector { data: "1".into(), repeat: 1 },
            PipelineItem::Vector { data: "1".into(), repeat: 3 },
        ]
    );
}
