//! Pipeline behavior over arbitrary vector streams and real sequences.

use patseq_pipeline::{PipelineItem, PipelinedSink, VectorPipeline};
use patseq_sequencer::PatternSequence;
use proptest::prelude::*;
use proptest::strategy::ValueTree;
use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};

const SEED: [u8; 32] = [
    0x50, 0x61, 0x74, 0x53, 0x65, 0x71, 0x50, 0x69, // "PatSeqPi"
    0x70, 0x65, 0x6C, 0x69, 0x6E, 0x65, 0x54, 0x65, // "pelineTe"
    0x73, 0x74, 0x53, 0x75, 0x69, 0x74, 0x65, 0x56, // "stSuiteV"
    0x31, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // "1"
];

fn make_runner(cases: u32) -> TestRunner {
    TestRunner::new_with_rng(
        Config {
            cases,
            ..Config::default()
        },
        TestRng::from_seed(RngAlgorithm::ChaCha, &SEED),
    )
}

fn input_strategy() -> impl Strategy<Value = Vec<PipelineItem>> {
    let input = prop_oneof![
        1 => "[a-z]{1,6}".prop_map(|text| PipelineItem::Comment { text }),
        6 => (prop::sample::select(vec!["0", "1", "X"]), 1u64..12).prop_map(|(data, repeat)| {
            PipelineItem::Vector {
                data: data.to_string(),
                repeat,
            }
        }),
    ];
    prop::collection::vec(input, 0..40)
}

#[test]
fn prop_pipeline_preserves_cycles_and_bound() {
    let mut runner = make_runner(128);
    let strategy = (input_strategy(), prop::sample::select(vec![2usize, 4, 6, 8]));

    for _ in 0..128 {
        let (inputs, group_size) = strategy.new_tree(&mut runner).unwrap().current();
        let mut pipeline = VectorPipeline::new(group_size).unwrap();
        let mut out = Vec::new();
        let comments_in = inputs
            .iter()
            .filter(|i| matches!(i, PipelineItem::Comment { .. }))
            .count();

        for input in inputs {
            pipeline.push(input);
            assert!(pipeline.buffered() < 2 * group_size);
            pipeline.flush(|item| out.push(item));
        }
        pipeline.empty(|item| out.push(item));

        let stats = pipeline.stats();
        assert_eq!(stats.cycles_out, stats.cycles_in);
        let comments_out = out
            .iter()
            .filter(|i| matches!(i, PipelineItem::Comment { .. }))
            .count();
        assert_eq!(comments_out, comments_in);
        assert!(pipeline.is_empty());
    }
}

#[test]
fn identical_groups_compress_after_flush() {
    let mut pipeline = VectorPipeline::new(4).unwrap();
    for _ in 0..8 {
        pipeline.push_vector("01", 1);
    }
    let mut out = Vec::new();
    pipeline.flush(|item| out.push(item));
    pipeline.empty(|item| out.push(item));

    assert_eq!(out.len(), 4);
    assert_eq!(
        out[3],
        PipelineItem::Vector {
            data: "01".to_string(),
            repeat: 2
        }
    );
}

#[test]
fn sequence_output_through_pipeline() {
    let seq = PatternSequence::new("clocked", |main| async move {
        main.comment("preamble");
        main.drive("tck", '0');
        main.cycle(8).await?;
        main.drive("tck", '1');
        main.cycle(3).await
    });
    let mut sink = PipelinedSink::new(2).unwrap();
    let report = seq.execute(&mut sink).unwrap();
    let (items, stats) = sink.finish();

    assert_eq!(report.cycles, 11);
    assert_eq!(stats.cycles_out, 11);
    assert_eq!(items[0], PipelineItem::Comment { text: "preamble".into() });
    let vectors = items
        .iter()
        .filter(|i| matches!(i, PipelineItem::Vector { .. }))
        .count();
    assert!(vectors < 11);
}
