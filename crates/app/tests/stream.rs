mod common;

use std::sync::Arc;

use bird_cctv::{FramePipeline, StreamPublisher};
use common::*;

#[test]
fn stream_ends_when_the_pipeline_stops_and_stays_ended() {
    let (source, _log) = ScriptedSource::new([true, true], false);
    let pipeline = FramePipeline::new(Box::new(source), None, fast_policy(0))
        .unwrap()
        .into_shared();
    let mut publisher = StreamPublisher::new(pipeline, 85);

    let first = publisher.next().unwrap();
    assert_eq!(&first[..2], &[0xFF, 0xD8]);
    assert!(publisher.next().is_some());
    assert!(publisher.next().is_none());
    assert!(publisher.is_finished());
    assert!(publisher.next().is_none());
}

#[test]
fn encode_failures_skip_the_frame() {
    let (source, _log) = ScriptedSource::new([true, true, true], false);
    let pipeline = FramePipeline::new(
        Box::new(source),
        Some(Arc::new(CorruptFirstFrame::default())),
        fast_policy(0),
    )
    .unwrap()
    .into_shared();

    let payloads: Vec<Vec<u8>> = StreamPublisher::new(pipeline.clone(), 85).collect();
    assert_eq!(payloads.len(), 2);
    assert_eq!(pipeline.lock().unwrap().frames_processed(), 3);
}

#[test]
fn released_pipeline_yields_an_empty_stream() {
    let (source, log) = ScriptedSource::new([], true);
    let pipeline = FramePipeline::new(Box::new(source), None, fast_policy(5))
        .unwrap()
        .into_shared();
    pipeline.lock().unwrap().release();

    let mut publisher = StreamPublisher::new(pipeline, 85);
    assert!(publisher.next().is_none());
    assert_eq!(log.reads(), 0);
}
