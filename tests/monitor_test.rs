//! Integration tests for change detection and the advisory pipeline

use annadata_monitor::core::{
    ChangeHandler, CycleOutcome, DispatchError, Monitor, MonitorExit, Reading, RetryPolicy,
};
use annadata_monitor::model::layers::Linear;
use annadata_monitor::model::{CropModel, CropModelWeights, CROP_LABELS};
use annadata_monitor::pipeline::AdvisoryPipeline;
use annadata_monitor::source::{self, SourceError};
use annadata_monitor::store::{MemoryStore, RecommendationStore};
use async_trait::async_trait;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Reading>>,
}

impl Recorder {
    fn seen(&self) -> Vec<Reading> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeHandler for Recorder {
    async fn on_change(&self, reading: &Reading) -> Result<(), DispatchError> {
        self.seen.lock().unwrap().push(*reading);
        Ok(())
    }
}

fn uniform(v: f64) -> Reading {
    Reading::new([v; 7]).unwrap()
}

fn recorder_monitor() -> (Arc<Recorder>, Monitor<Arc<Recorder>>) {
    let recorder = Arc::new(Recorder::default());
    let monitor = Monitor::new(recorder.clone()).with_retry(RetryPolicy::none());
    (recorder, monitor)
}

#[tokio::test]
async fn test_identical_readings_dispatch_once() {
    let (recorder, mut monitor) = recorder_monitor();

    for _ in 0..10 {
        monitor.feed(uniform(1.0)).await;
    }
    assert_eq!(recorder.seen(), vec![uniform(1.0)]);

    let outcome = monitor.feed(uniform(1.0)).await;
    assert!(matches!(outcome, CycleOutcome::Unchanged(_)));
    assert_eq!(recorder.seen().len(), 1);
}

#[tokio::test]
async fn test_spike_in_first_window_is_dispatched() {
    let (recorder, mut monitor) = recorder_monitor();

    let mut last = None;
    for i in 0..10 {
        let v = if i == 5 { 10.0 } else { 0.0 };
        last = Some(monitor.feed(uniform(v)).await);
    }

    match last {
        Some(CycleOutcome::Dispatched(deviant)) => {
            assert_eq!(deviant.index, 5);
            assert_eq!(deviant.total, 70.0);
        }
        other => panic!("expected a dispatch, got {:?}", other),
    }
    assert_eq!(recorder.seen(), vec![uniform(10.0)]);
}

#[tokio::test]
async fn test_window_never_exceeds_capacity() {
    let (_recorder, mut monitor) = recorder_monitor();

    for i in 0..57 {
        monitor.feed(uniform((i % 4) as f64)).await;
        if i >= 9 {
            assert_eq!(monitor.window().len(), 10);
        }
    }
}

#[tokio::test]
async fn test_consecutive_equal_candidates_dispatch_once() {
    let (recorder, mut monitor) = recorder_monitor();

    // The spike stays the most deviant reading while it slides through.
    let mut readings = vec![uniform(0.0); 9];
    readings.push(uniform(50.0));
    readings.extend(vec![uniform(0.0); 5]);

    for r in readings {
        monitor.feed(r).await;
    }
    assert_eq!(recorder.seen(), vec![uniform(50.0)]);
    assert_eq!(monitor.stats().stats().unchanged, 5);
}

#[tokio::test]
async fn test_disconnect_mid_stream_exits_cleanly() {
    let (recorder, mut monitor) = recorder_monitor();

    let mut items: Vec<Result<Reading, SourceError>> = (0..12).map(|_| Ok(uniform(2.0))).collect();
    items.push(Err(SourceError::Disconnected("bridge closed".to_string())));
    items.push(Ok(uniform(9.0)));

    let exit = monitor
        .run(futures::stream::iter(items), CancellationToken::new())
        .await;

    assert_eq!(exit, MonitorExit::Disconnected("bridge closed".to_string()));
    assert_eq!(recorder.seen(), vec![uniform(2.0)]);
    assert_eq!(monitor.stats().stats().readings_received, 12);
}

#[tokio::test]
async fn test_file_source_drives_pipeline_into_store() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..10 {
        let n = if i == 3 { 120 } else { 90 };
        writeln!(file, "[{n}, 42, 43, 20.8, 82, 6.5, 202.9]").unwrap();
        if i == 6 {
            writeln!(file).unwrap();
        }
    }
    file.flush().unwrap();

    let zeros = |out: usize, inp: usize| Linear {
        weight: vec![vec![0.0; inp]; out],
        bias: vec![0.0; out],
    };
    let mut head = zeros(CROP_LABELS.len(), 4);
    head.bias[2] = 8.0;
    let crop = CropModel::from_weights(CropModelWeights {
        layers: vec![zeros(4, 7), zeros(4, 4), head],
        labels: None,
    })
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let pipeline = AdvisoryPipeline::new(Arc::new(crop), None, store.clone())
        .with_device_id("sensor-file");
    let mut monitor = Monitor::new(pipeline);

    let stream = source::file(file.path()).await;
    let exit = monitor.run(stream, CancellationToken::new()).await;
    assert_eq!(exit, MonitorExit::EndOfStream);

    let readings = store.readings();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].nitrogen, 120.0);
    assert_eq!(readings[0].device_id, "sensor-file");

    let recs = store.recommendations();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].recommendations.crop_name, CROP_LABELS[2]);
    assert_eq!(recs[0].general_recommendations, "");

    let latest = store.latest_reading().await.unwrap().unwrap();
    assert_eq!(latest.reading().unwrap().nitrogen(), 120.0);
}

#[tokio::test]
async fn test_malformed_line_stops_monitor_after_earlier_dispatch() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for _ in 0..10 {
        writeln!(file, "[5, 5, 5, 5, 5, 5, 5]").unwrap();
    }
    writeln!(file, "[1, 2, 3]").unwrap();
    writeln!(file, "[80, 80, 80, 80, 80, 80, 80]").unwrap();
    file.flush().unwrap();

    let (recorder, mut monitor) = recorder_monitor();
    let stream = source::file(file.path()).await;
    let exit = monitor.run(stream, CancellationToken::new()).await;

    assert!(matches!(exit, MonitorExit::Malformed(ref reason) if reason.contains("expected 7 values")));
    assert_eq!(recorder.seen(), vec![uniform(5.0)]);
    assert_eq!(monitor.stats().stats().readings_received, 10);
    assert_eq!(monitor.window().len(), 10);
}
