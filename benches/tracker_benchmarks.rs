//! Tracker benchmarks using Criterion.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use multibox_rs::frame::{downsample_luminance, FrameGeometry};
use multibox_rs::motion::{MotionEngine, ScriptedEngineFactory, TemplateConfig, TemplateEngine};
use multibox_rs::{Detection, Frame, Rect, Tracker, TrackerConfig};

/// Create disjoint test detections for benchmarking.
fn create_test_detections(n: usize) -> Vec<Detection> {
    (0..n)
        .map(|i| {
            let x = ((i % 8) * 75) as f32;
            let y = ((i / 8) * 60) as f32;
            Detection::new(0.5 + (i as f32) * 0.01, Rect::new(x, y, x + 50.0, y + 50.0))
                .expect("valid detection")
        })
        .collect()
}

fn textured_luminance(width: usize, height: usize) -> Vec<u8> {
    (0..width * height)
        .map(|i| {
            let h = (i as u32).wrapping_mul(2_654_435_761);
            (h >> 24) as u8
        })
        .collect()
}

fn benchmark_track_results_15_objects(c: &mut Criterion) {
    let frame = Frame::blank(1, 640, 480);
    let detections = create_test_detections(15);

    let mut tracker = Tracker::new(TrackerConfig::default(), ScriptedEngineFactory::new())
        .expect("valid tracker");
    tracker.on_frame(&frame).expect("frame accepted");

    c.bench_function("track_results_15_objects", |b| {
        b.iter(|| {
            tracker
                .track_results(black_box(detections.clone()), &frame)
                .expect("batch accepted")
        })
    });

    tracker.release();
}

fn benchmark_on_frame_15_objects(c: &mut Criterion) {
    let frame = Frame::blank(1, 640, 480);

    let mut tracker = Tracker::new(TrackerConfig::default(), ScriptedEngineFactory::new())
        .expect("valid tracker");
    tracker.on_frame(&frame).expect("frame accepted");
    tracker
        .track_results(create_test_detections(15), &frame)
        .expect("batch accepted");

    let mut timestamp = 1;
    c.bench_function("on_frame_15_objects", |b| {
        b.iter(|| {
            timestamp += 1;
            let next = frame.clone().with_timestamp(timestamp);
            tracker.on_frame(black_box(&next)).expect("frame accepted")
        })
    });

    tracker.release();
}

fn benchmark_downsample_640x480(c: &mut Criterion) {
    let geometry = FrameGeometry::new(640, 480, 640).expect("valid geometry");
    let input = textured_luminance(640, 480);
    let mut output = vec![0u8; 320 * 240];

    c.bench_function("downsample_640x480", |b| {
        b.iter(|| downsample_luminance(&geometry, black_box(&input), 2, &mut output))
    });
}

fn benchmark_template_engine_10_objects(c: &mut Criterion) {
    let geometry = FrameGeometry::new(320, 240, 320).expect("valid geometry");
    let frame = textured_luminance(320, 240);
    let mut engine = TemplateEngine::new(geometry, TemplateConfig::default()).expect("valid engine");
    for i in 0..10u64 {
        let x = (i * 30) as f32;
        engine.register_object(i, &Rect::new(x, 50.0, x + 24.0, 74.0), &frame);
    }

    let mut timestamp = 0;
    c.bench_function("template_engine_10_objects", |b| {
        b.iter(|| {
            timestamp += 1;
            engine.next_frame(black_box(&frame), timestamp)
        })
    });
}

criterion_group!(
    benches,
    benchmark_track_results_15_objects,
    benchmark_on_frame_15_objects,
    benchmark_downsample_640x480,
    benchmark_template_engine_10_objects,
);
criterion_main!(benches);
