//! Throughput benchmarks for the tracking stage

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use tracking_head::{
    channel::{bounded, StageIo},
    control::ControlLaw,
    detection::{BrightRegionDetector, Detector},
    frame::{FramePool, PixelFormat, Rgb},
    mode::ModeSwitch,
    tracking::TrackingStage,
};

/// Fill a pooled frame with noise and one bright square
fn noisy_pool(width: u32, height: u32) -> FramePool {
    let pool = FramePool::new(width, height, PixelFormat::Rgb565, 1).unwrap();
    let mut frame = pool.acquire().unwrap();
    let mut rng = rand::thread_rng();
    for byte in frame.data_mut() {
        *byte = rng.gen_range(0..64);
    }
    for y in height / 3..height / 2 {
        for x in width / 3..width / 2 {
            frame.put_pixel(x, y, Rgb(255, 255, 255));
        }
    }
    frame.release();
    pool
}

/// Benchmark the detector alone at several resolutions
fn bench_detector(c: &mut Criterion) {
    let mut group = c.benchmark_group("bright_region_detector");

    for (width, height) in [(160u32, 120u32), (320, 240), (640, 480)] {
        let pool = noisy_pool(width, height);
        let mut detector = BrightRegionDetector::default();
        group.throughput(Throughput::Elements(u64::from(width * height)));
        group.bench_with_input(BenchmarkId::from_parameter(format!("{width}x{height}")), &pool, |b, pool| {
            b.iter(|| {
                let frame = pool.acquire().unwrap();
                black_box(detector.detect(&frame).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark one full tracking iteration, commands drained
fn bench_tracking_iteration(c: &mut Criterion) {
    let pool = noisy_pool(320, 240);
    let (cmd_tx, cmd_rx) = bounded(1024).unwrap();
    let mut stage = TrackingStage::new(
        StageIo::new(None, None),
        BrightRegionDetector::default(),
        ModeSwitch::fixed(true),
        ControlLaw::default(),
    )
    .with_commands(cmd_tx)
    .with_annotation(true);

    c.bench_function("tracking/process_320x240", |b| {
        b.iter(|| {
            let iteration = stage.process(pool.acquire().unwrap());
            while cmd_rx.try_recv().is_ok() {}
            black_box(iteration)
        });
    });
}

criterion_group!(benches, bench_detector, bench_tracking_iteration);
criterion_main!(benches);
