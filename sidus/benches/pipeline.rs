use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use glam::DVec2;

use sidus::testing::{StarField, StarFieldConfig};
use sidus::{
    Accumulator, AlignedFrame, Config, ImageDimensions, InterpolationMethod, Pipeline,
    ReferenceSelection, Registrator, StackConfig, StarDetector, Transform, VecSource, align,
};

fn field(size: usize) -> StarField {
    StarField::generate(&StarFieldConfig {
        width: size,
        height: size,
        star_count: 60,
        ..Default::default()
    })
}

fn bench_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("detection");
    for size in [256, 1024] {
        let plane = field(size).render(&Transform::identity(), 1);
        let detector = StarDetector::default();
        group.bench_with_input(BenchmarkId::from_parameter(size), &plane, |b, plane| {
            b.iter(|| black_box(detector.detect(plane)))
        });
    }
    group.finish();
}

fn bench_registration(c: &mut Criterion) {
    let field = field(1024);
    let reference = field.positions(&Transform::identity());
    let target = field.positions(&Transform::similarity(DVec2::new(12.0, -7.5), 0.01, 1.001));
    let registrator = Registrator::default();

    c.bench_function("registration/60_stars", |b| {
        b.iter(|| black_box(registrator.register(&reference, &target)))
    });
}

fn bench_stacking(c: &mut Criterion) {
    let field = field(512);
    let frames: Vec<AlignedFrame> = (0..8)
        .map(|i| {
            let frame = field.frame(&Transform::identity(), i, "bench");
            align(&frame, &Transform::identity(), InterpolationMethod::Bicubic).with_index(i as usize)
        })
        .collect();
    let dims = ImageDimensions::new(512, 512, 1);

    let mut group = c.benchmark_group("stacking");
    for (name, config) in [
        ("mean", StackConfig::mean()),
        ("median", StackConfig::median()),
        ("sigmaclip", StackConfig::default()),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut acc = Accumulator::new(dims, &config);
                for frame in &frames {
                    acc.fold(frame.clone());
                }
                black_box(acc.finalize())
            })
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let field = field(512);
    let frames: Vec<_> = (0..6)
        .map(|i| {
            let shift = Transform::translation(DVec2::new(i as f64 * 1.5, -(i as f64)));
            field.frame(&shift, i, "bench")
        })
        .collect();

    let mut config = Config::default();
    config.batch.memory_budget = Some(512 * 1024 * 1024);
    let pipeline = Pipeline::new(config).expect("default configuration validates");

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    group.bench_function("6x512", |b| {
        b.iter(|| {
            let mut source = VecSource::new(frames.clone());
            black_box(pipeline.run(&mut source, ReferenceSelection::First))
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_detection,
    bench_registration,
    bench_stacking,
    bench_pipeline
);
criterion_main!(benches);
