use criterion::{criterion_group, criterion_main, Criterion};
use cv_core::{nalgebra::Point2, KeyPoint};
use feature_select::{ScoredKeyPoint, SelectImage, SelectLimitSettings, SelectLimitType};
use rand::{rngs::SmallRng, Rng, SeedableRng};

fn detections() -> Vec<ScoredKeyPoint> {
    let mut rng = SmallRng::seed_from_u64(0);
    (0..5000)
        .map(|_| ScoredKeyPoint {
            point: KeyPoint(Point2::new(rng.gen_range(0.0..1280.0), rng.gen_range(0.0..720.0))),
            intensity: rng.gen(),
        })
        .collect()
}

fn select(c: &mut Criterion) {
    let detected = detections();
    let prior = &detected[..300];
    let image = SelectImage::new(1280, 720);
    for (name, kind) in [
        ("best", SelectLimitType::Best),
        ("random", SelectLimitType::Random),
        ("uniform", SelectLimitType::Uniform),
        ("uniform_best", SelectLimitType::UniformBest),
    ] {
        let mut selector = SelectLimitSettings { kind, seed: 0 }.build::<ScoredKeyPoint>();
        let mut selected = vec![];
        c.bench_function(name, |b| {
            b.iter(|| selector.select(&image, true, Some(prior), &detected, 500, &mut selected))
        });
    }
}

criterion_group!(benches, select);
criterion_main!(benches);
