use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};

use swcount::{QSketch, SlidingLc};

fn bench_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest-and-estimate");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(10);
    let n = 100 * 1000;

    group.bench_with_input(BenchmarkId::new("swcount::QSketch", n), &n, |b, &n| {
        b.iter(|| {
            let mut sketch = QSketch::new(512, 8, n, 2024).expect("valid parameters");
            sketch
                .update((0..n as u64).map(|key| key.to_le_bytes()))
                .expect("full window");
            sketch.estimate()
        })
    });

    group.bench_with_input(BenchmarkId::new("swcount::SlidingLc", n), &n, |b, &n| {
        b.iter(|| {
            let mut engine =
                SlidingLc::new(1 << 16, 1 << 14, 4, 1 << 13, 1 << 13, 2024).expect("valid parameters");
            let mut last = 0.0;
            for key in 0..n as u64 {
                if let Some(estimate) = engine.observe(&key.to_le_bytes()) {
                    last = estimate;
                }
            }
            last
        })
    });

    group.finish();
}

criterion_group!(benches, bench_speed);
criterion_main!(benches);
