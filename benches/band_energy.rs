use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use lightshow_sync::analysis::{AnalysisConfig, BandEnergyEngine};
use lightshow_sync::protocol::e131::PacketEncoder;
use std::f32::consts::PI;
use std::hint::black_box;

fn test_block(chunk_size: usize) -> Vec<i16> {
    (0..chunk_size)
        .map(|i| {
            let t = i as f32 / 44100.0;
            ((2.0 * PI * 440.0 * t).sin() * 12000.0 + (2.0 * PI * 3000.0 * t).sin() * 6000.0) as i16
        })
        .collect()
}

fn bench_calculate_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("calculate_levels");
    for chunk_size in [1024, 2048, 4096] {
        let mut engine = BandEnergyEngine::new(AnalysisConfig::new(chunk_size, 44100, 8)).unwrap();
        let block = test_block(chunk_size);

        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), &block, |b, block| {
            b.iter(|| black_box(engine.calculate_levels(black_box(block))));
        });
    }
    group.finish();
}

fn bench_encode_universe(c: &mut Criterion) {
    let encoder = PacketEncoder::new("bench", 100);
    let channels = vec![128u8; 512];

    c.bench_function("e131_encode_full_universe", |b| {
        b.iter(|| black_box(encoder.encode(1, 0, black_box(&channels)).unwrap()));
    });
}

criterion_group!(benches, bench_calculate_levels, bench_encode_universe);
criterion_main!(benches);
