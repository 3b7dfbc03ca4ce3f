//! Append and read throughput of the chunk engine

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tensorchunk::{
    ChunkConfig, ChunkEngine, Compression, Dtype, Htype, MemoryProvider, Sample, SampleArray, TensorMeta,
};

fn random_samples(count: usize, len: usize) -> Vec<Sample> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..count)
        .map(|_| {
            let values: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            SampleArray::from_vec(values).into()
        })
        .collect()
}

fn engine(meta: TensorMeta) -> ChunkEngine {
    let config = ChunkConfig::with_max_chunk_size(1 << 20);
    let engine = ChunkEngine::new("bench", Arc::new(MemoryProvider::new()), config);
    engine.create_tensor(meta).expect("create tensor");
    engine
}

fn bench_extend(c: &mut Criterion) {
    let mut group = c.benchmark_group("extend");
    let metas = [
        ("uncompressed", TensorMeta::new(Htype::Generic, Dtype::U8)),
        (
            "sample_lz4",
            TensorMeta::new(Htype::Generic, Dtype::U8).with_sample_compression(Compression::Lz4),
        ),
        (
            "chunk_zstd",
            TensorMeta::new(Htype::Generic, Dtype::U8).with_chunk_compression(Compression::Zstd),
        ),
    ];

    for len in [256usize, 16 * 1024] {
        let samples = random_samples(256, len);
        group.throughput(Throughput::Bytes((256 * len) as u64));
        for (name, meta) in &metas {
            group.bench_with_input(BenchmarkId::new(*name, len), &samples, |b, samples| {
                b.iter(|| {
                    let mut engine = engine(meta.clone());
                    engine.extend(samples.clone()).expect("extend");
                    engine.flush().expect("flush");
                    black_box(engine.num_samples().expect("length"))
                });
            });
        }
    }
    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_sample");
    let mut engine = engine(TensorMeta::new(Htype::Generic, Dtype::U8));
    engine.extend(random_samples(1024, 4096)).expect("extend");
    engine.flush().expect("flush");

    group.bench_function("sequential", |b| {
        b.iter(|| {
            for i in 0..1024 {
                black_box(engine.read_sample(i, true).expect("read"));
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_extend, bench_read);
criterion_main!(benches);
