use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Cursor;
use ziso::convert::{decode_stream, encode_stream};
use ziso::{ContainerKind, ContainerReader, EncodeOptions};

/// 8 MiB of half-compressible image data.
fn image() -> Vec<u8> {
    let mut seed = 0x1234_5678u32;
    (0..8 * 1024 * 1024)
        .map(|i: usize| {
            if (i / 2048) % 2 == 0 {
                (i % 64) as u8
            } else {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 24) as u8
            }
        })
        .collect()
}

fn encode(data: &[u8], opts: &EncodeOptions) -> Vec<u8> {
    let mut out = Cursor::new(Vec::with_capacity(data.len()));
    encode_stream(data, data.len() as u64, &mut out, opts, None).unwrap();
    out.into_inner()
}

fn bench_encode(c: &mut Criterion) {
    let data = image();
    let mut group = c.benchmark_group("encode_8mb");
    group.sample_size(10);
    for format in [ContainerKind::Zso, ContainerKind::Cso] {
        for parallel in [false, true] {
            let opts = EncodeOptions { format, parallel, ..Default::default() };
            let name = format!("{}_{}", format.extension(), if parallel { "parallel" } else { "sequential" });
            group.bench_function(name, |b| b.iter(|| encode(black_box(&data), &opts)));
        }
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let data = image();
    let mut group = c.benchmark_group("decode_8mb");
    group.sample_size(10);
    for format in [ContainerKind::Zso, ContainerKind::Cso] {
        let container = encode(&data, &EncodeOptions { format, ..Default::default() });
        group.bench_function(format.extension(), |b| {
            b.iter(|| {
                let reader = ContainerReader::open(Cursor::new(black_box(&container[..]))).unwrap();
                let mut out = Vec::with_capacity(data.len());
                decode_stream(reader, &mut out, None).unwrap();
                out
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
