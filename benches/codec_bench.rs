use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use gatenet::core::pool::BufferPool;
use gatenet::{Packet, PacketCodec};
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_codec_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_encode_decode");
    let body_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &body_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || {
                    let mut p = Packet::with_capacity(1000, size);
                    p.append_raw(&vec![0u8; size]);
                    p
                },
                |packet| {
                    let mut buf = BytesMut::with_capacity(size + 32);
                    let mut codec = PacketCodec::default();
                    codec.encode(packet, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("decode_{size}b"), |b| {
            let mut wire = BytesMut::new();
            let mut codec = PacketCodec::default();
            let mut p = Packet::with_capacity(1000, size);
            p.append_raw(&vec![0u8; size]);
            codec.encode(p, &mut wire).unwrap();

            b.iter_batched(
                || BytesMut::from(&wire[..]),
                |mut buf| {
                    let mut codec = PacketCodec::default();
                    let decoded = codec.decode(&mut buf).unwrap();
                    assert!(decoded.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_pool_acquire_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_acquire_release");
    let pool = BufferPool::new();

    for &size in &[64usize, 1024, 65536] {
        group.bench_function(format!("roundtrip_{size}b"), |b| {
            b.iter(|| {
                let buf = pool.acquire(size);
                pool.release(buf);
            })
        });
    }
    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_typed_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("typed_append");
    group.bench_function("mixed_fields", |b| {
        b.iter(|| {
            let mut p = Packet::new(1000);
            p.append_u32(7);
            p.append_f32(1.5);
            p.append_str("player");
            p.append_bytes(&[0u8; 32]);
            p
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_codec_encode_decode,
    bench_pool_acquire_release,
    bench_typed_append
);
criterion_main!(benches);
