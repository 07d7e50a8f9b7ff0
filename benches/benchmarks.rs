//! Performance benchmarks for the barews frame codec and handshake.
//!
//! Run with: `cargo bench`

use barews::protocol::handshake::server_accept_response;
use barews::protocol::mask::{apply_mask, apply_mask_fast};
use barews::protocol::{
    ClientHandshake, Frame, OpCode, RequestHead, compute_accept_key, decode, encode,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

// =============================================================================
// Frame Parsing Benchmarks
// =============================================================================

fn create_unmasked_frame(payload_size: usize) -> Vec<u8> {
    encode(&vec![0xAB; payload_size]).unwrap()
}

fn create_masked_frame(payload_size: usize) -> Vec<u8> {
    Frame::new(true, OpCode::Binary, vec![0xAB; payload_size])
        .to_wire(Some(0x37fa_213d))
        .unwrap()
}

fn bench_frame_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_parsing");

    for size in [10usize, 1024, 60 * 1024] {
        let unmasked = create_unmasked_frame(size);
        let masked = create_masked_frame(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("unmasked", size), &unmasked, |b, wire| {
            b.iter(|| Frame::parse(black_box(wire)))
        });
        group.bench_with_input(BenchmarkId::new("masked", size), &masked, |b, wire| {
            b.iter(|| Frame::parse(black_box(wire)))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &masked, |b, wire| {
            b.iter(|| decode(black_box(wire)))
        });
    }

    group.finish();
}

// =============================================================================
// Frame Encoding Benchmarks
// =============================================================================

fn bench_frame_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encoding");

    for size in [10usize, 125, 126, 1024, 60 * 1024] {
        let payload = vec![0x5A; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &payload, |b, payload| {
            b.iter(|| encode(black_box(payload)))
        });
    }

    group.finish();
}

// =============================================================================
// Masking Benchmarks
// =============================================================================

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");
    let mask = [0x37, 0xfa, 0x21, 0x3d];

    for size in [64usize, 1024, 64 * 1024] {
        let mut data = vec![0xAB; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(BenchmarkId::new("bytewise", size), |b| {
            b.iter(|| apply_mask(black_box(&mut data), black_box(mask)))
        });
        group.bench_function(BenchmarkId::new("word", size), |b| {
            b.iter(|| apply_mask_fast(black_box(&mut data), black_box(mask)))
        });
    }

    group.finish();
}

// =============================================================================
// Handshake Benchmarks
// =============================================================================

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");

    group.bench_function("compute_accept_key", |b| {
        b.iter(|| compute_accept_key(black_box("dGhlIHNhbXBsZSBub25jZQ==")))
    });

    let handshake =
        ClientHandshake::with_nonce("dGhlIHNhbXBsZSBub25jZQ==", "server.example.com", "/chat");
    group.bench_function("client_request", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(256);
            handshake.write_request(&mut buf);
            buf
        })
    });

    let mut raw = Vec::new();
    handshake.write_request(&mut raw);
    group.bench_function("server_accept", |b| {
        b.iter(|| {
            let request = RequestHead::parse(black_box(&raw)).unwrap();
            server_accept_response(&request)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_parsing,
    bench_frame_encoding,
    bench_masking,
    bench_handshake
);
criterion_main!(benches);
