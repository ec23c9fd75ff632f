//! Frame codec benchmarks

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use zbc_client::protocol::{Frame, Reply, Request, Response};

fn encode_benchmark(c: &mut Criterion) {
    let frame = Frame::request_response(1, 42, Request::Add { a: 40, b: 2 }.encode());

    let mut group = c.benchmark_group("frame_encode");
    group.throughput(Throughput::Bytes(frame.encoded_len() as u64));

    group.bench_function("add_request", |b| {
        let mut buf = BytesMut::with_capacity(256);
        b.iter(|| {
            buf.clear();
            black_box(&frame).encode(&mut buf);
            black_box(&buf);
        })
    });

    group.bench_function("failure_response", |b| {
        let response = Response::failure(1, 1, "9223372036854775807 + 1 overflows i64");
        b.iter(|| black_box(black_box(&response).encode()))
    });

    group.finish();
}

fn decode_benchmark(c: &mut Criterion) {
    let reply = Frame::request_response(1, 42, Response::Success(Reply::Sum(42)).encode());
    let wire = reply.to_bytes();

    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Bytes(wire.len() as u64));

    group.bench_function("sum_response", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(&wire[..]);
            let frame = Frame::decode(&mut buf, 64 * 1024).unwrap().unwrap();
            black_box(Response::decode(frame.body()).unwrap())
        })
    });

    // 64 back-to-back frames arriving in one read
    let mut burst = BytesMut::new();
    for request_id in 0..64 {
        Frame::request_response(1, request_id, Request::Ping.encode()).encode(&mut burst);
    }
    let burst = burst.freeze();

    group.throughput(Throughput::Bytes(burst.len() as u64));
    group.bench_function("burst_64", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(&burst[..]);
            let mut count = 0;
            while let Some(frame) = Frame::decode(&mut buf, 64 * 1024).unwrap() {
                black_box(frame);
                count += 1;
            }
            assert_eq!(count, 64);
        })
    });

    group.finish();
}

criterion_group!(benches, encode_benchmark, decode_benchmark);
criterion_main!(benches);
