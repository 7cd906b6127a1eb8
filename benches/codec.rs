//! PDU 프레이밍 벤치마크

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use vstream::pdu::{decode, frame, Pdu, FRAME_HEADER_LEN};
use vstream::MAX_PDU_SIZE;

fn bench_frame(c: &mut Criterion) {
    let payload: Vec<u8> = (0..MAX_PDU_SIZE).map(|i| i as u8).collect();
    let pdu = Pdu::data(1, payload);

    let mut group = c.benchmark_group("pdu");
    group.throughput(Throughput::Bytes(MAX_PDU_SIZE as u64));

    group.bench_function("frame_max_payload", |b| {
        b.iter(|| frame(black_box(&pdu)))
    });

    let framed = frame(&pdu).unwrap_or_default();
    group.bench_function("decode_max_payload", |b| {
        b.iter(|| decode(black_box(&framed[FRAME_HEADER_LEN..])))
    });

    group.finish();
}

criterion_group!(benches, bench_frame);
criterion_main!(benches);
