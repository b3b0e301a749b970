use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fetchtap::config::CaptureMode;
use fetchtap::network::{Body, FetchResponse};
use fetchtap::record::{CaptureRecord, MonotonicClock};
use fetchtap::recording::StreamCapture;
use hyper::HeaderMap;

fn bench_stream_capture(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let capture = StreamCapture::new(MonotonicClock::new(), None);

    let mut group = c.benchmark_group("stream_capture");

    for fragments in [16, 256, 4_096] {
        let chunk = Bytes::from("data: {\"delta\":\"héllo wörld\"}\n\n");
        group.throughput(Throughput::Bytes((chunk.len() * fragments) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(fragments),
            &fragments,
            |b, &fragments| {
                b.iter(|| {
                    rt.block_on(async {
                        let body = Body::from_chunks(vec![chunk.clone(); fragments]);
                        let response = FetchResponse::new(200, HeaderMap::new(), body);
                        let record = CaptureRecord::new(
                            "req_1".to_string(),
                            "https://api.test/stream",
                            "POST",
                            CaptureMode::All,
                            0.0,
                        );
                        capture.run(record, response).await
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_stream_capture);
criterion_main!(benches);
