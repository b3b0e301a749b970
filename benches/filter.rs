use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fetchtap::config::{CaptureConfig, CaptureMode};
use fetchtap::filter::{should_capture, FilterUpdate};

const URLS: [&str; 3] = [
    "https://chat.test/chat/3fa85f64-5717-4562-b3fc-2c963f66afa6",
    "https://api.test/v1/items?page=2",
    "https://cdn.test/static/app.js",
];

fn config_for(mode: CaptureMode) -> CaptureConfig {
    let mut config = CaptureConfig {
        capture_mode: mode,
        ..CaptureConfig::default()
    };
    config
        .filter
        .merge(
            FilterUpdate::new()
                .paths(["/v1/", r"/chat/[0-9a-f-]+$"])
                .methods(["GET", "POST"])
                .status_codes([200, 201]),
        )
        .expect("valid filter");
    config
}

fn bench_should_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("should_capture");

    for mode in [CaptureMode::All, CaptureMode::ChatOnly, CaptureMode::Custom] {
        let config = config_for(mode);
        group.bench_with_input(BenchmarkId::from_parameter(mode), &config, |b, config| {
            b.iter(|| {
                for url in URLS {
                    black_box(should_capture(
                        black_box(config),
                        black_box(url),
                        black_box("POST"),
                        black_box(Some(200)),
                    ));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_should_capture);
criterion_main!(benches);
