use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use http::HeaderMap;
use ratelimiter::config::AppConfig;
use ratelimiter::rate_limit::{client_ip, Identity, LimiterConfig, MemoryStore, RateLimiter};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn create_limiter() -> RateLimiter {
    let config = LimiterConfig {
        ip_limit: u64::MAX,
        ip_block_duration: Duration::from_secs(300),
        token_limit: u64::MAX,
        token_block_duration: Duration::from_secs(300),
    };
    RateLimiter::new(config, Arc::new(MemoryStore::new()))
}

fn benchmark_allow_single_key(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to create runtime");
    let limiter = create_limiter();
    let identity = Identity::from_address("10.0.0.1");

    c.bench_function("allow_single_key", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(limiter.allow(&identity).await.unwrap()) })
    });
}

fn benchmark_allow_many_keys(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to create runtime");
    let mut group = c.benchmark_group("allow_many_keys");

    for num_keys in [10, 1_000, 100_000].iter() {
        let limiter = create_limiter();
        let identities: Vec<Identity> = (0..*num_keys)
            .map(|i| Identity::new("10.0.0.1", Some(format!("token-{}", i))))
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(num_keys),
            num_keys,
            |b, &_num| {
                let mut next = 0;
                b.to_async(&rt).iter(|| {
                    let identity = &identities[next % identities.len()];
                    next += 1;
                    let limiter = &limiter;
                    async move { black_box(limiter.allow(identity).await.unwrap()) }
                })
            },
        );
    }
    group.finish();
}

fn benchmark_blocked_key(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to create runtime");
    let config = LimiterConfig {
        ip_limit: 1,
        ip_block_duration: Duration::from_secs(3600),
        token_limit: 1,
        token_block_duration: Duration::from_secs(3600),
    };
    let limiter = RateLimiter::new(config, Arc::new(MemoryStore::new()));
    let identity = Identity::from_address("10.0.0.2");

    rt.block_on(async {
        limiter.allow(&identity).await.unwrap();
        limiter.allow(&identity).await.unwrap();
    });

    c.bench_function("allow_blocked_key", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(limiter.allow(&identity).await.unwrap()) })
    });
}

fn benchmark_client_ip(c: &mut Criterion) {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-forwarded-for",
        "203.0.113.7, 10.0.0.1, 10.0.0.2".parse().unwrap(),
    );
    let peer = Some("10.0.0.2:5000".parse().unwrap());

    c.bench_function("client_ip_forwarded_for", |b| {
        b.iter(|| black_box(client_ip(&headers, peer)))
    });
}

fn benchmark_config_parsing(c: &mut Criterion) {
    let yaml = r#"
server:
  host: "0.0.0.0"
  port: 8080

rate_limit:
  ip_limit: 5
  token_limit: 10

storage:
  backend: memory
"#;

    c.bench_function("config_parsing", |b| {
        b.iter(|| black_box(AppConfig::from_yaml(yaml)))
    });
}

criterion_group!(
    benches,
    benchmark_allow_single_key,
    benchmark_allow_many_keys,
    benchmark_blocked_key,
    benchmark_client_ip,
    benchmark_config_parsing
);
criterion_main!(benches);
