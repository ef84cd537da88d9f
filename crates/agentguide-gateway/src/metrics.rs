use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("gateway_requests_total", "Total number of resource requests"),
        &["method", "status"],
    )
    .unwrap()
});

pub static SELLER_CHALLENGES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_seller_challenges_total",
        "Total number of 402 challenges emitted",
    )
    .unwrap()
});

pub static PAYMENTS_SETTLED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_payments_settled_total",
        "Total number of seller payments verified and settled",
    )
    .unwrap()
});

pub static PAYMENTS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_payments_failed_total",
        "Total number of seller payments rejected",
    )
    .unwrap()
});

pub static BUYER_RETRIES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_buyer_retries_total",
        "Total number of buyer-mode payment retries",
    )
    .unwrap()
});

pub static BUYER_PAYMENT_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_buyer_payment_failures_total",
        "Total number of buyer-mode payment construction failures",
    )
    .unwrap()
});

pub static PROXY_LATENCY: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("gateway_proxy_latency_seconds", "Proxy request latency")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .unwrap()
});

/// Register all metrics with the registry. Idempotent across callers is not
/// required; call once at startup.
pub fn register_metrics() {
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(SELLER_CHALLENGES.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(PAYMENTS_SETTLED.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(PAYMENTS_FAILED.clone()))
        .unwrap();
    REGISTRY.register(Box::new(BUYER_RETRIES.clone())).unwrap();
    REGISTRY
        .register(Box::new(BUYER_PAYMENT_FAILURES.clone()))
        .unwrap();
    REGISTRY.register(Box::new(PROXY_LATENCY.clone())).unwrap();
}
