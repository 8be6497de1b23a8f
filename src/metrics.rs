use prometheus::{Encoder, TextEncoder, HistogramVec, IntCounterVec, GaugeVec, Opts, Registry};
use warp::Filter;
use std::net::SocketAddr;
use once_cell::sync::{Lazy, OnceCell};
use tracing::error;

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static REQUEST_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("config_probe_requests_total", "Total number of config probe requests");
    let ctr = IntCounterVec::new(opts, &["scheme", "outcome"]).unwrap();
    REGISTRY.register(Box::new(ctr.clone())).unwrap();
    ctr
});

static LATENCY_GAUGE: Lazy<GaugeVec> = Lazy::new(|| {
    let opts = Opts::new(
        "config_probe_latency_milliseconds_current",
        "Most recent connect latency in milliseconds",
    );
    let gauge = GaugeVec::new(opts, &["scheme"]).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

static INACTIVE_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("config_probe_inactive_total", "Total number of inactive probe results");
    let ctr = IntCounterVec::new(opts, &["reason"]).unwrap();
    REGISTRY.register(Box::new(ctr.clone())).unwrap();
    ctr
});

// Only set when latency history is enabled
static LATENCY_HIST: OnceCell<HistogramVec> = OnceCell::new();

pub fn initialize_metrics(enable_latency_history: bool) {
    Lazy::force(&REQUEST_COUNTER);
    Lazy::force(&LATENCY_GAUGE);
    Lazy::force(&INACTIVE_COUNTER);

    if !enable_latency_history {
        return;
    }

    let opts = Opts::new("config_probe_latency_milliseconds", "Connect latency in milliseconds");
    let hist = HistogramVec::new(
        prometheus::HistogramOpts {
            common_opts: opts,
            buckets: vec![
                1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0,
                250.0, 500.0, 1000.0, 2500.0, 5000.0,
            ],
        },
        &["scheme"],
    ).expect("creating histogram");

    if LATENCY_HIST.set(hist.clone()).is_ok() {
        if let Err(e) = REGISTRY.register(Box::new(hist)) {
            error!("failed to register latency histogram: {:?}", e);
        }
    }
}

pub async fn serve_metrics(addr: SocketAddr) {
    let metrics_route = warp::path!("metrics").map(move || {
        let encoder = TextEncoder::new();
        let mf = REGISTRY.gather();
        let mut buf = Vec::new();
        if let Err(e) = encoder.encode(&mf, &mut buf) {
            error!("failed to encode metrics: {:?}", e);
        }
        warp::reply::with_header(buf, "Content-Type", encoder.format_type().to_string())
    });

    warp::serve(metrics_route).run(addr).await;
}

pub fn observe_active(scheme: &str, latency_ms: u64) {
    REQUEST_COUNTER.with_label_values(&[scheme, "active"]).inc();
    LATENCY_GAUGE
        .with_label_values(&[scheme])
        .set(latency_ms as f64);

    if let Some(hist) = LATENCY_HIST.get() {
        hist.with_label_values(&[scheme]).observe(latency_ms as f64);
    }
}

pub fn observe_inactive(scheme: &str, reason: &str) {
    REQUEST_COUNTER.with_label_values(&[scheme, "inactive"]).inc();
    INACTIVE_COUNTER.with_label_values(&[reason]).inc();
}

pub fn inc_invalid(scheme: &str) {
    REQUEST_COUNTER.with_label_values(&[scheme, "invalid"]).inc();
}

#[cfg(test)]
pub(crate) fn request_count(scheme: &str, outcome: &str) -> u64 {
    REQUEST_COUNTER.with_label_values(&[scheme, outcome]).get()
}
