use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, TextEncoder};

static FEED_PAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "sharebook_feed_pages_total",
            "Feed page loads by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create sharebook_feed_pages_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register sharebook_feed_pages_total");
    counter
});

static LIVE_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "sharebook_live_events_total",
            "Live change events received by table and kind",
        ),
        &["table", "kind"],
    )
    .expect("failed to create sharebook_live_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register sharebook_live_events_total");
    counter
});

static OPTIMISTIC_REVERTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "sharebook_optimistic_reverts_total",
            "Optimistic local changes undone after a backend failure",
        ),
        &["action"],
    )
    .expect("failed to create sharebook_optimistic_reverts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register sharebook_optimistic_reverts_total");
    counter
});

static UNSEEN_NOTIFICATIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "sharebook_unseen_notifications",
        "Unseen notifications for the signed-in user",
    )
    .expect("failed to create sharebook_unseen_notifications");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register sharebook_unseen_notifications");
    gauge
});

static PAGE_FETCH_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "sharebook_page_fetch_seconds",
            "Latency of feed page fetches",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0]),
        &["outcome"],
    )
    .expect("failed to create sharebook_page_fetch_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register sharebook_page_fetch_seconds");
    histogram
});

pub fn record_page(outcome: &str) {
    FEED_PAGES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn observe_page_fetch(outcome: &str, elapsed: Duration) {
    PAGE_FETCH_SECONDS
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}

pub fn record_live_event(table: &str, kind: &str) {
    LIVE_EVENTS_TOTAL.with_label_values(&[table, kind]).inc();
}

pub fn record_revert(action: &str) {
    OPTIMISTIC_REVERTS_TOTAL.with_label_values(&[action]).inc();
}

pub fn set_unseen_notifications(count: usize) {
    UNSEEN_NOTIFICATIONS.set(count as i64);
}

/// Every registered metric in the text exposition format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %err, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
