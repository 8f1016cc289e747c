use axum::{body::Body, http::Request, http::StatusCode, response::Response};
use lazy_static::lazy_static;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry,
};
use std::sync::Once;
use tracing::Span;

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Simple request counter
    pub static ref INCOMING_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("incoming_requests", "The number of HTTP requests received"),
        &["http_method"]
    ).unwrap();
    // Request counter by status code
    pub static ref RESPONSE_CODE_COLLECTOR: IntCounterVec = IntCounterVec::new(
        Opts::new("outgoing_response", "The number of responses sent."),
        &["status_code"]
    ).unwrap();
    // Request histogram by response time
    pub static ref RESPONSE_TIME_COLLECTOR: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("response_time", "The time taken to respond to each request"),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(), // Change buckets here if desired
        },
        &[],
    ).unwrap();
    // Bytes written to scratch space by item downloads
    pub static ref ITEM_DOWNLOAD_BYTES: IntCounter = IntCounter::new(
        "item_download_bytes", "The number of bytes downloaded from the asset store"
    ).unwrap();
    // Archive members extracted into scratch space
    pub static ref ARCHIVE_MEMBERS_EXTRACTED: IntCounter = IntCounter::new(
        "archive_members_extracted", "The number of archive members extracted"
    ).unwrap();
    // Encoder run time
    pub static ref TRANSCODE_TIME: Histogram = Histogram::with_opts(
        HistogramOpts::new("transcode_time", "The time taken by each encoder run")
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0])
    ).unwrap();
}

static REGISTER: Once = Once::new();

/// Register all collectors with [REGISTRY]. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(INCOMING_REQUESTS.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(RESPONSE_CODE_COLLECTOR.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(RESPONSE_TIME_COLLECTOR.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(ITEM_DOWNLOAD_BYTES.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(ARCHIVE_MEMBERS_EXTRACTED.clone()))
            .unwrap();
        REGISTRY
            .register(Box::new(TRANSCODE_TIME.clone()))
            .unwrap();
    });
}

/// Render all registered metrics in the Prometheus text format.
pub async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Increments the prometheus counter on all incoming requests, labelled by http method
pub fn request_counter(request: &Request<Body>, _span: &Span) {
    INCOMING_REQUESTS
        .with_label_values(&[&request.method().to_string().to_ascii_uppercase()])
        .inc();
}

/// Increment the prometheus counter on all outgoing responses, labelled by status code
pub fn record_response_metrics<B>(
    response: &Response<B>,
    latency: std::time::Duration,
    _span: &Span,
) {
    RESPONSE_CODE_COLLECTOR
        .with_label_values(&[response.status().as_str()])
        .inc();

    RESPONSE_TIME_COLLECTOR
        .with_label_values(&[])
        .observe(latency.as_secs_f64());
}
