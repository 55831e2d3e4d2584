//! Request metrics, emitted through the `metrics` facade.
//!
//! Every call is a no-op when metrics are disabled in the config or when no
//! recorder has been installed.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

pub const REQUEST_HTTP: &str = "rpc_request_http";
pub const REQUEST_WEBSOCKET: &str = "rpc_request_websocket";
pub const REQUEST_ERRORS: &str = "rpc_request_errors";
pub const WEBSOCKET_CONNECTIONS: &str = "rpc_websocket_connections";
pub const METHOD_CALLS: &str = "rpc_method_calls";
pub const REQUEST_DURATION: &str = "rpc_request_duration";

/// Histogram buckets for `rpc_request_duration`, in seconds.
pub const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5, 0.55, 0.6,
    0.65, 0.7, 0.8, 0.9, 1.0, 1.5, 2.0, 3.0,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RpcMetrics {
    enabled: bool,
}

impl RpcMetrics {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn http_request(&self) {
        if self.enabled {
            counter!(REQUEST_HTTP).increment(1);
        }
    }

    pub fn websocket_request(&self) {
        if self.enabled {
            counter!(REQUEST_WEBSOCKET).increment(1);
        }
    }

    pub fn error(&self) {
        if self.enabled {
            counter!(REQUEST_ERRORS).increment(1);
        }
    }

    pub fn connection_opened(&self) {
        if self.enabled {
            gauge!(WEBSOCKET_CONNECTIONS).increment(1.0);
        }
    }

    pub fn connection_closed(&self) {
        if self.enabled {
            gauge!(WEBSOCKET_CONNECTIONS).decrement(1.0);
        }
    }

    pub fn method_call(&self, method: &str) {
        if self.enabled {
            counter!(METHOD_CALLS, "method" => method.to_string()).increment(1);
        }
    }

    /// Only successful calls are recorded.
    pub fn request_duration(&self, method: &str, elapsed: Duration) {
        if self.enabled {
            histogram!(REQUEST_DURATION, "method" => method.to_string())
                .record(elapsed.as_secs_f64());
        }
    }
}

pub fn describe() {
    describe_counter!(REQUEST_HTTP, "Number of HTTP requests");
    describe_counter!(REQUEST_WEBSOCKET, "Number of websocket requests");
    describe_counter!(REQUEST_ERRORS, "Number of errors");
    describe_gauge!(WEBSOCKET_CONNECTIONS, "Number of active websocket connections");
    describe_counter!(METHOD_CALLS, "Number of calls per method");
    describe_histogram!(
        REQUEST_DURATION,
        metrics::Unit::Seconds,
        "Duration of successful requests per method"
    );
}

/// Install the Prometheus recorder with a scrape listener on `listen`.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(listen: std::net::SocketAddr) -> anyhow::Result<()> {
    use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

    PrometheusBuilder::new()
        .with_http_listener(listen)
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), DURATION_BUCKETS)?
        .install()?;
    describe();

    tracing::info!("Prometheus exporter listening on {}", listen);
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use metrics::{
        Counter, Gauge, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString,
        Unit,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records totals per metric name, summed across labels.
    #[derive(Default)]
    pub(crate) struct TestRecorder {
        counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
        gauges: Mutex<HashMap<String, Arc<AtomicU64>>>,
        histograms: Mutex<HashMap<String, Arc<Samples>>>,
    }

    #[derive(Default)]
    struct Samples(AtomicU64);

    impl HistogramFn for Samples {
        fn record(&self, _value: f64) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn slot<T: Default>(map: &Mutex<HashMap<String, Arc<T>>>, key: &Key) -> Arc<T> {
        map.lock()
            .unwrap()
            .entry(key.name().to_string())
            .or_default()
            .clone()
    }

    impl TestRecorder {
        pub(crate) fn counter(&self, name: &str) -> u64 {
            self.counters
                .lock()
                .unwrap()
                .get(name)
                .map_or(0, |c| c.load(Ordering::SeqCst))
        }

        pub(crate) fn gauge(&self, name: &str) -> f64 {
            self.gauges
                .lock()
                .unwrap()
                .get(name)
                .map_or(0.0, |g| f64::from_bits(g.load(Ordering::SeqCst)))
        }

        /// Number of samples recorded under `name`.
        pub(crate) fn samples(&self, name: &str) -> u64 {
            self.histograms
                .lock()
                .unwrap()
                .get(name)
                .map_or(0, |h| h.0.load(Ordering::SeqCst))
        }
    }

    impl Recorder for TestRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            Counter::from_arc(slot(&self.counters, key))
        }

        fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::from_arc(slot(&self.gauges, key))
        }

        fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::from_arc(slot(&self.histograms, key))
        }
    }
}
