//! Prometheus metrics for the gateway.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::inference::lifecycle::LifecyclePhase;

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: HistogramVec,
    in_flight: IntGauge,
    phase: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Requests handled, by endpoint and outcome"),
            &["endpoint", "outcome"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "gateway_request_duration_seconds",
                "Generation request latency in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
            &["endpoint"],
        )?;
        let in_flight = IntGauge::new(
            "gateway_engine_in_flight",
            "Submissions currently awaiting the engine",
        )?;
        let phase = IntGauge::new(
            "gateway_engine_phase",
            "Engine lifecycle phase (0=uninitialized 1=initializing 2=ready 3=draining 4=stopped)",
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;
        registry.register(Box::new(phase.clone()))?;

        Ok(Self {
            registry,
            requests,
            duration,
            in_flight,
            phase,
        })
    }

    /// Record one finished request.
    pub fn observe(&self, endpoint: &str, outcome: &str, elapsed: Duration) {
        self.requests.with_label_values(&[endpoint, outcome]).inc();
        self.duration
            .with_label_values(&[endpoint])
            .observe(elapsed.as_secs_f64());
    }

    pub fn set_engine(&self, phase: LifecyclePhase, in_flight: usize) {
        self.phase.set(phase.code());
        self.in_flight.set(in_flight as i64);
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
