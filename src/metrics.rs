//! Prometheus metrics collection for the gateway
//!
//! This module provides metrics instrumentation for tracking:
//! - Request counts by protocol and response status
//! - Bedrock call latency by protocol
//! - Bedrock call failures by protocol and failure kind
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector for the gateway
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    provider_duration: HistogramVec,
    provider_errors: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 5 protocol labels × 5 status codes
        let requests_total = IntCounterVec::new(
            Opts::new(
                "bedrock_gateway_requests_total",
                "Total number of requests by protocol and response status",
            ),
            &["protocol", "status"],
        )?;

        let provider_duration = HistogramVec::new(
            HistogramOpts::new(
                "bedrock_gateway_provider_duration_ms",
                "Bedrock call latency in milliseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0,
            ]),
            &["protocol"],
        )?;

        // kind: service (vendor error code), transport, credentials, decode
        let provider_errors = IntCounterVec::new(
            Opts::new(
                "bedrock_gateway_provider_errors_total",
                "Total number of failed Bedrock calls by protocol and failure kind",
            ),
            &["protocol", "kind"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(provider_duration.clone()))?;
        registry.register(Box::new(provider_errors.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            provider_duration,
            provider_errors,
        })
    }

    /// Record a finished request
    pub fn record_request(&self, protocol: &str, status: u16) {
        self.requests_total
            .with_label_values(&[protocol, status.to_string().as_str()])
            .inc();
    }

    /// Get the request count for a protocol/status pair
    pub fn requests_count(&self, protocol: &str, status: u16) -> u64 {
        self.requests_total
            .with_label_values(&[protocol, status.to_string().as_str()])
            .get()
    }

    /// Record Bedrock call duration
    ///
    /// # Errors
    ///
    /// Returns an error if `duration_ms` is NaN, infinite, or negative.
    pub fn record_provider_duration(
        &self,
        protocol: &str,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Invalid duration_ms: {} (must be finite and non-negative)",
                duration_ms
            )));
        }

        self.provider_duration
            .with_label_values(&[protocol])
            .observe(duration_ms);
        Ok(())
    }

    /// Record a failed Bedrock call
    pub fn provider_error(&self, protocol: &str, kind: &str) {
        self.provider_errors.with_label_values(&[protocol, kind]).inc();
    }

    /// Get the failure count for a protocol/kind pair
    pub fn provider_errors_count(&self, protocol: &str, kind: &str) -> u64 {
        self.provider_errors.with_label_values(&[protocol, kind]).get()
    }

    /// Encode all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("Metrics output is not UTF-8: {}", e)))
    }
}
