//! Prometheus metrics for monitoring
//!
//! Tracks:
//! - Bundle submission attempts and relay resolutions
//! - Final bundle outcomes
//! - Nonce allocations per identity
//! - Public batch sends
//!
//! The process is one-shot, so the registry is rendered into the log when a
//! command finishes instead of being served over HTTP.

use crate::identity::IdentityRole;
use crate::relay::BundleResolution;

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_int_counter, CounterVec, Encoder, IntCounter, TextEncoder,
};

lazy_static! {
    // Bundle metrics
    pub static ref BUNDLE_ATTEMPTS: IntCounter = register_int_counter!(
        "bundler_bundle_attempts_total",
        "Total bundle submissions sent to the relay"
    ).unwrap();

    pub static ref BUNDLE_RESOLUTIONS: CounterVec = register_counter_vec!(
        "bundler_bundle_resolutions_total",
        "Relay resolutions by kind",
        &["resolution"]
    ).unwrap();

    pub static ref BUNDLE_OUTCOMES: CounterVec = register_counter_vec!(
        "bundler_bundle_outcomes_total",
        "Final bundle cycle outcomes",
        &["outcome"]
    ).unwrap();

    // Identity metrics
    pub static ref NONCES_ALLOCATED: CounterVec = register_counter_vec!(
        "bundler_nonces_allocated_total",
        "Nonces handed out per identity",
        &["identity"]
    ).unwrap();

    // Batch metrics
    pub static ref BATCH_SENDS: CounterVec = register_counter_vec!(
        "bundler_batch_sends_total",
        "Public batch sends by result",
        &["result"]
    ).unwrap();
}

/// Render all registered metrics in the text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# metrics unavailable: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// Helper functions to record metrics

pub fn record_bundle_attempt() {
    BUNDLE_ATTEMPTS.inc();
}

pub fn record_resolution(resolution: &BundleResolution) {
    BUNDLE_RESOLUTIONS
        .with_label_values(&[resolution.as_str()])
        .inc();
}

pub fn record_bundle_outcome(outcome: &str) {
    BUNDLE_OUTCOMES.with_label_values(&[outcome]).inc();
}

pub fn record_nonce_allocated(role: IdentityRole) {
    NONCES_ALLOCATED.with_label_values(&[role.as_str()]).inc();
}

pub fn record_batch_sent() {
    BATCH_SENDS.with_label_values(&["confirmed"]).inc();
}

pub fn record_batch_failed() {
    BATCH_SENDS.with_label_values(&["failed"]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_series() {
        record_bundle_outcome("included");
        record_nonce_allocated(IdentityRole::Token);

        let text = render();
        assert!(text.contains("bundler_bundle_outcomes_total"));
        assert!(text.contains("identity=\"token\""));
    }
}
