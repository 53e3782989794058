//! Prometheus metrics for relay monitoring
//!
//! Counters land in the default registry; an embedding service decides
//! how to expose them. [`encode_text`] renders the standard text format.

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};

use crate::error::ErrorKind;

lazy_static! {
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "tx_relayer_transactions_submitted_total",
        "Total transactions broadcast",
        &["chain_id"]
    )
    .unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "tx_relayer_transactions_confirmed_total",
        "Total transactions confirmed with success status",
        &["chain_id"]
    )
    .unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "tx_relayer_transactions_failed_total",
        "Total failed submissions by error kind",
        &["chain_id", "kind"]
    )
    .unwrap();

    pub static ref RETRIES: CounterVec = register_counter_vec!(
        "tx_relayer_retries_total",
        "Total retry attempts by operation",
        &["operation"]
    )
    .unwrap();
}

pub fn record_tx_submitted(chain_id: u64) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_confirmed(chain_id: u64) {
    TX_CONFIRMED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_tx_failed(chain_id: u64, kind: ErrorKind) {
    TX_FAILED
        .with_label_values(&[&chain_id.to_string(), kind.as_str()])
        .inc();
}

pub fn record_retry(operation: &str) {
    RETRIES.with_label_values(&[operation]).inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn encode_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
