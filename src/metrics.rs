//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Node health (delay windows, failures)
//! - Pool membership
//! - Execution attempts, retries and latency
//! - Chunked transactions
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `ledger_client_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! Nothing is exported unless the application installs a `metrics` recorder.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a transient failure penalty on a node.
pub fn record_node_failure(network: &str, node: &str, next_delay: Duration) {
    counter!("ledger_client_node_failures_total", "network" => network.to_string(), "node" => node.to_string()).increment(1);
    gauge!("ledger_client_node_delay_seconds", "network" => network.to_string(), "node" => node.to_string())
        .set(next_delay.as_secs_f64());
}

/// Record a successful response from a node.
pub fn record_node_success(network: &str, node: &str, delay: Duration) {
    gauge!("ledger_client_node_delay_seconds", "network" => network.to_string(), "node" => node.to_string())
        .set(delay.as_secs_f64());
}

/// Set the number of nodes currently in a pool.
pub fn set_pool_size(network: &str, count: usize) {
    gauge!("ledger_client_pool_nodes", "network" => network.to_string()).set(count as f64);
}

/// Record nodes taken out of selection after repeated failures.
pub fn record_nodes_parked(network: &str, count: usize) {
    counter!("ledger_client_nodes_parked_total", "network" => network.to_string()).increment(count as u64);
}

/// Record parked nodes returned to selection.
pub fn record_nodes_readmitted(network: &str, count: usize) {
    counter!("ledger_client_nodes_readmitted_total", "network" => network.to_string()).increment(count as u64);
}

/// Record a hot replacement of a pool's node set.
pub fn record_pool_update(network: &str, added: usize, removed: usize) {
    counter!("ledger_client_pool_nodes_added_total", "network" => network.to_string()).increment(added as u64);
    counter!("ledger_client_pool_nodes_removed_total", "network" => network.to_string()).increment(removed as u64);
}

/// Record one attempt and how it ended.
///
/// `outcome` is one of `success`, `transport_retry`, `status_retry`, `failed`.
pub fn record_attempt(method: &str, node: &str, outcome: &str) {
    counter!(
        "ledger_client_attempts_total",
        "method" => method.to_string(),
        "node" => node.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a transport-level failure.
pub fn record_transport_error(node: &str, code: &str) {
    counter!("ledger_client_transport_errors_total", "node" => node.to_string(), "code" => code.to_string()).increment(1);
}

/// Record a backoff wait before a retry.
pub fn record_backoff(method: &str, delay: Duration) {
    histogram!("ledger_client_backoff_seconds", "method" => method.to_string()).record(delay.as_secs_f64());
}

/// Record a finished execution (all attempts).
pub fn record_execution(method: &str, outcome: &str, attempts: u32, duration: Duration) {
    counter!("ledger_client_executions_total", "method" => method.to_string(), "outcome" => outcome.to_string())
        .increment(1);
    histogram!("ledger_client_execution_attempts", "method" => method.to_string()).record(attempts as f64);
    histogram!("ledger_client_execution_seconds", "method" => method.to_string()).record(duration.as_secs_f64());
}

/// Record how many chunks a transaction was split into.
pub fn record_chunked_transaction(chunks: usize, payload_bytes: usize) {
    histogram!("ledger_client_transaction_chunks").record(chunks as f64);
    histogram!("ledger_client_chunked_payload_bytes").record(payload_bytes as f64);
}

/// Record that a chunk reached a terminal outcome.
pub fn record_chunk(outcome: &str) {
    counter!("ledger_client_chunks_total", "outcome" => outcome.to_string()).increment(1);
}

/// Lifecycle states reported by `ledger_client_state`.
const CLIENT_STATES: [&str; 3] = ["Open", "Closing", "Closed"];

/// Set the client lifecycle state. The current state reads 1, the others 0.
pub fn set_client_state(state: &str) {
    for known in CLIENT_STATES {
        let value = if known == state { 1.0 } else { 0.0 };
        gauge!("ledger_client_state", "state" => known).set(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::{Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    // Without a recorder installed these are no-ops; the tests make sure the
    // label sets are well-formed and nothing panics.

    #[test]
    fn test_record_node_metrics() {
        record_node_failure("consensus", "0.0.3", Duration::from_millis(500));
        record_node_success("consensus", "0.0.3", Duration::from_millis(250));
    }

    #[test]
    fn test_record_pool_metrics() {
        set_pool_size("mirror", 2);
        record_pool_update("consensus", 3, 1);
        record_pool_update("consensus", 0, 0);
        record_nodes_parked("consensus", 1);
        record_nodes_readmitted("consensus", 1);
    }

    #[test]
    fn test_record_execution_metrics() {
        record_attempt("submitTransaction", "0.0.3", "success");
        record_transport_error("0.0.3", "UNAVAILABLE");
        record_backoff("submitTransaction", Duration::from_millis(750));
        record_execution("submitTransaction", "success", 3, Duration::from_millis(20));
    }

    #[test]
    fn test_record_chunk_metrics() {
        record_chunked_transaction(4, 4000);
        record_chunk("success");
    }

    /// Captures `ledger_client_state` gauge values by their `state` label.
    #[derive(Default)]
    struct StateRecorder {
        values: Arc<Mutex<HashMap<String, f64>>>,
    }

    struct StateSlot {
        state: String,
        values: Arc<Mutex<HashMap<String, f64>>>,
    }

    impl GaugeFn for StateSlot {
        fn increment(&self, value: f64) {
            *self.values.lock().unwrap().entry(self.state.clone()).or_default() += value;
        }

        fn decrement(&self, value: f64) {
            *self.values.lock().unwrap().entry(self.state.clone()).or_default() -= value;
        }

        fn set(&self, value: f64) {
            self.values.lock().unwrap().insert(self.state.clone(), value);
        }
    }

    impl Recorder for StateRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
            Counter::noop()
        }

        fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
            if key.name() != "ledger_client_state" {
                return Gauge::noop();
            }
            let state = key
                .labels()
                .find(|label| label.key() == "state")
                .map(|label| label.value().to_string())
                .unwrap_or_default();
            Gauge::from_arc(Arc::new(StateSlot {
                state,
                values: self.values.clone(),
            }))
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_client_state_gauge_clears_previous_state() {
        let recorder = StateRecorder::default();
        metrics::with_local_recorder(&recorder, || {
            set_client_state("Open");
            set_client_state("Closing");
            set_client_state("Closed");
        });

        let values = recorder.values.lock().unwrap();
        assert_eq!(values.get("Open"), Some(&0.0));
        assert_eq!(values.get("Closing"), Some(&0.0));
        assert_eq!(values.get("Closed"), Some(&1.0));
    }
}
