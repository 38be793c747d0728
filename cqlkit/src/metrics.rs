use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

lazy_static! {
    pub static ref STATEMENT_DURATION: HistogramVec = register_histogram_vec!(
        "cqlkit_statement_duration_seconds",
        "Statement execution duration in seconds",
        &["operation", "driver", "status"]
    ).unwrap();

    pub static ref OPERATION_COUNTER: IntCounterVec = register_int_counter_vec!(
        "cqlkit_operations_total",
        "Total number of cluster operations",
        &["operation", "status"]
    ).unwrap();

    pub static ref RETRY_COUNTER: IntCounterVec = register_int_counter_vec!(
        "cqlkit_retries_total",
        "Statements retried after a transient error",
        &["operation", "error_kind"]
    ).unwrap();

    pub static ref RECONNECT_COUNTER: IntCounterVec = register_int_counter_vec!(
        "cqlkit_reconnects_total",
        "Cluster client replacements",
        &["driver", "status"]
    ).unwrap();

    pub static ref BATCH_SIZE: HistogramVec = register_histogram_vec!(
        "cqlkit_batch_statements",
        "Statements per dispatched batch",
        &["kind"],
        vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]
    ).unwrap();
}

pub fn record_operation(operation: &str, driver: &str, success: bool, duration: f64) {
    let status = if success { "success" } else { "failure" };
    STATEMENT_DURATION
        .with_label_values(&[operation, driver, status])
        .observe(duration);
    OPERATION_COUNTER
        .with_label_values(&[operation, status])
        .inc();
}

pub fn record_retry(operation: &str, error_kind: &str) {
    RETRY_COUNTER.with_label_values(&[operation, error_kind]).inc();
}

pub fn record_reconnect(driver: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    RECONNECT_COUNTER.with_label_values(&[driver, status]).inc();
}

pub fn record_batch(kind: &str, statements: usize) {
    BATCH_SIZE.with_label_values(&[kind]).observe(statements as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operation_counts() {
        let before = OPERATION_COUNTER.with_label_values(&["metrics_test", "success"]).get();
        record_operation("metrics_test", "memory", true, 0.01);
        let after = OPERATION_COUNTER.with_label_values(&["metrics_test", "success"]).get();
        assert_eq!(after, before + 1);
    }
}
