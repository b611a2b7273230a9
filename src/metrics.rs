use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

// Execution attempts, including retries
static ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pingroute_execution_attempts_total",
        "The total number of request execution attempts"
    )
    .unwrap()
});

// Attempts approved for retry after an I/O failure
static RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pingroute_retries_total",
        "The total number of retried request executions"
    )
    .unwrap()
});

// Connections handed back to the pool
static RELEASED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pingroute_connections_released_total",
        "Connections released back to the pool",
        &["reusable"]
    )
    .unwrap()
});

// Connections closed or aborted and dropped from the pool
static DISCARDED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pingroute_connections_discarded_total",
        "Connections discarded from the pool"
    )
    .unwrap()
});

// Tunnel requests answered with a non-2xx status
static TUNNELS_REFUSED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "pingroute_tunnels_refused_total",
        "Tunnel requests refused by a proxy"
    )
    .unwrap()
});

pub(crate) fn record_attempt() {
    ATTEMPTS.inc();
}

pub(crate) fn record_retry() {
    RETRIES.inc();
}

pub(crate) fn record_release(reusable: bool) {
    let label = if reusable { "true" } else { "false" };
    RELEASED.with_label_values(&[label]).inc();
}

pub(crate) fn record_discard() {
    DISCARDED.inc();
}

pub(crate) fn record_tunnel_refused() {
    TUNNELS_REFUSED.inc();
}
