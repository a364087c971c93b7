//! Metrics instrumentation for docker-dns.
//!
//! All metrics are prefixed with `docker_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Success => "success",
        QueryResult::Delegated => "delegated",
        QueryResult::NoData => "no_data",
        QueryResult::NotReady => "not_ready",
    };

    counter!("docker_dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("docker_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Query returned records successfully.
    Success,
    /// Name unknown, handed to the next authority in the chain.
    Delegated,
    /// Name known but no records of the requested type.
    NoData,
    /// Table not ready (initial sync incomplete).
    NotReady,
}

/// Record a runtime event handled by the reconciler.
pub fn record_runtime_event(action: &str, outcome: EventOutcome) {
    let outcome_str = match outcome {
        EventOutcome::Applied => "applied",
        EventOutcome::Skipped => "skipped",
        EventOutcome::Ignored => "ignored",
    };

    counter!("docker_dns.runtime.event.count", "action" => action.to_string(), "outcome" => outcome_str)
        .increment(1);
}

/// What happened to a runtime event.
#[derive(Debug, Clone, Copy)]
pub enum EventOutcome {
    /// The table was updated (or already reflected the event).
    Applied,
    /// The container could not be resolved to a hostname and address.
    Skipped,
    /// Action not handled.
    Ignored,
}

/// Record an event feed (re)subscription.
pub fn record_resubscribe(reason: ResubscribeReason) {
    let reason_str = match reason {
        ResubscribeReason::StreamEnded => "stream_ended",
        ResubscribeReason::Error => "error",
        ResubscribeReason::InitialConnect => "initial_connect",
    };

    counter!("docker_dns.events.resubscribe.count", "reason" => reason_str).increment(1);
}

/// Resubscribe reasons.
#[derive(Debug, Clone, Copy)]
pub enum ResubscribeReason {
    /// Event stream ended.
    StreamEnded,
    /// Event stream or subscription failed.
    Error,
    /// First subscription at startup.
    InitialConnect,
}

/// Record table counts (call periodically or on change).
pub fn record_table_counts(hostnames: usize, addresses: usize, containers: usize) {
    gauge!("docker_dns.table.hostnames.count").set(hostnames as f64);
    gauge!("docker_dns.table.addresses.count").set(addresses as f64);
    gauge!("docker_dns.table.containers.count").set(containers as f64);
}

/// Record readiness state.
pub fn record_synced(synced: bool) {
    gauge!("docker_dns.table.synced").set(if synced { 1.0 } else { 0.0 });
}

/// Record the table serial number.
pub fn record_serial(serial: u32) {
    gauge!("docker_dns.table.serial").set(serial as f64);
}

/// Record a full rescan of running containers.
pub fn record_resync(containers: usize) {
    counter!("docker_dns.table.resync.count").increment(1);
    histogram!("docker_dns.table.resync.containers").record(containers as f64);
}

/// Record addresses returned for a successful lookup.
pub fn record_addresses_returned(count: usize) {
    histogram!("docker_dns.query.addresses_returned").record(count as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
