//! Prometheus metrics for resctrl observability
//!
//! Populated by the gateway (control writes, capability reads), the telemetry
//! poller (occupancy) and the pressure workload.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec, Counter,
    CounterVec, Encoder, Gauge, GaugeVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Monitoring
    // ─────────────────────────────────────────────────────────────────────────────

    /// Last LLC occupancy read for a group, per monitoring domain.
    ///
    /// Labels:
    /// - group: Group name relative to the mount root (e.g. "p1", "mon_groups/m1")
    /// - domain: L3 monitoring domain index
    pub static ref LLC_OCCUPANCY_BYTES: GaugeVec = register_gauge_vec!(
        "rdtctl_llc_occupancy_bytes",
        "Last LLC occupancy read per group and L3 domain",
        &["group", "domain"]
    ).expect("failed to register LLC_OCCUPANCY_BYTES metric");

    /// Capability files that could not be opened, read or parsed.
    pub static ref CAPABILITY_READ_FAILURES: CounterVec = register_counter_vec!(
        "rdtctl_capability_read_failures_total",
        "Capability entries replaced by their sentinel value",
        &["entry"]
    ).expect("failed to register CAPABILITY_READ_FAILURES metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Allocation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Control file writes (tasks, cpus_list, schemata) by outcome.
    ///
    /// Labels:
    /// - file: Control file name
    /// - outcome: "ok" or "rejected"
    pub static ref CONTROL_WRITES: CounterVec = register_counter_vec!(
        "rdtctl_control_writes_total",
        "Writes to resctrl group control files",
        &["file", "outcome"]
    ).expect("failed to register CONTROL_WRITES metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Workload
    // ─────────────────────────────────────────────────────────────────────────────

    /// Full traversals of a pressure buffer.
    pub static ref WORKLOAD_PASSES: Counter = register_counter!(
        "rdtctl_workload_passes_total",
        "Full byte-write traversals of cache pressure buffers"
    ).expect("failed to register WORKLOAD_PASSES metric");

    /// Pressure workloads currently running.
    pub static ref WORKLOAD_ACTIVE: Gauge = register_gauge!(
        "rdtctl_workload_active",
        "Cache pressure workloads currently running"
    ).expect("failed to register WORKLOAD_ACTIVE metric");
}

pub fn record_control_write(file: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "rejected" };
    CONTROL_WRITES.with_label_values(&[file, outcome]).inc();
}

pub fn record_occupancy(group: &str, domain: u32, bytes: u64) {
    LLC_OCCUPANCY_BYTES
        .with_label_values(&[group, &domain.to_string()])
        .set(bytes as f64);
}

/// Render every registered metric in the text exposition format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
