//! PROOF: cache allocation caps what monitoring reports
//!
//! Runs the same 5 MiB cache pressure workload twice, once in a group
//! restricted to the minimum number of L3 ways and once in a group allowed
//! the full mask, and compares the LLC occupancy each group reports.
//!
//! Run with: sudo cargo run --example occupancy_proof
//! (Requires root, an Intel CPU with CAT + CMT, and resctrl mounted)

use std::sync::Arc;
use std::time::Duration;

use rdtctl::resctrl::{
    CacheAllocationInfo, CacheQuota, MonGroupManager, ResctrlGateway, SchemaCatalog,
};
use rdtctl::telemetry::TelemetryReader;
use rdtctl::workload::CachePressureWorkload;
use rdtctl::RdtConfig;

const WORKLOAD_KIB: usize = 5 * 1024;
const WARMUP: Duration = Duration::from_secs(2);

fn measure(
    groups: &MonGroupManager,
    telemetry: &TelemetryReader,
    group: &str,
    quota: &CacheQuota,
) -> Result<u64, Box<dyn std::error::Error>> {
    groups.create_cache_quota(group, quota)?;

    let workload = CachePressureWorkload::from_kib(WORKLOAD_KIB).spawn_background()?;
    groups.bind_task(group, workload.tid())?;
    std::thread::sleep(WARMUP);

    let snapshot = telemetry.snapshot(group)?;
    workload.stop();
    groups.destroy(group);

    Ok(snapshot.total_bytes())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("═══════════════════════════════════════════════════════════");
    println!("  PROOF: L3 allocation bounds the occupancy monitoring sees");
    println!("═══════════════════════════════════════════════════════════\n");

    let config = RdtConfig::from_env();
    let gateway = Arc::new(ResctrlGateway::from_config(&config));
    gateway.mount()?;

    let capabilities = gateway.read_capabilities(&SchemaCatalog::intel_l3())?;
    let Some(l3) = CacheAllocationInfo::from_snapshots(&capabilities) else {
        eprintln!("❌ L3 cache allocation not available (info/L3/cbm_mask unreadable)");
        return Ok(());
    };
    println!("L3: {} ways (mask {:x}), min {} bits", l3.ways(), l3.cbm_mask, l3.min_cbm_bits);

    // Lowest min_cbm_bits ways: the smallest legal allocation
    let small_mask = (1u64 << l3.min_cbm_bits.max(1)) - 1;
    l3.validate(small_mask)?;

    let groups = MonGroupManager::new(gateway.clone());
    let telemetry = TelemetryReader::new(gateway.clone(), config.poll_interval);

    println!("\n[1/2] {} KiB workload restricted to mask {:x}...", WORKLOAD_KIB, small_mask);
    let small = measure(
        &groups,
        &telemetry,
        "proof_small",
        &CacheQuota {
            cpus: None,
            l3_masks: vec![(0, small_mask)],
        },
    )?;
    println!("      occupancy: {} KiB", small / 1024);

    println!("\n[2/2] {} KiB workload with full mask {:x}...", WORKLOAD_KIB, l3.cbm_mask);
    let large = measure(
        &groups,
        &telemetry,
        "proof_large",
        &CacheQuota {
            cpus: None,
            l3_masks: vec![(0, l3.cbm_mask)],
        },
    )?;
    println!("      occupancy: {} KiB", large / 1024);

    println!();
    if large > small {
        println!("✅ Restricted group used {} KiB less LLC", (large - small) / 1024);
    } else {
        println!("⚠️  No difference observed (multi-socket? workload on another L3 domain?)");
    }
    Ok(())
}
