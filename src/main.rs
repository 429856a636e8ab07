//! rdtctl - evaluate Intel RDT cache monitoring and allocation
//!
//! Usage:
//!   rdtctl info [--json]              resctrl capabilities + CPUID RDT leaves
//!   rdtctl eval [SECONDS] [GROUP]     bind self to a group, load the cache, poll occupancy
//!   rdtctl workload KIB SECONDS       run the cache pressure workload in the foreground
//!
//! Run as root with resctrl mounted:
//!   mount -t resctrl resctrl /sys/fs/resctrl

use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use rdtctl::cpuid::CpuidProbe;
use rdtctl::logging::{init_tracing, LogFormat};
use rdtctl::metrics;
use rdtctl::resctrl::{CacheAllocationInfo, MonGroupManager, ResctrlGateway};
use rdtctl::telemetry::TelemetryReader;
use rdtctl::workload::CachePressureWorkload;
use rdtctl::RdtConfig;

const DEFAULT_EVAL_SECS: u64 = 100;
const DEFAULT_EVAL_GROUP: &str = "p1";
/// 5 MiB: larger than a typical per-way L3 slice, small enough to fit the LLC
const EVAL_WORKLOAD_KIB: usize = 5 * 1024;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn welcome() {
    println!();
    println!("    rdtctl - evaluating Intel RDT (CAT, CMT, MBM) through resctrl");
    println!();
}

fn usage() {
    eprintln!("usage:");
    eprintln!("  rdtctl info [--json]");
    eprintln!("  rdtctl eval [SECONDS] [GROUP]");
    eprintln!("  rdtctl workload KIB SECONDS");
}

fn warn_if_not_root() {
    // nix only exposes geteuid behind its "user" feature
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        eprintln!("Warning: Not running as root (euid={}). resctrl writes will fail.", euid);
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    init_tracing(if json { LogFormat::Json } else { LogFormat::Pretty });

    let positional: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .collect();

    let result = match positional.as_slice() {
        [] => {
            welcome();
            usage();
            Ok(())
        }
        ["info"] => info(json),
        ["eval", rest @ ..] => eval(rest).await,
        ["workload", kib, secs] => workload(kib, secs).await,
        _ => {
            usage();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

fn info(json: bool) -> CliResult {
    let config = RdtConfig::from_env();
    let gateway = ResctrlGateway::from_config(&config);
    let probe = CpuidProbe::new();

    let capabilities = match gateway.mount() {
        Ok(()) => gateway.read_capabilities(&config.catalog)?,
        Err(e) => {
            eprintln!("No resctrl root folder ({}), mount first", e);
            Vec::new()
        }
    };
    let report = probe.rdt_report();
    let allocation = probe.allocation_caps();
    let monitoring = probe.monitoring_caps();

    if json {
        let doc = json!({
            "capabilities": capabilities,
            "cpuid": report,
            "allocation": allocation,
            "monitoring": monitoring,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("resctrl capabilities ({}):", config.mount_root.display());
    for cap in &capabilities {
        println!("  {:<32} = {}", cap.entry.name, cap.display_value().replace('\n', " "));
    }
    if let Some(l3) = CacheAllocationInfo::from_snapshots(&capabilities) {
        println!(
            "  → {} L3 ways, {} classes, min {} bits per mask",
            l3.ways(),
            l3.num_closids,
            l3.min_cbm_bits
        );
    }

    println!("\nRDT allocation related CPUID info:");
    for record in report.iter().filter(|r| r.leaf == 0x10) {
        println!("  {}", record);
    }
    println!("RDT monitoring related CPUID info:");
    for record in report.iter().filter(|r| r.leaf == 0x0F) {
        println!("  {}", record);
    }

    println!("\nDecoded:");
    println!("  allocation: {:?}", allocation);
    println!("  monitoring: {:?}", monitoring);
    Ok(())
}

async fn eval(rest: &[&str]) -> CliResult {
    let secs = match rest.first() {
        Some(raw) => raw.parse::<u64>()?,
        None => DEFAULT_EVAL_SECS,
    };
    let group = rest.get(1).copied().unwrap_or(DEFAULT_EVAL_GROUP).to_string();

    warn_if_not_root();
    let config = RdtConfig::from_env();
    let gateway = Arc::new(ResctrlGateway::from_config(&config));
    gateway.mount()?;

    let groups = MonGroupManager::new(gateway.clone());
    let telemetry = TelemetryReader::new(gateway.clone(), config.poll_interval);

    println!("1. Creating group '{}'...", group);
    groups.try_create(&group)?;

    let pid = std::process::id();
    println!("2. Binding PID {} to '{}'...", pid, group);
    groups.bind_task(&group, pid)?;
    println!("   tasks now: {:?}", groups.tasks(&group)?);

    println!("3. Starting {} KiB cache pressure + occupancy poller...", EVAL_WORKLOAD_KIB);
    let workload = CachePressureWorkload::from_kib(EVAL_WORKLOAD_KIB).spawn_background()?;
    groups.bind_task(&group, workload.tid())?;
    let poller = telemetry.spawn_poller(group.clone());

    println!("4. Running for {}s...", secs);
    tokio::time::sleep(Duration::from_secs(secs)).await;

    println!("5. Tearing down...");
    poller.abort();
    let workload_ok = tokio::task::spawn_blocking(move || workload.stop()).await?;
    if !workload_ok {
        eprintln!("   ⚠️ workload did not run");
    }
    if groups.destroy(&group) {
        println!("   ✅ Group '{}' destroyed", group);
    }

    println!("\n{}", metrics::render());
    Ok(())
}

async fn workload(kib: &str, secs: &str) -> CliResult {
    let workload = CachePressureWorkload::from_kib(kib.parse()?);
    let duration = Duration::from_secs(secs.parse()?);

    println!("Touching {} bytes for {:?}...", workload.size_bytes(), duration);
    let ok = tokio::task::spawn_blocking(move || workload.run(duration)).await?;
    if !ok {
        return Err("cannot allocate the pressure buffer".into());
    }
    println!("✅ done");
    Ok(())
}
