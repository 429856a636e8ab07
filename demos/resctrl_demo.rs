//! Walk through the resctrl group lifecycle
//!
//! Run with: sudo cargo run --example resctrl_demo
//! (Requires root and `mount -t resctrl resctrl /sys/fs/resctrl`)

use std::sync::Arc;

use rdtctl::resctrl::{CpuRange, MonGroupManager, ResctrlGateway, SchemaCatalog};
use rdtctl::RdtConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("┌─────────────────────────────────────────┐");
    println!("│  Testing resctrl group lifecycle        │");
    println!("└─────────────────────────────────────────┘\n");

    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        eprintln!("Warning: Not running as root (euid={}). resctrl writes may fail.", euid);
        eprintln!("   Run with: sudo cargo run --example resctrl_demo\n");
    }

    let config = RdtConfig::from_env();
    let gateway = Arc::new(ResctrlGateway::from_config(&config));

    println!("1. Binding to {}...", config.mount_root.display());
    if let Err(e) = gateway.mount() {
        eprintln!("   ❌ {}", e);
        eprintln!("   Make sure resctrl is mounted: mount -t resctrl resctrl /sys/fs/resctrl");
        return Err(e.into());
    }
    println!("   ✅ resctrl found");

    println!("\n2. Reading capabilities...");
    for cap in gateway.read_capabilities(&SchemaCatalog::extended())? {
        let marker = if cap.is_error() { "❌" } else { "✅" };
        println!(
            "   {} {:<32} = {}",
            marker,
            cap.entry.name,
            cap.display_value().replace('\n', " ")
        );
    }

    let groups = MonGroupManager::new(gateway.clone());
    let ctrl = "p0";
    let mon = "mon_groups/test1";

    println!("\n3. Creating groups '{}' and '{}'...", ctrl, mon);
    for name in [ctrl, mon] {
        if groups.create(name) {
            println!("   ✅ {}", name);
        } else {
            eprintln!("   ❌ {}", name);
        }
    }

    let pid = std::process::id();
    println!("\n4. Moving PID {} between groups...", pid);
    groups.bind_task(mon, pid)?;
    println!("   {}/tasks = {:?}", mon, groups.tasks(mon)?);

    groups.bind_task(ctrl, pid)?;
    println!("   {}/tasks = {:?}", mon, groups.tasks(mon)?);
    println!("   {}/tasks = {:?}", ctrl, groups.tasks(ctrl)?);

    println!("\n5. Binding CPUs 0-1 to '{}'...", ctrl);
    match groups.bind_cpu_range(ctrl, CpuRange { start: 0, end: 1 }) {
        Ok(()) => println!("   ✅ cpus_list = {}", gateway.read_control(ctrl, "cpus_list")?.trim()),
        Err(e) => eprintln!("   ❌ {}", e),
    }

    println!("\n6. Listing groups...");
    for group in groups.list()? {
        let kind = if group.is_monitor_only() { "mon" } else { "ctrl" };
        println!("   - {} ({})", group.name, kind);
    }

    println!("\n7. Cleaning up...");
    for name in [mon, ctrl] {
        if groups.destroy(name) {
            println!("   ✅ {} destroyed", name);
        } else {
            eprintln!("   ❌ {} still present", name);
        }
    }

    println!("\n┌─────────────────────────────────────────┐");
    println!("│  ✅ resctrl demo complete!              │");
    println!("└─────────────────────────────────────────┘");

    Ok(())
}
