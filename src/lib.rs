//! rdtctl - control plane for Intel Resource Director Technology via resctrl
//!
//! This library discovers RDT capabilities, manages resctrl groups, binds
//! processes and CPUs to them, writes cache allocation schemata, polls
//! occupancy counters, and generates a controlled cache-pressure workload to
//! check that allocation and monitoring behave.
//!
//! # Modules
//!
//! - `cpuid` - Raw CPUID queries for the RDT leaves (0x10, 0xF) and decoders
//! - `resctrl` - Capability catalog, filesystem gateway, group lifecycle
//! - `telemetry` - Periodic LLC occupancy polling
//! - `workload` - Cache pressure generator
//! - `config` - Runtime configuration (`RDTCTL_*` overrides)
//! - `metrics` - Prometheus metrics
//! - `logging` - tracing subscriber setup
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rdtctl::{CachePressureWorkload, MonGroupManager, RdtConfig, ResctrlGateway, TelemetryReader};
//!
//! let config = RdtConfig::from_env();
//! let gateway = Arc::new(ResctrlGateway::from_config(&config));
//! gateway.mount()?;
//!
//! let groups = MonGroupManager::new(gateway.clone());
//! groups.create("p1");
//! groups.bind_task("p1", std::process::id())?;
//!
//! let telemetry = TelemetryReader::new(gateway.clone(), config.poll_interval);
//! let poller = telemetry.spawn_poller("p1");
//! CachePressureWorkload::from_kib(5 * 1024).run(Duration::from_secs(2));
//! poller.abort();
//!
//! groups.destroy("p1");
//! ```

pub mod config;
pub mod cpuid;
pub mod logging;
pub mod metrics;
pub mod resctrl;
pub mod telemetry;
pub mod workload;

// Re-export commonly used types at crate root for convenience
pub use config::RdtConfig;
pub use cpuid::CpuidProbe;
pub use resctrl::{MonGroupManager, ResctrlError, ResctrlGateway, SchemaCatalog};
pub use telemetry::TelemetryReader;
pub use workload::CachePressureWorkload;
