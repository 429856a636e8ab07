//! resctrl control plane: Intel RDT cache allocation and monitoring
//!
//! The kernel exposes CAT (allocation) and CMT/MBM (monitoring) through the
//! resctrl pseudo-filesystem. This module discovers capabilities, manages
//! groups and writes their control files.
//!
//! # Example Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use rdtctl::resctrl::{CpuRange, MonGroupManager, ResctrlGateway, SchemaCatalog, SchemaDirective};
//!
//! let gateway = Arc::new(ResctrlGateway::new("/sys/fs/resctrl"));
//! gateway.mount()?;
//!
//! // What does the hardware offer?
//! for cap in gateway.read_capabilities(&SchemaCatalog::intel_l3())? {
//!     println!("{} = {}", cap.entry.name, cap.display_value());
//! }
//!
//! // Fence the current process into 4 cache ways on domain 0
//! let groups = MonGroupManager::new(gateway.clone());
//! groups.create("p1");
//! groups.bind_task("p1", std::process::id())?;
//! groups.bind_cpu_range("p1", CpuRange::new(4, 8).unwrap())?;
//! groups.set_schema("p1", &SchemaDirective::l3(&[(0, 0xf)]))?;
//!
//! // Clean up
//! groups.destroy("p1");
//! ```

pub mod catalog;
pub mod error;
pub mod gateway;
pub mod group;
pub mod types;

pub use catalog::{
    CapabilityEntry, CapabilityKind, CapabilitySnapshot, CapabilityValue, SchemaCatalog,
};
pub use error::ResctrlError;
pub use gateway::ResctrlGateway;
pub use group::{CacheQuota, MonGroup, MonGroupManager};
pub use types::{
    validate_cbm, CacheAllocationInfo, CbmError, CpuRange, OccupancySample, SchemaDirective,
};
