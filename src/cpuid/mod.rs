//! CPUID enumeration of Intel RDT
//!
//! resctrl tells us what the kernel enabled; CPUID tells us what the silicon
//! has. Both are reported side by side by `rdtctl info`.

pub mod decode;
pub mod probe;

pub use decode::{AllocationCaps, CatCaps, L3MonitoringCaps, MbaCaps, MonitoringCaps};
pub use probe::{CpuidProbe, CpuidRecord, CpuidRegisters};
