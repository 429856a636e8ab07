//! Raw CPUID queries for the RDT enumeration leaves
//!
//! Leaf 0x10 enumerates allocation (sub-leaves 0-3), leaf 0xF enumerates
//! monitoring (sub-leaves 0-1). A CPU without RDT simply reports zero bits;
//! nothing here can fail.

use std::fmt;

use serde::Serialize;

/// Allocation enumeration leaf
pub const LEAF_RDT_ALLOCATION: u32 = 0x10;
/// Monitoring enumeration leaf
pub const LEAF_RDT_MONITORING: u32 = 0x0F;

/// The four output registers of one CPUID query, widened to 64 bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuidRegisters {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
}

/// One (leaf, subleaf) query and its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CpuidRecord {
    pub leaf: u32,
    pub subleaf: u32,
    pub registers: CpuidRegisters,
}

impl fmt::Display for CpuidRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.registers;
        write!(
            f,
            "CPUID[0x{:x} Rev{}] = 0x{:016x} - {:016x} - {:016x} - {:016x}",
            self.leaf, self.subleaf, r.a, r.b, r.c, r.d
        )
    }
}

/// Issues CPUID on the calling thread
///
/// The four registers come from a single instruction, so they are consistent
/// with each other. The thread may still migrate between two queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuidProbe;

impl CpuidProbe {
    pub fn new() -> Self {
        Self
    }

    /// Execute CPUID with EAX=leaf, ECX=subleaf
    #[cfg(target_arch = "x86_64")]
    pub fn query(&self, leaf: u32, subleaf: u32) -> CpuidRegisters {
        use std::arch::x86_64::__cpuid_count;

        // SAFETY: CPUID is available on every x86_64 processor.
        #[allow(unused_unsafe)]
        let result = unsafe { __cpuid_count(leaf, subleaf) };
        CpuidRegisters {
            a: result.eax as u64,
            b: result.ebx as u64,
            c: result.ecx as u64,
            d: result.edx as u64,
        }
    }

    /// No CPUID outside x86_64: report the all-zero "nothing supported" pattern
    #[cfg(not(target_arch = "x86_64"))]
    pub fn query(&self, _leaf: u32, _subleaf: u32) -> CpuidRegisters {
        CpuidRegisters::default()
    }

    /// Highest basic leaf the CPU implements
    pub fn max_basic_leaf(&self) -> u32 {
        self.query(0, 0).a as u32
    }

    /// Raw tuples for leaf 0x10 sub-leaves 0-3 and leaf 0xF sub-leaves 0-1
    pub fn rdt_report(&self) -> Vec<CpuidRecord> {
        let allocation = (0..=3).map(|sub| (LEAF_RDT_ALLOCATION, sub));
        let monitoring = (0..=1).map(|sub| (LEAF_RDT_MONITORING, sub));

        allocation
            .chain(monitoring)
            .map(|(leaf, subleaf)| CpuidRecord {
                leaf,
                subleaf,
                registers: self.query(leaf, subleaf),
            })
            .collect()
    }
}
