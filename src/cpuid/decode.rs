//! Decoding of the RDT CPUID leaves
//!
//! Bit layouts from the Intel SDM, Vol. 3B, "Intel Resource Director Technology":
//!
//! | Leaf.Sub | Register | Meaning |
//! |---|---|---|
//! | 0x10.0 | EBX bit 1/2/3 | L3 CAT / L2 CAT / MBA supported |
//! | 0x10.1, 0x10.2 | EAX[4:0] | CBM length - 1 |
//! | | ECX bit 2 | code/data prioritization |
//! | | EDX[15:0] | highest COS number |
//! | 0x10.3 | EAX[11:0] | max MBA throttling - 1 |
//! | | ECX bit 2 | delay values are linear |
//! | | EDX[15:0] | highest COS number |
//! | 0xF.0 | EBX | highest RMID, any resource |
//! | | EDX bit 1 | L3 monitoring supported |
//! | 0xF.1 | EBX | occupancy upscaling factor (bytes per count) |
//! | | ECX | highest L3 RMID |
//! | | EDX bit 0/1/2 | occupancy / total MBM / local MBM |

use serde::Serialize;

use super::probe::{CpuidProbe, CpuidRegisters, LEAF_RDT_ALLOCATION, LEAF_RDT_MONITORING};

fn bit(value: u64, n: u32) -> bool {
    (value >> n) & 1 == 1
}

/// Cache allocation parameters for one cache level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatCaps {
    /// Number of bits in a capacity bitmask
    pub cbm_length: u32,
    /// Number of classes of service
    pub num_classes: u32,
    /// Code/data prioritization
    pub cdp: bool,
}

impl CatCaps {
    fn from_subleaf(regs: CpuidRegisters) -> Self {
        Self {
            cbm_length: (regs.a & 0x1f) as u32 + 1,
            num_classes: (regs.d & 0xffff) as u32 + 1,
            cdp: bit(regs.c, 2),
        }
    }
}

/// Memory bandwidth allocation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MbaCaps {
    pub max_throttle: u32,
    pub num_classes: u32,
    pub linear: bool,
}

/// What leaf 0x10 says about allocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllocationCaps {
    pub l3: Option<CatCaps>,
    pub l2: Option<CatCaps>,
    pub mba: Option<MbaCaps>,
}

impl AllocationCaps {
    /// Decode sub-leaves 0-3 of leaf 0x10, in order
    pub fn from_leaves(subleaves: [CpuidRegisters; 4]) -> Self {
        let [enumeration, l3, l2, mba] = subleaves;

        Self {
            l3: bit(enumeration.b, 1).then(|| CatCaps::from_subleaf(l3)),
            l2: bit(enumeration.b, 2).then(|| CatCaps::from_subleaf(l2)),
            mba: bit(enumeration.b, 3).then(|| MbaCaps {
                max_throttle: (mba.a & 0xfff) as u32 + 1,
                num_classes: (mba.d & 0xffff) as u32 + 1,
                linear: bit(mba.c, 2),
            }),
        }
    }

    pub fn any(&self) -> bool {
        self.l3.is_some() || self.l2.is_some() || self.mba.is_some()
    }
}

/// L3 monitoring parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct L3MonitoringCaps {
    /// Multiply a raw counter by this to get bytes
    pub upscaling_factor: u64,
    pub num_rmids: u32,
    pub llc_occupancy: bool,
    pub mbm_total: bool,
    pub mbm_local: bool,
}

/// What leaf 0xF says about monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitoringCaps {
    /// Highest RMID across all monitored resources
    pub max_rmid: u32,
    pub l3: Option<L3MonitoringCaps>,
}

impl MonitoringCaps {
    /// Decode sub-leaves 0-1 of leaf 0xF
    pub fn from_leaves(enumeration: CpuidRegisters, l3: CpuidRegisters) -> Self {
        Self {
            max_rmid: enumeration.b as u32,
            l3: bit(enumeration.d, 1).then(|| L3MonitoringCaps {
                upscaling_factor: l3.b,
                num_rmids: l3.c as u32 + 1,
                llc_occupancy: bit(l3.d, 0),
                mbm_total: bit(l3.d, 1),
                mbm_local: bit(l3.d, 2),
            }),
        }
    }
}

impl CpuidProbe {
    /// Allocation capabilities, all absent if the CPU lacks leaf 0x10
    pub fn allocation_caps(&self) -> AllocationCaps {
        if self.max_basic_leaf() < LEAF_RDT_ALLOCATION {
            return AllocationCaps::default();
        }
        let subleaves = [0, 1, 2, 3].map(|sub| self.query(LEAF_RDT_ALLOCATION, sub));
        AllocationCaps::from_leaves(subleaves)
    }

    /// Monitoring capabilities, all absent if the CPU lacks leaf 0xF
    pub fn monitoring_caps(&self) -> MonitoringCaps {
        if self.max_basic_leaf() < LEAF_RDT_MONITORING {
            return MonitoringCaps::default();
        }
        MonitoringCaps::from_leaves(
            self.query(LEAF_RDT_MONITORING, 0),
            self.query(LEAF_RDT_MONITORING, 1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs(a: u64, b: u64, c: u64, d: u64) -> CpuidRegisters {
        CpuidRegisters { a, b, c, d }
    }

    #[test]
    fn test_allocation_decode_skylake_sp() {
        // L3 CAT + MBA, 11-way CBM, 16 classes, 8 MBA classes, linear delay
        let caps = AllocationCaps::from_leaves([
            regs(0, 0b1010, 0, 0),
            regs(0xa, 0x600, 0x4, 0xf),
            regs(0, 0, 0, 0),
            regs(0x59, 0, 0x4, 0x7),
        ]);

        let l3 = caps.l3.unwrap();
        assert_eq!(l3.cbm_length, 11);
        assert_eq!(l3.num_classes, 16);
        assert!(l3.cdp);
        assert!(caps.l2.is_none());

        let mba = caps.mba.unwrap();
        assert_eq!(mba.max_throttle, 90);
        assert_eq!(mba.num_classes, 8);
        assert!(mba.linear);
        assert!(caps.any());
    }

    #[test]
    fn test_zero_registers_mean_unsupported() {
        let zero = CpuidRegisters::default();
        let alloc = AllocationCaps::from_leaves([zero; 4]);
        assert!(!alloc.any());

        let mon = MonitoringCaps::from_leaves(zero, zero);
        assert_eq!(mon.max_rmid, 0);
        assert!(mon.l3.is_none());
    }

    #[test]
    fn test_monitoring_decode() {
        let mon = MonitoringCaps::from_leaves(regs(0, 0xdf, 0, 0x2), regs(0, 0xe000, 0xdf, 0x7));
        assert_eq!(mon.max_rmid, 0xdf);

        let l3 = mon.l3.unwrap();
        assert_eq!(l3.upscaling_factor, 0xe000);
        assert_eq!(l3.num_rmids, 0xe0);
        assert!(l3.llc_occupancy && l3.mbm_total && l3.mbm_local);
    }

    #[test]
    fn test_live_decode_does_not_panic() {
        let probe = CpuidProbe::new();
        let _ = probe.allocation_caps();
        let _ = probe.monitoring_caps();
    }
}
