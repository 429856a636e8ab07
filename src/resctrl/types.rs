//! Values written to and read from group control files
//!
//! ```text
//! cpus_list   ← "4-8"
//! schemata    ← "L3:0=f;1=ff"
//! mon_data/mon_L3_00/llc_occupancy → "1048576"
//! ```

use std::fmt;

use serde::Serialize;

use super::catalog::CapabilitySnapshot;

/// Inclusive range of logical CPUs, written as "start-end"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CpuRange {
    pub start: u32,
    pub end: u32,
}

impl CpuRange {
    /// Returns None when `end < start`.
    pub fn new(start: u32, end: u32) -> Option<Self> {
        if end < start {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn single(cpu: u32) -> Self {
        Self { start: cpu, end: cpu }
    }

    pub fn cpu_count(&self) -> u64 {
        u64::from(self.end) - u64::from(self.start) + 1
    }
}

impl fmt::Display for CpuRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Allocation directive in the kernel's schemata grammar
///
/// The content is not validated before it is written; the kernel is the
/// authority. Use [`validate_cbm`] beforehand if an early check is wanted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDirective(String);

impl SchemaDirective {
    /// Wrap a caller-built directive verbatim
    pub fn raw(directive: impl Into<String>) -> Self {
        Self(directive.into())
    }

    /// Build an L3 directive from (domain, mask) pairs: "L3:0=f;1=ff"
    pub fn l3(domains: &[(u32, u64)]) -> Self {
        let body = domains
            .iter()
            .map(|(domain, mask)| format!("{}={:x}", domain, mask))
            .collect::<Vec<_>>()
            .join(";");
        Self(format!("L3:{}", body))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// LLC occupancy of one monitoring domain, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OccupancySample {
    pub domain: u32,
    pub bytes: u64,
}

/// Why a cache bitmask would be refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CbmError {
    Empty,
    OutsideMask { mask: u64, full_mask: u64 },
    NotContiguous(u64),
    TooFewBits { bits: u32, min_bits: u32 },
}

impl fmt::Display for CbmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CbmError::Empty => write!(f, "Cache bitmask is empty"),
            CbmError::OutsideMask { mask, full_mask } => {
                write!(f, "Bitmask {:x} exceeds allowed mask {:x}", mask, full_mask)
            }
            CbmError::NotContiguous(mask) => write!(f, "Bitmask {:x} is not contiguous", mask),
            CbmError::TooFewBits { bits, min_bits } => {
                write!(f, "Bitmask has {} bits, minimum is {}", bits, min_bits)
            }
        }
    }
}

impl std::error::Error for CbmError {}

/// Check a CBM the way the kernel would before writing it.
pub fn validate_cbm(mask: u64, full_mask: u64, min_bits: u32) -> Result<(), CbmError> {
    if mask == 0 {
        return Err(CbmError::Empty);
    }
    if mask & !full_mask != 0 {
        return Err(CbmError::OutsideMask { mask, full_mask });
    }
    // Contiguous iff shifting out trailing zeros leaves 2^n - 1.
    let shifted = mask >> mask.trailing_zeros();
    if shifted & shifted.wrapping_add(1) != 0 {
        return Err(CbmError::NotContiguous(mask));
    }
    let bits = mask.count_ones();
    if bits < min_bits {
        return Err(CbmError::TooFewBits { bits, min_bits });
    }
    Ok(())
}

/// L3 allocation limits pulled out of a capability snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheAllocationInfo {
    pub cbm_mask: u64,
    pub min_cbm_bits: u32,
    pub num_closids: u32,
}

impl CacheAllocationInfo {
    /// Returns None if `cbm_mask` is missing or unreadable.
    pub fn from_snapshots(snapshots: &[CapabilitySnapshot]) -> Option<Self> {
        let find = |name: &str| snapshots.iter().find(|s| s.entry.name == name);

        let mask = find("L3/cbm_mask").filter(|s| !s.is_error())?;
        let cbm_mask = u64::from_str_radix(mask.as_text().trim(), 16).ok()?;
        let min_cbm_bits = find("L3/min_cbm_bits")
            .map(|s| s.as_integer() as u32)
            .unwrap_or(1);
        let num_closids = find("L3/num_closids")
            .map(|s| s.as_integer() as u32)
            .unwrap_or(0);

        Some(Self {
            cbm_mask,
            min_cbm_bits,
            num_closids,
        })
    }

    /// Number of cache ways covered by the full mask
    pub fn ways(&self) -> u32 {
        self.cbm_mask.count_ones()
    }

    pub fn validate(&self, mask: u64) -> Result<(), CbmError> {
        validate_cbm(mask, self.cbm_mask, self.min_cbm_bits)
    }
}
