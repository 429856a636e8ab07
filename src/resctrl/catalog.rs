//! Capability catalog: the resctrl `info/` files we know how to read
//!
//! Each entry names a file relative to `<mount>/info/` and says how its
//! content is parsed. The kind is fixed by the table, never guessed from
//! what the file happens to contain.
//!
//! ```text
//! /sys/fs/resctrl/info/
//! ├── L3/
//! │   ├── cbm_mask            ← "fff"     (text)
//! │   ├── min_cbm_bits        ← "1"       (text)
//! │   └── num_closids         ← "16"      (numeric)
//! └── L3_MON/
//!     ├── max_threshold_occupancy
//!     ├── mon_features        ← "llc_occupancy\nmbm_total_bytes\n..."
//!     └── num_rmids
//! ```

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

/// How the content of a capability file is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CapabilityKind {
    /// First line parsed as a base-10 integer
    Numeric,
    /// Raw text kept as read
    Text,
}

/// One recognized capability file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityEntry {
    /// Path relative to `<mount>/info/`, e.g. "L3/cbm_mask"
    pub name: &'static str,
    pub kind: CapabilityKind,
}

impl CapabilityEntry {
    pub const fn numeric(name: &'static str) -> Self {
        Self {
            name,
            kind: CapabilityKind::Numeric,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: CapabilityKind::Text,
        }
    }
}

/// Value read for a capability entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityValue {
    Integer(i64),
    Text(String),
    /// Open, read or parse failed
    Error,
}

/// Literal reported for a text capability that could not be read
pub const TEXT_SENTINEL: &str = "error";

/// The value read for one entry at one point in time
///
/// Serializes flat as `{name, kind, value, error}`. A failed read carries
/// its kind's sentinel in `value` (`0` or `"error"`), never `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySnapshot {
    pub entry: CapabilityEntry,
    pub value: CapabilityValue,
}

impl CapabilitySnapshot {
    pub fn is_error(&self) -> bool {
        self.value == CapabilityValue::Error
    }

    /// Integer value, or 0 when the read failed.
    pub fn as_integer(&self) -> i64 {
        match &self.value {
            CapabilityValue::Integer(v) => *v,
            CapabilityValue::Text(s) => s.trim().parse().unwrap_or(0),
            CapabilityValue::Error => 0,
        }
    }

    /// Text value, or "error" when the read failed.
    pub fn as_text(&self) -> String {
        match &self.value {
            CapabilityValue::Integer(v) => v.to_string(),
            CapabilityValue::Text(s) => s.clone(),
            CapabilityValue::Error => TEXT_SENTINEL.to_string(),
        }
    }

    /// The kind-appropriate rendering: sentinel on failure, value otherwise.
    pub fn display_value(&self) -> String {
        match (&self.value, self.entry.kind) {
            (CapabilityValue::Error, CapabilityKind::Numeric) => "0".to_string(),
            _ => self.as_text(),
        }
    }
}

impl Serialize for CapabilitySnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CapabilitySnapshot", 4)?;
        state.serialize_field("name", self.entry.name)?;
        state.serialize_field("kind", &self.entry.kind)?;
        match self.entry.kind {
            CapabilityKind::Numeric => state.serialize_field("value", &self.as_integer())?,
            CapabilityKind::Text => state.serialize_field("value", &self.as_text())?,
        }
        state.serialize_field("error", &self.is_error())?;
        state.end()
    }
}

/// The capability files exposed by the first resctrl releases for L3 CAT/CMT.
const BASE_ENTRIES: &[CapabilityEntry] = &[
    CapabilityEntry::text("L3/cbm_mask"),
    CapabilityEntry::text("L3/min_cbm_bits"),
    CapabilityEntry::numeric("L3/num_closids"),
    CapabilityEntry::numeric("L3/sharable_bits"),
    CapabilityEntry::numeric("L3_MON/max_threshold_occupancy"),
    CapabilityEntry::text("L3_MON/mon_features"),
    CapabilityEntry::numeric("L3_MON/rmids"),
];

/// Names current kernels expose in addition to the base set.
const EXTENDED_ENTRIES: &[CapabilityEntry] = &[
    CapabilityEntry::text("L3/shareable_bits"),
    CapabilityEntry::text("L3/bit_usage"),
    CapabilityEntry::numeric("L3_MON/num_rmids"),
    CapabilityEntry::numeric("MB/bandwidth_gran"),
    CapabilityEntry::numeric("MB/min_bandwidth"),
    CapabilityEntry::numeric("MB/num_closids"),
    CapabilityEntry::text("MB/delay_linear"),
];

/// Immutable list of capability entries handed to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaCatalog {
    entries: Vec<CapabilityEntry>,
}

impl SchemaCatalog {
    /// Build a catalog from an explicit list of entries
    pub fn new(entries: Vec<CapabilityEntry>) -> Self {
        Self { entries }
    }

    /// The L3 allocation + monitoring entries
    pub fn intel_l3() -> Self {
        Self::new(BASE_ENTRIES.to_vec())
    }

    /// The base entries plus newer kernel names and memory bandwidth
    pub fn extended() -> Self {
        let mut entries = BASE_ENTRIES.to_vec();
        entries.extend_from_slice(EXTENDED_ENTRIES);
        Self::new(entries)
    }

    pub fn entries(&self) -> &[CapabilityEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::intel_l3()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_catalog_matches_info_tree() {
        let catalog = SchemaCatalog::intel_l3();
        assert_eq!(catalog.len(), 7);

        let names: Vec<&str> = catalog.entries().iter().map(|e| e.name).collect();
        assert!(names.contains(&"L3/cbm_mask"));
        assert!(names.contains(&"L3_MON/rmids"));

        let num_closids = catalog
            .entries()
            .iter()
            .find(|e| e.name == "L3/num_closids")
            .unwrap();
        assert_eq!(num_closids.kind, CapabilityKind::Numeric);
    }

    #[test]
    fn test_extended_is_superset() {
        let base = SchemaCatalog::intel_l3();
        let extended = SchemaCatalog::extended();
        assert!(extended.len() > base.len());
        for entry in base.entries() {
            assert!(extended.entries().contains(entry));
        }
    }

    #[test]
    fn test_sentinels() {
        let numeric = CapabilitySnapshot {
            entry: CapabilityEntry::numeric("L3/num_closids"),
            value: CapabilityValue::Error,
        };
        assert_eq!(numeric.as_integer(), 0);
        assert_eq!(numeric.display_value(), "0");

        let text = CapabilitySnapshot {
            entry: CapabilityEntry::text("L3/cbm_mask"),
            value: CapabilityValue::Error,
        };
        assert_eq!(text.as_text(), "error");
        assert_eq!(text.display_value(), "error");
        assert!(text.is_error());
    }

    #[test]
    fn test_json_carries_sentinels() {
        let numeric = CapabilitySnapshot {
            entry: CapabilityEntry::numeric("L3/num_closids"),
            value: CapabilityValue::Error,
        };
        let json = serde_json::to_value(&numeric).unwrap();
        assert_eq!(json["name"], "L3/num_closids");
        assert_eq!(json["kind"], "Numeric");
        assert_eq!(json["value"], 0);
        assert_eq!(json["error"], true);

        let text = CapabilitySnapshot {
            entry: CapabilityEntry::text("L3/cbm_mask"),
            value: CapabilityValue::Error,
        };
        assert_eq!(serde_json::to_value(&text).unwrap()["value"], "error");

        let read = CapabilitySnapshot {
            entry: CapabilityEntry::text("L3/cbm_mask"),
            value: CapabilityValue::Text("7ff".to_string()),
        };
        let json = serde_json::to_value(&read).unwrap();
        assert_eq!(json["value"], "7ff");
        assert_eq!(json["error"], false);
    }
}
