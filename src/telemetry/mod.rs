//! Occupancy telemetry for resctrl monitoring groups

pub mod reader;

pub use reader::{TelemetryReader, TelemetrySnapshot};
