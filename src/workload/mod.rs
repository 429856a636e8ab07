//! Synthetic workloads used to validate allocation and monitoring

pub mod pressure;

pub use pressure::{BackgroundWorkload, CachePressureWorkload};
