//! Runtime configuration
//!
//! Defaults match a stock kernel (`/sys/fs/resctrl`, one poll per second).
//! Environment overrides:
//!
//! | Variable | Meaning |
//! |---|---|
//! | `RDTCTL_RESCTRL_ROOT` | mount root of the resctrl filesystem |
//! | `RDTCTL_POLL_INTERVAL_MS` | telemetry poll interval |
//! | `RDTCTL_CATALOG` | `base` or `extended` capability catalog |

use std::path::PathBuf;
use std::time::Duration;

use crate::resctrl::SchemaCatalog;

/// Default resctrl mount point
pub const DEFAULT_RESCTRL_ROOT: &str = "/sys/fs/resctrl";

/// Largest capability/counter file we expect to read
pub const DEFAULT_READ_LIMIT: usize = 256;

#[derive(Debug, Clone)]
pub struct RdtConfig {
    /// Where resctrl is mounted
    pub mount_root: PathBuf,
    /// Interval between telemetry polls
    pub poll_interval: Duration,
    /// Bounded read size for info and counter files
    pub read_limit: usize,
    /// Capability files to read at startup
    pub catalog: SchemaCatalog,
}

impl Default for RdtConfig {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from(DEFAULT_RESCTRL_ROOT),
            poll_interval: Duration::from_secs(1),
            read_limit: DEFAULT_READ_LIMIT,
            catalog: SchemaCatalog::intel_l3(),
        }
    }
}

impl RdtConfig {
    /// Defaults overlaid with `RDTCTL_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(root) = lookup("RDTCTL_RESCTRL_ROOT") {
            config.mount_root = PathBuf::from(root);
        }

        if let Some(raw) = lookup("RDTCTL_POLL_INTERVAL_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %raw, "ignoring invalid RDTCTL_POLL_INTERVAL_MS"),
            }
        }

        if let Some(raw) = lookup("RDTCTL_CATALOG") {
            match raw.trim() {
                "base" => config.catalog = SchemaCatalog::intel_l3(),
                "extended" => config.catalog = SchemaCatalog::extended(),
                _ => tracing::warn!(value = %raw, "ignoring unknown RDTCTL_CATALOG"),
            }
        }

        config
    }

    pub fn with_mount_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.mount_root = root.into();
        self
    }
}
