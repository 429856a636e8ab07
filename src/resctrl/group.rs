//! Monitoring/allocation group lifecycle
//!
//! Each group is a directory under the resctrl root. Directories at the root
//! are control groups (own CLOSID + RMID); directories under a `mon_groups/`
//! are monitoring-only groups (own RMID, parent's allocation).
//!
//! ```text
//! Absent ──create()──► Created ──bind_*/set_schema──► Bound ──destroy()──► Absent
//! ```
//!
//! Idempotence lives here, raw I/O lives in the gateway.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::error::ResctrlError;
use super::gateway::{ResctrlGateway, TASKS_FILE};
use super::types::{CpuRange, SchemaDirective};

/// Directories at the mount root that are not groups
const RESERVED_DIRS: &[&str] = &["info", "mon_data", "mon_groups"];

const MON_GROUPS_DIR: &str = "mon_groups";

/// Handle to a group directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonGroup {
    /// Path below the root, e.g. "p1" or "mon_groups/test1"
    pub name: String,
    /// Whether the directory existed when the handle was produced
    pub mounted: bool,
}

impl MonGroup {
    /// True for groups nested under a `mon_groups/` directory
    pub fn is_monitor_only(&self) -> bool {
        self.name
            .split('/')
            .rev()
            .nth(1)
            .map(|parent| parent == MON_GROUPS_DIR)
            .unwrap_or(false)
    }
}

/// CPU binding and L3 masks applied when creating a cache quota
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheQuota {
    /// CPUs to move into the group (None leaves cpus_list alone)
    pub cpus: Option<CpuRange>,
    /// (L3 domain, cache bitmask) pairs
    pub l3_masks: Vec<(u32, u64)>,
}

pub struct MonGroupManager {
    gateway: Arc<ResctrlGateway>,
}

impl MonGroupManager {
    pub fn new(gateway: Arc<ResctrlGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<ResctrlGateway> {
        &self.gateway
    }

    /// Create the group, succeeding if it already exists
    pub fn try_create(&self, name: &str) -> Result<MonGroup, ResctrlError> {
        if self.gateway.group_exists(name)? {
            return Ok(MonGroup {
                name: name.to_string(),
                mounted: true,
            });
        }

        if let Err(e) = self.gateway.create_group_dir(name) {
            // Lost a race with another creator: still the state the caller asked for.
            if self.gateway.group_exists(name).unwrap_or(false) {
                return Ok(MonGroup {
                    name: name.to_string(),
                    mounted: true,
                });
            }
            return Err(e);
        }

        info!(group = name, "resctrl group created");
        Ok(MonGroup {
            name: name.to_string(),
            mounted: true,
        })
    }

    /// Idempotent create; false only on a genuine creation failure
    pub fn create(&self, name: &str) -> bool {
        match self.try_create(name) {
            Ok(_) => true,
            Err(e) => {
                warn!(group = name, error = %e, "failed to create resctrl group");
                false
            }
        }
    }

    /// Remove the group directory; an absent group is already destroyed
    ///
    /// The kernel moves the group's tasks and CPUs back to the parent.
    /// Stop any workload bound to the group before calling this.
    pub fn try_destroy(&self, name: &str) -> Result<(), ResctrlError> {
        if self.gateway.group_exists(name)? {
            if let Err(e) = self.gateway.remove_group_dir(name) {
                if self.gateway.group_exists(name)? {
                    return Err(e);
                }
            } else {
                info!(group = name, "resctrl group destroyed");
            }
        }
        Ok(())
    }

    /// True iff the directory is absent afterward
    pub fn destroy(&self, name: &str) -> bool {
        match self.try_destroy(name) {
            Ok(()) => true,
            Err(e) => {
                warn!(group = name, error = %e, "failed to destroy resctrl group");
                false
            }
        }
    }

    pub fn exists(&self, name: &str) -> Result<bool, ResctrlError> {
        self.gateway.group_exists(name)
    }

    pub fn bind_task(&self, name: &str, pid: u32) -> Result<(), ResctrlError> {
        self.gateway.write_tasks(name, pid)
    }

    pub fn bind_cpu_range(&self, name: &str, range: CpuRange) -> Result<(), ResctrlError> {
        self.gateway.write_cpu_range(name, range)
    }

    pub fn set_schema(&self, name: &str, directive: &SchemaDirective) -> Result<(), ResctrlError> {
        self.gateway.write_schema(name, directive)
    }

    /// PIDs currently in the group
    ///
    /// Reads through the bounded buffer, so very large groups are truncated;
    /// a partial trailing PID is dropped.
    pub fn tasks(&self, name: &str) -> Result<Vec<u32>, ResctrlError> {
        let content = self.gateway.read_control(name, TASKS_FILE)?;
        Ok(content
            .split(|c: char| c.is_whitespace() || c == '\0')
            .filter_map(|token| token.parse().ok())
            .collect())
    }

    /// Create a control group with a CPU binding and an L3 allocation
    ///
    /// Steps run in order (mkdir, cpus_list, schemata) and stop at the first
    /// failure. The group is left in place on failure.
    pub fn create_cache_quota(
        &self,
        name: &str,
        quota: &CacheQuota,
    ) -> Result<MonGroup, ResctrlError> {
        let group = self.try_create(name)?;

        if let Some(range) = quota.cpus {
            self.bind_cpu_range(name, range)?;
        }

        if !quota.l3_masks.is_empty() {
            self.set_schema(name, &SchemaDirective::l3(&quota.l3_masks))?;
        }

        info!(group = name, cpus = ?quota.cpus, masks = ?quota.l3_masks, "cache quota applied");
        Ok(group)
    }

    /// Every group under the root: control groups, their monitoring
    /// groups, and monitoring groups of the default group
    pub fn list(&self) -> Result<Vec<MonGroup>, ResctrlError> {
        let mut groups = Vec::new();

        let to_group = |name: String| MonGroup {
            name,
            mounted: true,
        };

        for mon in self.gateway.list_dirs(Some(MON_GROUPS_DIR))? {
            groups.push(to_group(format!("{}/{}", MON_GROUPS_DIR, mon)));
        }

        for ctrl in self.gateway.list_dirs(None)? {
            if RESERVED_DIRS.contains(&ctrl.as_str()) {
                continue;
            }
            let nested = format!("{}/{}", ctrl, MON_GROUPS_DIR);
            let children = self.gateway.list_dirs(Some(&nested))?;
            groups.push(to_group(ctrl));
            for mon in children {
                groups.push(to_group(format!("{}/{}", nested, mon)));
            }
        }

        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn manager(root: &TempDir) -> MonGroupManager {
        let gateway = ResctrlGateway::new(root.path());
        gateway.mount().unwrap();
        MonGroupManager::new(Arc::new(gateway))
    }

    #[test]
    fn test_monitor_only_detection() {
        let ctrl = MonGroup {
            name: "p1".to_string(),
            mounted: true,
        };
        let mon = MonGroup {
            name: "p1/mon_groups/m1".to_string(),
            mounted: true,
        };
        let root_mon = MonGroup {
            name: "mon_groups/test1".to_string(),
            mounted: true,
        };
        assert!(!ctrl.is_monitor_only());
        assert!(mon.is_monitor_only());
        assert!(root_mon.is_monitor_only());
    }

    #[test]
    fn test_create_is_idempotent() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root);

        assert!(manager.create("p1"));
        assert!(manager.create("p1"));

        let dirs: Vec<_> = fs::read_dir(root.path()).unwrap().flatten().collect();
        assert_eq!(dirs.len(), 1);
    }

    #[test]
    fn test_create_fails_without_parent() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root);
        assert!(!manager.create("mon_groups/orphan"));
        assert!(manager.try_create("mon_groups/orphan").unwrap_err().is_not_found());
    }

    #[test]
    fn test_destroy_absent_group_succeeds() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root);
        assert!(manager.destroy("never-created"));
    }

    #[test]
    fn test_create_then_destroy() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root);
        assert!(manager.create("p1"));
        assert!(manager.exists("p1").unwrap());
        assert!(manager.destroy("p1"));
        assert!(!manager.exists("p1").unwrap());
    }

    #[test]
    fn test_invalid_name_is_not_created() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root);
        assert!(!manager.create("../escape"));
    }
}
