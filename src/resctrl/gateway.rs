//! ResctrlGateway - every byte that crosses the resctrl boundary goes through here
//!
//! The gateway owns the mount root and builds every path from it. Nothing in
//! this crate changes the process working directory; all paths are absolute,
//! computed per call, so concurrent group operations never share state.
//!
//! ```text
//! /sys/fs/resctrl/                    ← mount root (default group)
//! ├── info/                           ← capabilities (read_capabilities)
//! ├── p1/                             ← control group
//! │   ├── tasks                       ← write_tasks     (append)
//! │   ├── cpus_list                   ← write_cpu_range (replace)
//! │   ├── schemata                    ← write_schema    (replace)
//! │   ├── mon_data/
//! │   │   ├── mon_L3_00/llc_occupancy ← read_occupancy
//! │   │   └── mon_L3_01/llc_occupancy
//! │   └── mon_groups/
//! │       └── m1/                     ← monitoring group "p1/mon_groups/m1"
//! └── mon_groups/
//!     └── test1/                      ← monitoring group "mon_groups/test1"
//! ```
//!
//! The kernel populates control files when a group directory is created.
//! The gateway never creates them: writing to a missing file is an error.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::stat::Mode;
use tracing::{debug, info, warn};

use super::catalog::{CapabilityKind, CapabilitySnapshot, CapabilityValue, SchemaCatalog};
use super::error::ResctrlError;
use super::types::{CpuRange, OccupancySample, SchemaDirective};
use crate::config::{RdtConfig, DEFAULT_READ_LIMIT};
use crate::metrics;

/// Control file holding the PIDs of a group
pub const TASKS_FILE: &str = "tasks";
/// Control file holding the CPUs of a group
pub const CPUS_LIST_FILE: &str = "cpus_list";
/// Control file holding the allocation directive of a group
pub const SCHEMATA_FILE: &str = "schemata";

const INFO_DIR: &str = "info";
const MON_DATA_DIR: &str = "mon_data";
const L3_DOMAIN_PREFIX: &str = "mon_L3_";
const LLC_OCCUPANCY_FILE: &str = "llc_occupancy";

/// Group directories are read/execute only; the kernel decides what is writable.
const GROUP_DIR_MODE: u32 = 0o555;

/// How a control file is opened for writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Append,
    Replace,
}

pub struct ResctrlGateway {
    /// Mount root, e.g. /sys/fs/resctrl
    root: PathBuf,
    /// Upper bound on bytes read from a single file
    read_limit: usize,
    /// Set by mount() once the root has been seen as a directory
    mounted: AtomicBool,
}

impl ResctrlGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_limit: DEFAULT_READ_LIMIT,
            mounted: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &RdtConfig) -> Self {
        Self {
            root: config.mount_root.clone(),
            read_limit: config.read_limit.max(1),
            mounted: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bind to an already-mounted resctrl instance
    ///
    /// Does not call mount(2); the filesystem must have been mounted by the
    /// operator (`mount -t resctrl resctrl /sys/fs/resctrl`).
    pub fn mount(&self) -> Result<(), ResctrlError> {
        if !self.root.is_dir() {
            self.mounted.store(false, Ordering::SeqCst);
            return Err(ResctrlError::MountUnavailable(self.root.clone()));
        }
        self.mounted.store(true, Ordering::SeqCst);
        info!(root = %self.root.display(), "bound to resctrl mount");
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// The root is re-checked on every call: an unmount is noticed immediately.
    fn ensure_mounted(&self) -> Result<(), ResctrlError> {
        if self.is_mounted() && self.root.is_dir() {
            Ok(())
        } else {
            Err(ResctrlError::MountUnavailable(self.root.clone()))
        }
    }

    /// Absolute path of a group directory
    ///
    /// `group` may contain sub-paths ("mon_groups/m1") but must stay below
    /// the root.
    pub fn group_path(&self, group: &str) -> Result<PathBuf, ResctrlError> {
        let relative = Path::new(group);
        let valid = !group.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(ResctrlError::InvalidGroupName(group.to_string()));
        }
        Ok(self.root.join(relative))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Capabilities
    // ─────────────────────────────────────────────────────────────────────────

    /// Read every catalog entry from `<root>/info/`
    ///
    /// A failure on one entry becomes that entry's `Error` value and the scan
    /// moves on. Only a missing mount fails the whole call.
    pub fn read_capabilities(
        &self,
        catalog: &SchemaCatalog,
    ) -> Result<Vec<CapabilitySnapshot>, ResctrlError> {
        self.ensure_mounted()?;

        let info_dir = self.root.join(INFO_DIR);
        let snapshots = catalog
            .entries()
            .iter()
            .map(|entry| {
                let path = info_dir.join(entry.name);
                let value = match self.read_capability(&path, entry.kind) {
                    Ok(value) => value,
                    Err(e) => {
                        debug!(entry = entry.name, error = %e, "capability unavailable");
                        metrics::CAPABILITY_READ_FAILURES
                            .with_label_values(&[entry.name])
                            .inc();
                        CapabilityValue::Error
                    }
                };
                CapabilitySnapshot {
                    entry: entry.clone(),
                    value,
                }
            })
            .collect();

        Ok(snapshots)
    }

    fn read_capability(
        &self,
        path: &Path,
        kind: CapabilityKind,
    ) -> Result<CapabilityValue, ResctrlError> {
        let content = self.read_bounded(path)?;
        match kind {
            CapabilityKind::Text => Ok(CapabilityValue::Text(
                content.trim_end_matches(['\0', '\n']).to_string(),
            )),
            CapabilityKind::Numeric => parse_first_line::<i64>(path, &content).map(CapabilityValue::Integer),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Group directories
    // ─────────────────────────────────────────────────────────────────────────

    pub fn group_exists(&self, group: &str) -> Result<bool, ResctrlError> {
        self.ensure_mounted()?;
        Ok(self.group_path(group)?.is_dir())
    }

    /// mkdir the group; the kernel fills in its control files
    pub fn create_group_dir(&self, group: &str) -> Result<(), ResctrlError> {
        self.ensure_mounted()?;
        let path = self.group_path(group)?;
        nix::unistd::mkdir(&path, Mode::from_bits_truncate(GROUP_DIR_MODE))
            .map_err(|errno| ResctrlError::from_errno(&path, errno))?;
        debug!(path = %path.display(), "group directory created");
        Ok(())
    }

    /// rmdir (not rm -rf) - the kernel tears the group down
    pub fn remove_group_dir(&self, group: &str) -> Result<(), ResctrlError> {
        self.ensure_mounted()?;
        let path = self.group_path(group)?;
        fs::remove_dir(&path).map_err(|e| ResctrlError::from_write(&path, e))?;
        debug!(path = %path.display(), "group directory removed");
        Ok(())
    }

    /// Names of sub-directories of `parent` (the root when None)
    ///
    /// A missing parent lists as empty.
    pub fn list_dirs(&self, parent: Option<&str>) -> Result<Vec<String>, ResctrlError> {
        self.ensure_mounted()?;
        let dir = match parent {
            Some(group) => self.group_path(group)?,
            None => self.root.clone(),
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ResctrlError::from_read(&dir, e)),
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Control files
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a PID to the group (tasks is opened for append)
    pub fn write_tasks(&self, group: &str, pid: u32) -> Result<(), ResctrlError> {
        self.write_control(group, TASKS_FILE, &pid.to_string(), WriteMode::Append)
    }

    /// Replace the group's CPU list with "start-end"
    pub fn write_cpu_range(&self, group: &str, range: CpuRange) -> Result<(), ResctrlError> {
        self.write_control(group, CPUS_LIST_FILE, &range.to_string(), WriteMode::Replace)
    }

    /// Replace the group's allocation directive
    ///
    /// The kernel's detailed rejection reason (info/last_cmd_status) is not read.
    pub fn write_schema(
        &self,
        group: &str,
        directive: &SchemaDirective,
    ) -> Result<(), ResctrlError> {
        self.write_control(group, SCHEMATA_FILE, directive.as_str(), WriteMode::Replace)
    }

    fn write_control(
        &self,
        group: &str,
        file: &str,
        value: &str,
        mode: WriteMode,
    ) -> Result<(), ResctrlError> {
        self.ensure_mounted()?;
        let path = self.group_path(group)?.join(file);

        let mut options = OpenOptions::new();
        options.write(true);
        match mode {
            WriteMode::Append => options.append(true),
            WriteMode::Replace => options.truncate(true),
        };

        let result = options
            .open(&path)
            .and_then(|mut f| f.write_all(value.as_bytes()))
            .map_err(|e| ResctrlError::from_write(&path, e));

        metrics::record_control_write(file, result.is_ok());
        match &result {
            Ok(()) => debug!(path = %path.display(), value, "control file written"),
            Err(e) => warn!(path = %path.display(), value, error = %e, "control write failed"),
        }
        result
    }

    /// Read a group's control file (e.g. "tasks") with the bounded buffer
    pub fn read_control(&self, group: &str, file: &str) -> Result<String, ResctrlError> {
        self.ensure_mounted()?;
        let path = self.group_path(group)?.join(file);
        self.read_bounded(&path)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Monitoring
    // ─────────────────────────────────────────────────────────────────────────

    /// LLC occupancy for every L3 monitoring domain of the group
    ///
    /// Errors with `FileNotFound` when the group itself is gone. A group
    /// without `mon_data/` yields no samples; domains whose counter cannot be
    /// read or parsed are skipped.
    pub fn read_occupancy(&self, group: &str) -> Result<Vec<OccupancySample>, ResctrlError> {
        self.ensure_mounted()?;
        let group_path = self.group_path(group)?;
        if !group_path.is_dir() {
            return Err(ResctrlError::FileNotFound(group_path));
        }

        let mon_data = group_path.join(MON_DATA_DIR);
        let entries = match fs::read_dir(&mon_data) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ResctrlError::from_read(&mon_data, e)),
        };

        let mut samples = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(domain) = name.to_str().and_then(parse_l3_domain) else {
                continue;
            };

            let counter = entry.path().join(LLC_OCCUPANCY_FILE);
            match self
                .read_bounded(&counter)
                .and_then(|content| parse_first_line::<u64>(&counter, &content))
            {
                Ok(bytes) => samples.push(OccupancySample { domain, bytes }),
                Err(e) => debug!(group, domain, error = %e, "skipping monitoring domain"),
            }
        }

        samples.sort_by_key(|s| s.domain);
        Ok(samples)
    }

    fn read_bounded(&self, path: &Path) -> Result<String, ResctrlError> {
        let file = File::open(path).map_err(|e| ResctrlError::from_read(path, e))?;
        let mut buf = Vec::with_capacity(self.read_limit);
        file.take(self.read_limit as u64)
            .read_to_end(&mut buf)
            .map_err(|e| ResctrlError::from_read(path, e))?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// "mon_L3_00" → 0, "mon_L3_01" → 1
fn parse_l3_domain(name: &str) -> Option<u32> {
    name.strip_prefix(L3_DOMAIN_PREFIX)?.parse().ok()
}

/// Only the first line carries the value
fn parse_first_line<T: std::str::FromStr>(path: &Path, content: &str) -> Result<T, ResctrlError> {
    let line = content.lines().next().unwrap_or("").trim_matches(['\0', ' ', '\t']);
    line.parse().map_err(|_| ResctrlError::ParseFailure {
        path: path.to_path_buf(),
        content: line.to_string(),
    })
}
