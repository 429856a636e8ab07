//! Integration tests for the resctrl control plane
//!
//! Most tests run against a fake resctrl tree in a temporary directory.
//! Tests that need real RDT hardware and root are marked #[ignore].

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use rdtctl::cpuid::CpuidProbe;
use rdtctl::resctrl::{
    CacheAllocationInfo, CacheQuota, CapabilityValue, CpuRange, MonGroupManager, ResctrlError,
    ResctrlGateway, SchemaCatalog, SchemaDirective,
};
use rdtctl::telemetry::TelemetryReader;
use rdtctl::workload::CachePressureWorkload;
use rdtctl::RdtConfig;

fn gateway(root: &TempDir) -> Arc<ResctrlGateway> {
    let gateway = ResctrlGateway::new(root.path());
    gateway.mount().unwrap();
    Arc::new(gateway)
}

/// Stand in for the kernel: give a group the control files it would populate
fn populate_group(root: &TempDir, group: &str, files: &[(&str, &str)]) {
    let dir = root.path().join(group);
    fs::create_dir_all(&dir).unwrap();
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
    for (name, content) in files {
        fs::write(dir.join(name), content).unwrap();
    }
}

fn write_info(root: &Path, name: &str, content: &str) {
    let path = root.join("info").join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────────────

/// Test that a missing capability file only affects its own entry
#[test]
fn test_missing_capability_yields_sentinel() {
    let root = TempDir::new().unwrap();
    write_info(root.path(), "L3/cbm_mask", "7ff\n");
    write_info(root.path(), "L3/min_cbm_bits", "1\n");
    write_info(root.path(), "L3/num_closids", "16\n");
    write_info(root.path(), "L3_MON/mon_features", "llc_occupancy\nmbm_total_bytes\n");
    write_info(root.path(), "L3_MON/rmids", "not-a-number\n");

    let snapshots = gateway(&root)
        .read_capabilities(&SchemaCatalog::intel_l3())
        .unwrap();
    assert_eq!(snapshots.len(), 7);

    let value = |name: &str| {
        snapshots
            .iter()
            .find(|s| s.entry.name == name)
            .unwrap()
            .clone()
    };

    assert_eq!(value("L3/cbm_mask").value, CapabilityValue::Text("7ff".to_string()));
    assert_eq!(value("L3/num_closids").value, CapabilityValue::Integer(16));
    assert_eq!(
        value("L3_MON/mon_features").as_text(),
        "llc_occupancy\nmbm_total_bytes"
    );

    // Absent file and unparsable content both become the sentinel
    let sharable = value("L3/sharable_bits");
    assert!(sharable.is_error());
    assert_eq!(sharable.as_integer(), 0);
    let rmids = value("L3_MON/rmids");
    assert!(rmids.is_error());
    assert_eq!(rmids.display_value(), "0");
}

/// Test that allocation limits are derived from a capability scan
#[test]
fn test_allocation_info_from_fake_tree() {
    let root = TempDir::new().unwrap();
    write_info(root.path(), "L3/cbm_mask", "fffff\n");
    write_info(root.path(), "L3/min_cbm_bits", "2\n");
    write_info(root.path(), "L3/num_closids", "15\n");

    let snapshots = gateway(&root)
        .read_capabilities(&SchemaCatalog::intel_l3())
        .unwrap();
    let info = CacheAllocationInfo::from_snapshots(&snapshots).unwrap();

    assert_eq!(info.ways(), 20);
    assert_eq!(info.num_closids, 15);
    assert!(info.validate(0x3).is_ok());
    assert!(info.validate(0x1).is_err());
    assert!(info.validate(0x5).is_err());
}

/// Test that an empty info tree still scans without failing
#[test]
fn test_extended_catalog_on_empty_tree() {
    let root = TempDir::new().unwrap();
    let snapshots = gateway(&root)
        .read_capabilities(&SchemaCatalog::extended())
        .unwrap();
    assert_eq!(snapshots.len(), SchemaCatalog::extended().len());
    assert!(snapshots.iter().all(|s| s.is_error()));
}

/// Test that an unmounted root fails the whole scan
#[test]
fn test_capabilities_require_mount() {
    let root = TempDir::new().unwrap();
    let config = RdtConfig::default().with_mount_root(root.path().join("not-mounted"));
    let gateway = ResctrlGateway::from_config(&config);

    assert!(matches!(gateway.mount(), Err(ResctrlError::MountUnavailable(_))));
    assert!(matches!(
        gateway.read_capabilities(&config.catalog),
        Err(ResctrlError::MountUnavailable(_))
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Group lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Test that creating twice is not an error and leaves one directory
#[test]
fn test_create_twice_is_idempotent() {
    let root = TempDir::new().unwrap();
    let groups = MonGroupManager::new(gateway(&root));

    let first = groups.try_create("p1").unwrap();
    let second = groups.try_create("p1").unwrap();
    assert_eq!(first, second);
    assert!(first.mounted);
    assert!(root.path().join("p1").is_dir());
}

/// Test that destroying a group that never existed reports success
#[test]
fn test_destroy_absent_group() {
    let root = TempDir::new().unwrap();
    let groups = MonGroupManager::new(gateway(&root));

    assert!(groups.destroy("p9"));
    assert!(groups.try_destroy("mon_groups/none").is_ok());
}

/// Test that list() walks control groups and both kinds of monitoring group
#[test]
fn test_list_groups() {
    let root = TempDir::new().unwrap();
    for dir in ["info/L3", "mon_data/mon_L3_00", "mon_groups/test1", "p0", "p1/mon_groups/m1"] {
        fs::create_dir_all(root.path().join(dir)).unwrap();
    }
    let groups = MonGroupManager::new(gateway(&root));

    let listed = groups.list().unwrap();
    let names: Vec<&str> = listed.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["mon_groups/test1", "p0", "p1", "p1/mon_groups/m1"]);

    let monitor_only: Vec<bool> = listed.iter().map(|g| g.is_monitor_only()).collect();
    assert_eq!(monitor_only, vec![true, false, false, true]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Control files
// ─────────────────────────────────────────────────────────────────────────────

/// Test that tasks is appended to, never truncated
#[test]
fn test_bind_task_appends() {
    let root = TempDir::new().unwrap();
    populate_group(&root, "p1", &[("tasks", "1\n")]);
    let groups = MonGroupManager::new(gateway(&root));

    groups.bind_task("p1", 42).unwrap();
    assert_eq!(fs::read_to_string(root.path().join("p1/tasks")).unwrap(), "1\n42");
    assert_eq!(groups.tasks("p1").unwrap(), vec![1, 42]);
}

/// Test that cpus_list is replaced with the "start-end" form
#[test]
fn test_bind_cpu_range_replaces() {
    let root = TempDir::new().unwrap();
    populate_group(&root, "p1", &[("cpus_list", "0-63\n")]);
    let groups = MonGroupManager::new(gateway(&root));

    groups.bind_cpu_range("p1", CpuRange::new(4, 8).unwrap()).unwrap();
    assert_eq!(fs::read_to_string(root.path().join("p1/cpus_list")).unwrap(), "4-8");
    assert_eq!(groups.gateway().read_control("p1", "cpus_list").unwrap(), "4-8");
}

/// Test that schemata is replaced wholesale
#[test]
fn test_set_schema_replaces() {
    let root = TempDir::new().unwrap();
    populate_group(&root, "p1", &[("schemata", "L3:0=7ff;1=7ff\nMB:0=100;1=100\n")]);
    let groups = MonGroupManager::new(gateway(&root));

    groups.set_schema("p1", &SchemaDirective::raw("L3:0=f")).unwrap();
    assert_eq!(fs::read_to_string(root.path().join("p1/schemata")).unwrap(), "L3:0=f");
}

/// Test that control files are never created by a write
#[test]
fn test_write_without_control_file_fails() {
    let root = TempDir::new().unwrap();
    let groups = MonGroupManager::new(gateway(&root));
    assert!(groups.create("p1"));

    let err = groups.bind_cpu_range("p1", CpuRange::single(0)).unwrap_err();
    assert!(matches!(
        err,
        ResctrlError::FileNotFound(_) | ResctrlError::PermissionDenied(_)
    ));
    assert!(!root.path().join("p1/cpus_list").exists());
}

/// Test the mkdir, cpus_list, schemata sequence of a cache quota
#[test]
fn test_create_cache_quota() {
    let root = TempDir::new().unwrap();
    populate_group(&root, "p2", &[("cpus_list", ""), ("schemata", "")]);
    let groups = MonGroupManager::new(gateway(&root));

    let quota = CacheQuota {
        cpus: Some(CpuRange::new(4, 8).unwrap()),
        l3_masks: vec![(0, 0xf), (1, 0xff0)],
    };
    let group = groups.create_cache_quota("p2", &quota).unwrap();

    assert_eq!(group.name, "p2");
    assert_eq!(fs::read_to_string(root.path().join("p2/cpus_list")).unwrap(), "4-8");
    assert_eq!(
        fs::read_to_string(root.path().join("p2/schemata")).unwrap(),
        "L3:0=f;1=ff0"
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Monitoring
// ─────────────────────────────────────────────────────────────────────────────

/// Test poll on a fresh group, then on the same group after destroy
#[test]
fn test_poll_before_and_after_destroy() {
    let root = TempDir::new().unwrap();
    let gateway = gateway(&root);
    let groups = MonGroupManager::new(gateway.clone());
    let telemetry = TelemetryReader::new(gateway, Duration::from_secs(1));

    assert!(groups.create("p1"));
    assert!(telemetry.poll("p1").unwrap().is_empty());

    assert!(groups.destroy("p1"));
    let err = telemetry.poll("p1").unwrap_err();
    assert!(matches!(err, ResctrlError::FileNotFound(_)));
}

/// Test that CPUID queries are repeatable and never fail
#[test]
fn test_cpuid_query_is_deterministic() {
    let probe = CpuidProbe::new();
    for subleaf in [0, 1] {
        let first = probe.query(0xF, subleaf);
        let second = probe.query(0xF, subleaf);
        assert_eq!(first, second);
    }
    assert_eq!(probe.rdt_report().len(), 6);
}

// ─────────────────────────────────────────────────────────────────────────────
// Hardware
// ─────────────────────────────────────────────────────────────────────────────

/// Test that a loaded group reports occupancy mid-run and nothing after destroy
#[test]
#[ignore = "Requires root and a mounted resctrl filesystem"]
fn test_live_occupancy_lifecycle() {
    let config = RdtConfig::from_env();
    let gateway = Arc::new(ResctrlGateway::from_config(&config));
    gateway.mount().unwrap();
    let groups = MonGroupManager::new(gateway.clone());
    let telemetry = TelemetryReader::new(gateway, config.poll_interval);

    let group = "rdtctl_it_p1";
    assert!(groups.create(group));
    telemetry.poll(group).unwrap();

    let workload = CachePressureWorkload::from_kib(5 * 1024).spawn_background().unwrap();
    groups.bind_task(group, workload.tid()).unwrap();
    std::thread::sleep(Duration::from_secs(1));

    let samples = telemetry.poll(group).unwrap();
    assert!(samples.iter().any(|s| s.bytes > 0), "no occupancy: {:?}", samples);

    assert!(workload.stop());
    assert!(groups.destroy(group));
    assert!(telemetry.poll(group).unwrap_err().is_not_found());
}

/// Test that resctrl and CPUID agree on L3 allocation support
#[test]
#[ignore = "Requires root and a mounted resctrl filesystem"]
fn test_resctrl_matches_cpuid() {
    let config = RdtConfig::from_env();
    let gateway = ResctrlGateway::from_config(&config);
    gateway.mount().unwrap();

    let snapshots = gateway.read_capabilities(&SchemaCatalog::intel_l3()).unwrap();
    let info = CacheAllocationInfo::from_snapshots(&snapshots).unwrap();
    let cat = CpuidProbe::new().allocation_caps().l3.unwrap();

    assert_eq!(info.ways(), cat.cbm_length);
}
