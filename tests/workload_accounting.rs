//! Allocation accounting for the cache pressure workload
//!
//! A counting global allocator tracks live and peak heap bytes, so the test
//! can see the pressure buffer come and go. Kept in its own test binary so
//! no other test shares the allocator.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rdtctl::metrics;
use rdtctl::workload::CachePressureWorkload;

struct CountingAllocator;

static LIVE: AtomicUsize = AtomicUsize::new(0);
static PEAK: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            let live = LIVE.fetch_add(layout.size(), Ordering::SeqCst) + layout.size();
            PEAK.fetch_max(live, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        LIVE.fetch_sub(layout.size(), Ordering::SeqCst);
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

const MIB: usize = 1024 * 1024;
/// Slack for allocations made by the test harness on other threads
const TOLERANCE: usize = 64 * 1024;

/// Test that run(1 MiB, 1s) succeeds and releases its buffer
#[test]
fn test_run_releases_buffer() {
    // Metrics registration allocates once and never frees; do it up front
    let _ = metrics::WORKLOAD_PASSES.get();
    let _ = metrics::WORKLOAD_ACTIVE.get();

    let baseline = LIVE.load(Ordering::SeqCst);
    PEAK.store(baseline, Ordering::SeqCst);

    assert!(CachePressureWorkload::new(MIB).run(Duration::from_secs(1)));

    let peak = PEAK.load(Ordering::SeqCst);
    let after = LIVE.load(Ordering::SeqCst);
    assert!(peak >= baseline + MIB, "peak {} baseline {}", peak, baseline);
    assert!(
        after <= baseline + TOLERANCE,
        "leaked: {} live bytes after, {} before",
        after,
        baseline
    );
}
