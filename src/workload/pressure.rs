//! Cache pressure workload
//!
//! Writes every byte of a buffer, over and over, until a deadline. The
//! writes are volatile so the compiler cannot prove them dead, and each pass
//! is pure memory traffic, so the LLC footprint tracks the buffer size.
//! Bind the running thread's process to a resctrl group and its occupancy
//! counter should climb toward (and be capped by) the group's allocation.
//!
//! ```text
//! run(5 MiB, 2s):
//!   allocate ──► [touch, touch, touch, ... until deadline] ──► free ──► true
//! ```

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::metrics::{WORKLOAD_ACTIVE, WORKLOAD_PASSES};

/// Heap buffer owned by a single run; freed when dropped
struct PressureBuffer {
    bytes: Vec<u8>,
}

impl PressureBuffer {
    /// None on zero size or allocation failure (never aborts)
    fn allocate(size_bytes: usize) -> Option<Self> {
        if size_bytes == 0 {
            return None;
        }
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size_bytes).ok()?;
        bytes.resize(size_bytes, 0);
        Some(Self { bytes })
    }

    /// One full sequential byte-write traversal
    fn touch(&mut self) {
        for (i, byte) in self.bytes.iter_mut().enumerate() {
            // SAFETY: `byte` is an exclusive reference into the live buffer.
            unsafe { ptr::write_volatile(byte, i as u8) };
        }
        std::hint::black_box(&mut self.bytes);
        WORKLOAD_PASSES.inc();
    }
}

fn current_tid() -> u32 {
    // SAFETY: gettid takes no arguments and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as u32 }
}

/// Keeps the active-workload gauge honest on every exit path
struct ActiveGuard;

impl ActiveGuard {
    fn enter() -> Self {
        WORKLOAD_ACTIVE.inc();
        ActiveGuard
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        WORKLOAD_ACTIVE.dec();
    }
}

/// None when `duration` reaches past what `Instant` can represent
fn deadline_after(duration: Duration) -> Option<Instant> {
    Instant::now().checked_add(duration)
}

/// Touch `buffer` while `keep_going` holds, then free it; returns the pass count
fn pump(mut buffer: PressureBuffer, keep_going: impl Fn() -> bool) -> u64 {
    let _active = ActiveGuard::enter();
    let mut passes: u64 = 0;
    while keep_going() {
        buffer.touch();
        passes += 1;
    }
    passes
}

/// Generates LLC pressure proportional to `size_bytes`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePressureWorkload {
    size_bytes: usize,
}

impl CachePressureWorkload {
    pub fn new(size_bytes: usize) -> Self {
        Self { size_bytes }
    }

    pub fn from_kib(kib: usize) -> Self {
        Self::new(kib.saturating_mul(1024))
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Touch the buffer until `duration` has elapsed
    ///
    /// Returns false without doing anything if the buffer cannot be
    /// allocated. The buffer is released before returning. A duration too
    /// large to add to the clock has no deadline and runs until the process
    /// exits.
    pub fn run(&self, duration: Duration) -> bool {
        let deadline = deadline_after(duration);
        let Some(buffer) = self.allocate() else {
            return false;
        };

        info!(size_bytes = self.size_bytes, ?duration, "cache pressure started");
        let passes = pump(buffer, || deadline.map_or(true, |d| Instant::now() < d));
        info!(size_bytes = self.size_bytes, passes, "cache pressure finished");
        true
    }

    /// Touch the buffer until `stop` is raised
    ///
    /// No internal timeout. The flag is checked once per pass.
    pub fn run_forever(&self, stop: &AtomicBool) -> bool {
        match self.allocate() {
            Some(buffer) => {
                self.run_until_stopped(buffer, stop);
                true
            }
            None => false,
        }
    }

    /// Run `run_forever` on a dedicated thread
    pub fn spawn_background(&self) -> io::Result<BackgroundWorkload> {
        BackgroundWorkload::spawn(*self)
    }

    fn allocate(&self) -> Option<PressureBuffer> {
        let buffer = PressureBuffer::allocate(self.size_bytes);
        if buffer.is_none() {
            warn!(size_bytes = self.size_bytes, "cannot allocate pressure buffer");
        }
        buffer
    }

    fn run_until_stopped(&self, buffer: PressureBuffer, stop: &AtomicBool) {
        debug!(size_bytes = self.size_bytes, "unbounded cache pressure started");
        let passes = pump(buffer, || !stop.load(Ordering::Relaxed));
        debug!(size_bytes = self.size_bytes, passes, "unbounded cache pressure stopped");
    }
}

/// A `run_forever` workload on its own OS thread
///
/// The buffer is allocated before `spawn` returns, so a handle always
/// refers to a thread that is generating pressure. Stopping (explicitly or
/// by drop) raises the flag and joins the thread, so the buffer is freed by
/// the time `stop` returns.
pub struct BackgroundWorkload {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<bool>>,
    tid: u32,
}

impl BackgroundWorkload {
    pub fn spawn(workload: CachePressureWorkload) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("cache-pressure".to_string())
            .spawn(move || {
                let Some(buffer) = workload.allocate() else {
                    let _ = ready_tx.send(None);
                    return false;
                };
                let _ = ready_tx.send(Some(current_tid()));
                workload.run_until_stopped(buffer, &flag);
                true
            })?;

        match ready_rx.recv() {
            Ok(Some(tid)) => Ok(Self {
                stop,
                handle: Some(handle),
                tid,
            }),
            Ok(None) => {
                let _ = handle.join();
                Err(io::Error::new(
                    io::ErrorKind::OutOfMemory,
                    "cannot allocate the pressure buffer",
                ))
            }
            Err(_) => {
                let _ = handle.join();
                Err(io::Error::new(io::ErrorKind::Other, "workload thread exited early"))
            }
        }
    }

    /// Kernel thread id of the workload thread
    ///
    /// resctrl `tasks` takes thread ids: write this one to move the
    /// workload itself into a group.
    pub fn tid(&self) -> u32 {
        self.tid
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Signal the thread and wait for it; returns what `run_forever` returned
    pub fn stop(mut self) -> bool {
        self.shutdown()
    }

    fn shutdown(&mut self) -> bool {
        self.stop.store(true, Ordering::Relaxed);
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(false),
            None => false,
        }
    }
}

impl Drop for BackgroundWorkload {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_size_fails() {
        assert!(!CachePressureWorkload::new(0).run(Duration::from_millis(10)));
        assert!(!CachePressureWorkload::new(0).run_forever(&AtomicBool::new(false)));
    }

    #[test]
    fn test_impossible_allocation_fails() {
        assert!(!CachePressureWorkload::new(usize::MAX).run(Duration::from_millis(10)));
    }

    #[test]
    fn test_buffer_is_written() {
        let mut buffer = PressureBuffer::allocate(300).unwrap();
        buffer.touch();
        assert_eq!(buffer.bytes[0], 0);
        assert_eq!(buffer.bytes[255], 255);
        assert_eq!(buffer.bytes[299], 43);
    }

    #[test]
    fn test_run_honors_deadline() {
        let start = Instant::now();
        assert!(CachePressureWorkload::from_kib(64).run(Duration::from_millis(100)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_unrepresentable_deadline() {
        assert!(deadline_after(Duration::MAX).is_none());
        assert!(deadline_after(Duration::from_secs(1)).is_some());
        // The deadline is computed before allocation fails
        assert!(!CachePressureWorkload::new(0).run(Duration::MAX));
    }

    #[test]
    fn test_pump_without_deadline_stops_on_flag() {
        let stop = AtomicBool::new(false);
        let buffer = PressureBuffer::allocate(64).unwrap();
        let deadline = deadline_after(Duration::MAX);
        let passes = pump(buffer, || {
            deadline.map_or(true, |d| Instant::now() < d) && !stop.swap(true, Ordering::Relaxed)
        });
        assert_eq!(passes, 1);
    }

    #[test]
    fn test_run_forever_stops_on_flag() {
        let stop = AtomicBool::new(true);
        assert!(CachePressureWorkload::from_kib(4).run_forever(&stop));
    }

    #[test]
    fn test_background_workload_stops() {
        let background = CachePressureWorkload::from_kib(64).spawn_background().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(!background.is_finished());
        assert_ne!(background.tid(), 0);
        assert_ne!(background.tid(), current_tid());
        assert!(background.stop());
    }

    #[test]
    fn test_background_spawn_fails_without_buffer() {
        let err = CachePressureWorkload::new(usize::MAX)
            .spawn_background()
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::OutOfMemory);
        assert!(CachePressureWorkload::new(0).spawn_background().is_err());
    }
}
