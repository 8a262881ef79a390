//! Process memory accounting: a counting global allocator plus a
//! cancellable background sampler that maintains monotonic peaks.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

static ALLOCATED_BYTES: AtomicU64 = AtomicU64::new(0);
static ALLOCATION_COUNT: AtomicU64 = AtomicU64::new(0);

/// System allocator wrapper tracking live heap bytes and the total
/// allocation count. Installed by the binary via `#[global_allocator]`.
pub struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            ALLOCATED_BYTES.fetch_add(layout.size() as u64, Ordering::Relaxed);
            ALLOCATION_COUNT.fetch_add(1, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        ALLOCATED_BYTES.fetch_sub(layout.size() as u64, Ordering::Relaxed);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            ALLOCATED_BYTES.fetch_add(new_size as u64, Ordering::Relaxed);
            ALLOCATED_BYTES.fetch_sub(layout.size() as u64, Ordering::Relaxed);
            ALLOCATION_COUNT.fetch_add(1, Ordering::Relaxed);
        }
        new_ptr
    }
}

/// Live heap bytes held through the counting allocator.
pub fn allocated_bytes() -> u64 {
    ALLOCATED_BYTES.load(Ordering::Relaxed)
}

/// Total number of allocations since process start.
pub fn allocation_count() -> u64 {
    ALLOCATION_COUNT.load(Ordering::Relaxed)
}

/// Resident set size in bytes from /proc/self/statm, 0 where the file
/// is unavailable.
pub fn resident_bytes() -> u64 {
    let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
        return 0;
    };
    let Some(resident_pages) = statm
        .split_whitespace()
        .nth(1)
        .and_then(|field| field.parse::<u64>().ok())
    else {
        return 0;
    };
    resident_pages * page_size()
}

fn page_size() -> u64 {
    // Linux reports statm in pages; 4 KiB everywhere this tool runs.
    4096
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryPeaks {
    pub alloc_bytes: u64,
    pub resident_bytes: u64,
}

struct Shared {
    stop: AtomicBool,
    peak_alloc: AtomicU64,
    peak_resident: AtomicU64,
}

impl Shared {
    fn sample(&self) {
        update_max(&self.peak_alloc, allocated_bytes());
        update_max(&self.peak_resident, resident_bytes());
    }
}

/// Monotonic maximum via compare-and-set; never decreases, safe against
/// concurrent readers of the peak.
fn update_max(cell: &AtomicU64, value: u64) {
    let mut current = cell.load(Ordering::Relaxed);
    while value > current {
        match cell.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(observed) => current = observed,
        }
    }
}

/// Periodic peak-memory sampler scoped to one operation: spawn it before
/// the work, stop it when the work completes or fails. Unlike a detached
/// loop it cannot outlive its operation.
pub struct MemoryWatcher {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl MemoryWatcher {
    pub fn spawn(interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            peak_alloc: AtomicU64::new(0),
            peak_resident: AtomicU64::new(0),
        });
        shared.sample();

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("mem-watcher".to_string())
            .spawn(move || {
                const TICK: Duration = Duration::from_millis(50);
                while !worker.stop.load(Ordering::Relaxed) {
                    worker.sample();
                    let mut slept = Duration::ZERO;
                    while slept < interval && !worker.stop.load(Ordering::Relaxed) {
                        thread::sleep(TICK.min(interval - slept));
                        slept += TICK;
                    }
                }
            })
            .expect("spawn mem-watcher");

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Signal the sampler, wait for it to exit, and return the peaks
    /// including a final sample.
    pub fn stop(mut self) -> MemoryPeaks {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.shared.sample();
        MemoryPeaks {
            alloc_bytes: self.shared.peak_alloc.load(Ordering::Relaxed),
            resident_bytes: self.shared.peak_resident.load(Ordering::Relaxed),
        }
    }
}

impl Drop for MemoryWatcher {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
