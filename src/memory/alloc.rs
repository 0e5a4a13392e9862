/*!
 * Allocation Tracking
 * Counting global allocator with per-site attribution
 *
 * Install in a binary or test crate:
 *
 * ```ignore
 * #[global_allocator]
 * static ALLOC: CountingAllocator = CountingAllocator::new();
 * ```
 *
 * Allocations are attributed to the site entered on the current thread
 * (see [`enter_site`]); everything else lands on the `unattributed` site.
 * The hooks only touch atomics and a const-initialized thread-local, so they
 * never allocate or lock.
 */

use crate::core::limits::MAX_ALLOCATION_SITES;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// Name of site 0
pub const UNATTRIBUTED_SITE: &str = "unattributed";

static INSTALLED: AtomicBool = AtomicBool::new(false);
static ALLOCATED_BYTES: AtomicU64 = AtomicU64::new(0);
static FREED_BYTES: AtomicU64 = AtomicU64::new(0);
static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static DEALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static PEAK_BYTES: AtomicI64 = AtomicI64::new(0);

#[allow(clippy::declare_interior_mutable_const)]
const SITE_ZERO: AtomicI64 = AtomicI64::new(0);
static SITE_BYTES: [AtomicI64; MAX_ALLOCATION_SITES] = [SITE_ZERO; MAX_ALLOCATION_SITES];
static SITE_COUNTS: [AtomicI64; MAX_ALLOCATION_SITES] = [SITE_ZERO; MAX_ALLOCATION_SITES];

static SITE_NAMES: Mutex<Vec<&'static str>> = parking_lot::const_mutex(Vec::new());

thread_local! {
    static CURRENT_SITE: Cell<usize> = const { Cell::new(0) };
}

#[inline]
fn current_site() -> usize {
    CURRENT_SITE.try_with(Cell::get).unwrap_or(0)
}

#[inline]
fn record_alloc(size: usize) {
    INSTALLED.store(true, Ordering::Relaxed);
    ALLOCATED_BYTES.fetch_add(size as u64, Ordering::Relaxed);
    ALLOCATIONS.fetch_add(1, Ordering::Relaxed);

    let site = current_site();
    SITE_BYTES[site].fetch_add(size as i64, Ordering::Relaxed);
    SITE_COUNTS[site].fetch_add(1, Ordering::Relaxed);

    let live = live_bytes();
    PEAK_BYTES.fetch_max(live, Ordering::Relaxed);
}

#[inline]
fn record_dealloc(size: usize) {
    FREED_BYTES.fetch_add(size as u64, Ordering::Relaxed);
    DEALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    SITE_BYTES[current_site()].fetch_sub(size as i64, Ordering::Relaxed);
}

#[inline]
fn live_bytes() -> i64 {
    ALLOCATED_BYTES.load(Ordering::Relaxed) as i64 - FREED_BYTES.load(Ordering::Relaxed) as i64
}

/// Global allocator wrapper that counts every allocation
pub struct CountingAllocator<A = System> {
    inner: A,
}

impl CountingAllocator<System> {
    pub const fn new() -> Self {
        Self { inner: System }
    }
}

impl Default for CountingAllocator<System> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> CountingAllocator<A> {
    /// Count allocations served by another allocator (e.g. jemalloc)
    pub const fn with_allocator(inner: A) -> Self {
        Self { inner }
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for CountingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        record_dealloc(layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            record_dealloc(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}

/// Whether a [`CountingAllocator`] is the active global allocator
///
/// True once the first allocation passed through it.
pub fn is_tracking() -> bool {
    INSTALLED.load(Ordering::Relaxed)
}

fn site_index(name: &'static str) -> usize {
    let mut names = SITE_NAMES.lock();
    if names.is_empty() {
        names.push(UNATTRIBUTED_SITE);
    }
    if let Some(index) = names.iter().position(|existing| *existing == name) {
        return index;
    }
    if names.len() >= MAX_ALLOCATION_SITES {
        // Table full: fold into the unattributed site
        return 0;
    }
    names.push(name);
    names.len() - 1
}

/// Attributes allocations on this thread to a site until dropped
///
/// Not `Send`: it restores the thread's previous site.
pub struct SiteGuard {
    previous: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for SiteGuard {
    fn drop(&mut self) {
        let previous = self.previous;
        let _ = CURRENT_SITE.try_with(|site| site.set(previous));
    }
}

/// Enter an allocation site on the current thread
pub fn enter_site(name: &'static str) -> SiteGuard {
    let index = site_index(name);
    let previous = CURRENT_SITE
        .try_with(|site| site.replace(index))
        .unwrap_or(0);
    SiteGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// Process-wide allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationTotals {
    pub allocated_bytes: u64,
    pub freed_bytes: u64,
    pub allocations: u64,
    pub deallocations: u64,
    pub live_bytes: i64,
    pub peak_bytes: i64,
}

/// Counters for one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSample {
    pub site: String,
    /// Net bytes (allocated minus freed while the site was current)
    pub bytes: i64,
    pub allocations: i64,
}

/// Allocation change of one site between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDelta {
    pub site: String,
    pub bytes: i64,
    pub allocations: i64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    pub totals: AllocationTotals,
    pub sites: Vec<SiteSample>,
}

impl AllocationSnapshot {
    /// Per-site changes from `self` to `later`, largest absolute byte delta first
    pub fn diff(&self, later: &AllocationSnapshot, top: usize) -> Vec<SiteDelta> {
        let mut deltas: Vec<SiteDelta> = later
            .sites
            .iter()
            .map(|after| {
                let before = self.sites.iter().find(|s| s.site == after.site);
                SiteDelta {
                    site: after.site.clone(),
                    bytes: after.bytes - before.map(|b| b.bytes).unwrap_or(0),
                    allocations: after.allocations - before.map(|b| b.allocations).unwrap_or(0),
                }
            })
            .filter(|delta| delta.bytes != 0 || delta.allocations != 0)
            .collect();

        deltas.sort_by(|a, b| b.bytes.abs().cmp(&a.bytes.abs()).then(a.site.cmp(&b.site)));
        deltas.truncate(top);
        deltas
    }

    pub fn site(&self, name: &str) -> Option<&SiteSample> {
        self.sites.iter().find(|s| s.site == name)
    }
}

/// Copy the current counters
pub fn allocation_snapshot() -> AllocationSnapshot {
    let names: Vec<&'static str> = {
        let names = SITE_NAMES.lock();
        if names.is_empty() {
            vec![UNATTRIBUTED_SITE]
        } else {
            names.clone()
        }
    };

    let sites = names
        .into_iter()
        .enumerate()
        .map(|(index, name)| SiteSample {
            site: name.to_string(),
            bytes: SITE_BYTES[index].load(Ordering::Relaxed),
            allocations: SITE_COUNTS[index].load(Ordering::Relaxed),
        })
        .collect();

    AllocationSnapshot {
        totals: AllocationTotals {
            allocated_bytes: ALLOCATED_BYTES.load(Ordering::Relaxed),
            freed_bytes: FREED_BYTES.load(Ordering::Relaxed),
            allocations: ALLOCATIONS.load(Ordering::Relaxed),
            deallocations: DEALLOCATIONS.load(Ordering::Relaxed),
            live_bytes: live_bytes(),
            peak_bytes: PEAK_BYTES.load(Ordering::Relaxed),
        },
        sites,
    }
}
