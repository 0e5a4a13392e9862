/*!
 * Usage Probes
 * Point-in-time process memory/CPU readings
 *
 * [`SystemProbe`] reads the live process through sysinfo and, on Linux,
 * `/proc/self/statm` for the shared/text/data/lib segments.
 * [`ScriptedProbe`] returns caller-supplied RSS values so limiter behaviour can
 * be driven deterministically.
 */

use super::types::{ResourceError, ResourceResult, ResourceUsageSnapshot};
use crate::core::limits::FALLBACK_SYSTEM_MEMORY;
use crate::core::types::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;
use sysinfo::{Pid as SysPid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Source of resource usage snapshots
pub trait UsageProbe: Send + Sync {
    /// Take one reading. Must not block beyond a single OS query.
    fn sample(&self) -> ResourceResult<ResourceUsageSnapshot>;

    /// Total physical memory of the host
    fn system_memory(&self) -> Bytes;
}

/// Memory segments from `/proc/<pid>/statm`, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatmSegments {
    pub size: Bytes,
    pub resident: Bytes,
    pub shared: Bytes,
    pub text: Bytes,
    pub lib: Bytes,
    pub data: Bytes,
}

/// Parse the contents of a statm file
///
/// Format: `size resident shared text lib data dt`, all in pages.
pub fn parse_statm(content: &str, page_size: Bytes) -> Option<StatmSegments> {
    let fields: Vec<Bytes> = content
        .split_whitespace()
        .map(|field| field.parse::<Bytes>())
        .collect::<Result<_, _>>()
        .ok()?;

    if fields.len() < 6 {
        return None;
    }

    Some(StatmSegments {
        size: fields[0] * page_size,
        resident: fields[1] * page_size,
        shared: fields[2] * page_size,
        text: fields[3] * page_size,
        lib: fields[4] * page_size,
        data: fields[5] * page_size,
    })
}

#[cfg(target_os = "linux")]
fn page_size() -> Bytes {
    use nix::unistd::{sysconf, SysconfVar};

    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as Bytes,
        _ => 4096,
    }
}

#[cfg(not(target_os = "linux"))]
fn page_size() -> Bytes {
    4096
}

#[cfg(target_os = "linux")]
fn read_statm(page_size: Bytes) -> Option<StatmSegments> {
    let content = std::fs::read_to_string("/proc/self/statm").ok()?;
    parse_statm(&content, page_size)
}

#[cfg(not(target_os = "linux"))]
fn read_statm(_page_size: Bytes) -> Option<StatmSegments> {
    None
}

/// Probe for the current process
pub struct SystemProbe {
    system: Mutex<System>,
    pid: SysPid,
    page_size: Bytes,
    system_memory: Bytes,
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let total = system.total_memory();

        Self {
            system: Mutex::new(system),
            pid: SysPid::from_u32(std::process::id()),
            page_size: page_size(),
            system_memory: if total > 0 {
                total
            } else {
                FALLBACK_SYSTEM_MEMORY
            },
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageProbe for SystemProbe {
    fn sample(&self) -> ResourceResult<ResourceUsageSnapshot> {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );

        let process = system.process(self.pid).ok_or_else(|| {
            ResourceError::Probe(format!("process {} not visible", self.pid.as_u32()))
        })?;

        let segments = read_statm(self.page_size).unwrap_or_default();

        Ok(ResourceUsageSnapshot {
            rss: process.memory(),
            vms: process.virtual_memory(),
            shared: segments.shared,
            text: segments.text,
            data: segments.data,
            lib: segments.lib,
            cpu_percent: process.cpu_usage(),
            pid: self.pid.as_u32(),
            num_threads: process.tasks().map(|tasks| tasks.len()).unwrap_or(1).max(1),
            timestamp: SystemTime::now(),
        })
    }

    fn system_memory(&self) -> Bytes {
        self.system_memory
    }
}

/// Deterministic probe for simulations and tests
///
/// Queued readings are consumed first; afterwards the last value set with
/// [`ScriptedProbe::set_rss`] is repeated.
pub struct ScriptedProbe {
    current: AtomicU64,
    queued: Mutex<VecDeque<Bytes>>,
    fail_next: AtomicBool,
    system_memory: Bytes,
}

impl ScriptedProbe {
    pub fn new(system_memory: Bytes) -> Self {
        Self {
            current: AtomicU64::new(0),
            queued: Mutex::new(VecDeque::new()),
            fail_next: AtomicBool::new(false),
            system_memory,
        }
    }

    /// Set the RSS reported from now on
    pub fn set_rss(&self, rss: Bytes) {
        self.current.store(rss, Ordering::SeqCst);
    }

    /// Queue readings returned by the next samples, in order
    pub fn push_readings<I: IntoIterator<Item = Bytes>>(&self, readings: I) {
        self.queued.lock().extend(readings);
    }

    /// Make the next sample fail once
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl UsageProbe for ScriptedProbe {
    fn sample(&self) -> ResourceResult<ResourceUsageSnapshot> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ResourceError::Probe("scripted failure".into()));
        }

        let rss = match self.queued.lock().pop_front() {
            Some(next) => {
                self.current.store(next, Ordering::SeqCst);
                next
            }
            None => self.current.load(Ordering::SeqCst),
        };

        Ok(ResourceUsageSnapshot::from_rss(rss))
    }

    fn system_memory(&self) -> Bytes {
        self.system_memory
    }
}
