//! NUMA topology and bucket placement.
//!
//! Topology is read once from `/sys/devices/system/node` on Linux. Machines
//! without that tree (and other platforms) look like a single node and
//! every placement resolves to node 0.

use crate::tracing_helpers::{debug_log, warn_log};
use core::str::FromStr;
use once_cell::race::OnceBox;

/// Where new buckets (and variable-length record buffers) are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Node of the CPU the allocating thread is running on.
    #[default]
    Local,
    /// The bit-reversed hash space is cut into one contiguous range per
    /// node; a bucket lives on the node owning its prefix.
    HashRange,
    /// Everything on node 0.
    Single,
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Placement::Local),
            "hash-range" | "hashrange" | "range" => Ok(Placement::HashRange),
            "single" | "off" | "none" => Ok(Placement::Single),
            other => Err(format!("unknown placement {other:?}")),
        }
    }
}

/// CPU to node map.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: usize,
    /// Indexed by CPU id.
    cpu_node: Vec<u32>,
}

impl Topology {
    /// One node, no CPU map.
    pub fn single() -> Self {
        Self {
            nodes: 1,
            cpu_node: Vec::new(),
        }
    }

    /// Read the machine topology.
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            match Self::from_sysfs(std::path::Path::new("/sys/devices/system/node")) {
                Some(topo) => {
                    debug_log!(nodes = topo.nodes, cpus = topo.cpu_node.len(), "numa topology");
                    return topo;
                }
                None => {
                    warn_log!("numa topology unavailable, assuming a single node");
                }
            }
        }
        Self::single()
    }

    #[cfg(target_os = "linux")]
    fn from_sysfs(root: &std::path::Path) -> Option<Self> {
        let mut cpu_node = Vec::new();
        let mut max_node = None;
        for entry in std::fs::read_dir(root).ok()?.flatten() {
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|s| s.strip_prefix("node"))
                .and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            let list = std::fs::read_to_string(entry.path().join("cpulist")).unwrap_or_default();
            for cpu in parse_cpulist(&list) {
                if cpu_node.len() <= cpu {
                    cpu_node.resize(cpu + 1, 0);
                }
                cpu_node[cpu] = id;
            }
            max_node = max_node.max(Some(id));
        }
        let nodes = max_node? as usize + 1;
        Some(Self { nodes, cpu_node })
    }

    /// Number of nodes (at least 1).
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Node owning `cpu`; 0 when unknown.
    pub fn node_of_cpu(&self, cpu: usize) -> u32 {
        self.cpu_node.get(cpu).copied().unwrap_or(0)
    }

    /// Node of the CPU the calling thread runs on right now.
    pub fn current_node(&self) -> u32 {
        if self.nodes == 1 {
            return 0;
        }
        match current_cpu() {
            Some(cpu) => self.node_of_cpu(cpu),
            None => 0,
        }
    }

    /// Node owning the range containing `reversed`, a bit-reversed hash.
    pub fn node_of_range(&self, reversed: u64) -> u32 {
        ((reversed as u128 * self.nodes as u128) >> 64) as u32
    }
}

/// Parse a sysfs cpulist such as `0-3,8,10-11`.
pub fn parse_cpulist(list: &str) -> Vec<usize> {
    let mut cpus = Vec::new();
    for part in list.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<usize>(), hi.trim().parse::<usize>()) {
                    cpus.extend(lo..=hi);
                }
            }
            None => {
                if let Ok(cpu) = part.trim().parse::<usize>() {
                    cpus.push(cpu);
                }
            }
        }
    }
    cpus
}

static TOPOLOGY: OnceBox<Topology> = OnceBox::new();

/// Process-wide topology, detected on first use.
pub fn topology() -> &'static Topology {
    TOPOLOGY.get_or_init(|| Box::new(Topology::detect()))
}

#[cfg(target_os = "linux")]
fn current_cpu() -> Option<usize> {
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).ok()
}

#[cfg(not(target_os = "linux"))]
fn current_cpu() -> Option<usize> {
    None
}

/// Placement decisions for one directory.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Placer {
    placement: Placement,
    topology: &'static Topology,
    bind: bool,
}

impl Placer {
    pub(crate) fn new(placement: Placement, bind: bool) -> Self {
        Self {
            placement,
            topology: topology(),
            bind,
        }
    }

    pub(crate) fn nodes(&self) -> usize {
        match self.placement {
            Placement::Single => 1,
            _ => self.topology.nodes(),
        }
    }

    /// Node for a new bucket covering `prefix` at `local_depth`.
    pub(crate) fn bucket_node(&self, prefix: u64, local_depth: u32) -> u32 {
        match self.placement {
            Placement::Single => 0,
            Placement::Local => self.topology.current_node(),
            Placement::HashRange => {
                let reversed = if local_depth == 0 {
                    0
                } else {
                    prefix.reverse_bits()
                };
                self.topology.node_of_range(reversed)
            }
        }
    }

    /// Node for a record with signature `sig`.
    pub(crate) fn record_node(&self, sig: u64) -> u32 {
        match self.placement {
            Placement::Single => 0,
            Placement::Local => self.topology.current_node(),
            Placement::HashRange => self.topology.node_of_range(sig.reverse_bits()),
        }
    }

    /// Apply the preferred-node policy to `[ptr, ptr + len)` when binding is on.
    pub(crate) fn bind<T>(&self, ptr: *const T, len: usize, node: u32) {
        if self.bind && self.topology.nodes() > 1 {
            bind_region(ptr.cast(), len, node);
        }
    }
}

#[cfg(target_os = "linux")]
const MPOL_PREFERRED: libc::c_long = 1;

/// Ask the kernel to prefer `node` for the pages covering `[ptr, ptr + len)`.
///
/// Best effort: failures are logged and otherwise ignored.
#[cfg(target_os = "linux")]
pub fn bind_region(ptr: *const u8, len: usize, node: u32) -> bool {
    if len == 0 {
        return false;
    }
    let page = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    };
    let base = (ptr as usize) & !(page - 1);
    let end = (ptr as usize).saturating_add(len).next_multiple_of(page);
    let ulong_bits = core::mem::size_of::<libc::c_ulong>() * 8;
    let words = (node as usize / ulong_bits) + 1;
    let mut mask: Vec<libc::c_ulong> = vec![0; words];
    mask[node as usize / ulong_bits] |= 1 << (node as usize % ulong_bits);

    let rc = unsafe {
        libc::syscall(
            libc::SYS_mbind,
            base as *mut libc::c_void,
            end - base,
            MPOL_PREFERRED,
            mask.as_ptr(),
            (words * ulong_bits) as libc::c_ulong,
            0 as libc::c_uint,
        )
    };
    if rc != 0 {
        warn_log!(node, len, "mbind failed");
    }
    rc == 0
}

/// No-op off Linux; always `false`.
#[cfg(not(target_os = "linux"))]
pub fn bind_region(_ptr: *const u8, _len: usize, _node: u32) -> bool {
    false
}
