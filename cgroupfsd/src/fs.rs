//! The `fuser::Filesystem` dispatch glue (C7): the only place that talks
//! both to `fuser` and to `libcgroupfs`/`cgroupfs-tree`. Lays out the
//! mountpoint the way `lxcfs` does — a `proc/` directory of virtualized
//! files plus a `sys/` tree carrying `devices/system/cpu/online` and the
//! cgroup-fuse tree under `sys/fs/cgroup/<controller>` — so a caller
//! bind-mounts subpaths of one mount into a container's `/proc` and
//! `/sys/fs/cgroup` (spec §6).

use std::collections::{BTreeSet, HashMap};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request,
};
use libc::ENOENT;
use log::warn;

use libcgroupfs::hierarchy::controller_type::ControllerType;
use libcgroupfs::hierarchy::{self, Hierarchy};
use libcgroupfs::procview;
use libcgroupfs::{CoreError, CpuAccountingCache};

use crate::config::Config;

const TTL: Duration = Duration::from_secs(1);

const ROOT_INO: u64 = 1;
const PROC_INO: u64 = 2;
const SYS_INO: u64 = 3;
const CPUINFO_INO: u64 = 4;
const MEMINFO_INO: u64 = 5;
const STAT_INO: u64 = 6;
const LOADAVG_INO: u64 = 7;
const UPTIME_INO: u64 = 8;
const SWAPS_INO: u64 = 9;
const DISKSTATS_INO: u64 = 10;
const SYS_DEVICES_INO: u64 = 11;
const SYS_DEVICES_SYSTEM_INO: u64 = 12;
const SYS_DEVICES_SYSTEM_CPU_INO: u64 = 13;
const CPU_ONLINE_INO: u64 = 14;
const SYS_FS_INO: u64 = 15;
const SYS_FS_CGROUP_INO: u64 = 16;
const FIRST_DYNAMIC_INO: u64 = 1000;

/// A node the filesystem can answer `getattr`/`lookup`/`readdir` for.
#[derive(Debug, Clone)]
enum Node {
    Dir { parent: u64, name: &'static str },
    ProcFile { parent: u64, name: &'static str, kind: ProcFileKind },
    /// A real path in the host cgroup tree (C5), visibility-checked
    /// against the reader's own cgroup on every access.
    CgroupEntry {
        controller: ControllerType,
        absolute: PathBuf,
        is_dir: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcFileKind {
    CpuInfo,
    MemInfo,
    Stat,
    LoadAvg,
    Uptime,
    Swaps,
    DiskStats,
    CpuOnline,
}

struct Inodes {
    nodes: HashMap<u64, Node>,
    by_parent_name: HashMap<(u64, String), u64>,
    next_ino: u64,
}

impl Inodes {
    fn bootstrap() -> Self {
        let mut nodes = HashMap::new();
        let mut by_parent_name = HashMap::new();

        let statics: &[(u64, Node)] = &[
            (PROC_INO, Node::Dir { parent: ROOT_INO, name: "proc" }),
            (SYS_INO, Node::Dir { parent: ROOT_INO, name: "sys" }),
            (CPUINFO_INO, Node::ProcFile { parent: PROC_INO, name: "cpuinfo", kind: ProcFileKind::CpuInfo }),
            (MEMINFO_INO, Node::ProcFile { parent: PROC_INO, name: "meminfo", kind: ProcFileKind::MemInfo }),
            (STAT_INO, Node::ProcFile { parent: PROC_INO, name: "stat", kind: ProcFileKind::Stat }),
            (LOADAVG_INO, Node::ProcFile { parent: PROC_INO, name: "loadavg", kind: ProcFileKind::LoadAvg }),
            (UPTIME_INO, Node::ProcFile { parent: PROC_INO, name: "uptime", kind: ProcFileKind::Uptime }),
            (SWAPS_INO, Node::ProcFile { parent: PROC_INO, name: "swaps", kind: ProcFileKind::Swaps }),
            (DISKSTATS_INO, Node::ProcFile { parent: PROC_INO, name: "diskstats", kind: ProcFileKind::DiskStats }),
            (SYS_DEVICES_INO, Node::Dir { parent: SYS_INO, name: "devices" }),
            (SYS_DEVICES_SYSTEM_INO, Node::Dir { parent: SYS_DEVICES_INO, name: "system" }),
            (SYS_DEVICES_SYSTEM_CPU_INO, Node::Dir { parent: SYS_DEVICES_SYSTEM_INO, name: "cpu" }),
            (CPU_ONLINE_INO, Node::ProcFile { parent: SYS_DEVICES_SYSTEM_CPU_INO, name: "online", kind: ProcFileKind::CpuOnline }),
            (SYS_FS_INO, Node::Dir { parent: SYS_INO, name: "fs" }),
            (SYS_FS_CGROUP_INO, Node::Dir { parent: SYS_FS_INO, name: "cgroup" }),
        ];

        for (ino, node) in statics {
            if let Node::Dir { parent, name } | Node::ProcFile { parent, name, .. } = node {
                by_parent_name.insert((*parent, name.to_string()), *ino);
            }
            nodes.insert(*ino, node.clone());
        }

        Inodes { nodes, by_parent_name, next_ino: FIRST_DYNAMIC_INO }
    }

    fn lookup_child(&mut self, parent: u64, name: &str, make: impl FnOnce() -> Node) -> u64 {
        if let Some(ino) = self.by_parent_name.get(&(parent, name.to_string())) {
            return *ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.by_parent_name.insert((parent, name.to_string()), ino);
        self.nodes.insert(ino, make());
        ino
    }
}

pub struct CgroupFs {
    hierarchy: Arc<Hierarchy>,
    accounting: Arc<CpuAccountingCache>,
    config: Config,
    inodes: Mutex<Inodes>,
    loadavgs: Mutex<HashMap<PathBuf, (procview::loadavg::LoadAvg, SystemTime)>>,
}

impl CgroupFs {
    pub fn new(hierarchy: Arc<Hierarchy>, accounting: Arc<CpuAccountingCache>, config: Config) -> Self {
        CgroupFs {
            hierarchy,
            accounting,
            config,
            inodes: Mutex::new(Inodes::bootstrap()),
            loadavgs: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_for(&self, pid: i32, controller: ControllerType) -> Result<hierarchy::CgroupPath, CoreError> {
        let snapshot = self.hierarchy.snapshot();
        hierarchy::resolve(&snapshot, pid, controller)
    }

    /// Resolves and canonicalizes the *requesting* PID's own cgroup root
    /// for `controller` — the visibility boundary every `cgroupfs-tree`
    /// call must be checked against (spec §4.5), as opposed to whatever
    /// target path a node happens to carry.
    fn caller_cgroup_root(&self, pid: i32, controller: ControllerType) -> Result<PathBuf, CoreError> {
        let cgroup = self.resolve_for(pid, controller)?;
        canonicalize_path(&cgroup.absolute)
    }

    fn dir_attr(&self, ino: u64) -> FileAttr {
        fixed_attr(ino, FileType::Directory, 0o555, 0)
    }

    fn file_attr(&self, ino: u64) -> FileAttr {
        fixed_attr(ino, FileType::RegularFile, 0o444, 0)
    }

    fn render_proc_file(&self, kind: ProcFileKind, pid: i32) -> Result<String, CoreError> {
        match kind {
            ProcFileKind::CpuOnline => {
                let cpuset = self.resolve_cpuset(pid)?;
                Ok(procview::cpu_online::render(&cpuset, &host_online()?))
            }
            ProcFileKind::CpuInfo => {
                let cpuset = self.resolve_cpuset(pid)?;
                let host = read_host("/proc/cpuinfo")?;
                Ok(procview::cpuinfo::render(&host, &cpuset, &host_online()?))
            }
            ProcFileKind::Stat => {
                let cgroup = self.resolve_for(pid, ControllerType::Cpu)?;
                let cpuset = self.resolve_cpuset(pid)?;
                let online = host_online()?;
                let ids: Vec<u32> = cpuset.intersection(&online).copied().collect();
                let host = read_host("/proc/stat")?;
                Ok(procview::stat::render(&host, &self.accounting, &cgroup.absolute, &ids))
            }
            ProcFileKind::MemInfo => {
                let cgroup = self.resolve_for(pid, ControllerType::Memory)?;
                let cs = self.read_memory_constraints(&cgroup)?;
                let usage = read_memory_usage(&cgroup)?;
                let cache = read_memory_cache_bytes(&cgroup);
                let (swap_total, swap_used) = read_memory_swap_constraints(&cgroup);
                let host = read_host("/proc/meminfo")?;
                Ok(procview::meminfo::render(&host, cs, usage, cache, swap_total, swap_used))
            }
            ProcFileKind::Uptime => {
                let cgroup = self.resolve_for(pid, ControllerType::Pids)?;
                let pids = list_cgroup_pids(&cgroup.absolute);
                let now = wall_now_secs();
                let earliest = earliest_start_secs(&pids);
                let cpuset = self.resolve_cpuset(pid)?;
                let online = host_online()?;
                let virt = cpuset.intersection(&online).count() as u32;
                Ok(procview::uptime::render(now, earliest, virt))
            }
            ProcFileKind::LoadAvg => {
                if !self.config.cgroup_loadavg {
                    return Ok(procview::loadavg::render_passthrough(&read_host("/proc/loadavg")?));
                }
                let cgroup = self.resolve_for(pid, ControllerType::Pids)?;
                let pids = list_cgroup_pids(&cgroup.absolute);
                let (running, total) = count_runnable(&pids);
                let rendered = self.sample_loadavg(&cgroup.absolute, running as f64, running, total, pids.last().copied().unwrap_or(0) as u32);
                Ok(rendered)
            }
            ProcFileKind::Swaps => {
                let cgroup = self.resolve_for(pid, ControllerType::Memory)?;
                let used = read_quantity_file(&cgroup.absolute.join("memory.swap.current"));
                Ok(procview::swaps::render(&read_host("/proc/swaps")?, used))
            }
            ProcFileKind::DiskStats => {
                let host = read_host("/proc/diskstats")?;
                let cgroup = self.resolve_for(pid, ControllerType::Blkio);
                let map = match cgroup {
                    Ok(cg) => blkio_weighted_io(&host, &cg.absolute),
                    Err(_) => HashMap::new(),
                };
                Ok(procview::diskstats::render(&host, &map))
            }
        }
    }

    fn resolve_cpuset(&self, pid: i32) -> Result<BTreeSet<u32>, CoreError> {
        let cgroup = self.resolve_for(pid, ControllerType::CpuSet)?;
        let raw = libcgroupfs::common::read_cgroup_file_opt(cgroup.absolute.join("cpuset.cpus"))
            .map_err(CoreError::from)?
            .or(libcgroupfs::common::read_cgroup_file_opt(cgroup.absolute.join("cpus")).map_err(CoreError::from)?)
            .unwrap_or_default();
        libcgroupfs::parse::parse_cpuset(&raw).map_err(|e| CoreError::Invalid(cgroup.absolute, e.to_string()))
    }

    fn read_memory_constraints(&self, cgroup: &hierarchy::CgroupPath) -> Result<Option<u64>, CoreError> {
        let limit_file = match cgroup.version {
            hierarchy::Version::V2 => "memory.max",
            hierarchy::Version::V1 => "memory.limit_in_bytes",
        };
        Ok(read_quantity_file(&cgroup.absolute.join(limit_file)))
    }

    fn sample_loadavg(&self, key: &Path, runnable: f64, running: u32, total: u32, last_pid: u32) -> String {
        let mut map = self.loadavgs.lock().expect("loadavg mutex poisoned");
        let interval = Duration::from_secs(procview::loadavg::LoadAvg::sample_interval_secs());
        let entry = map
            .entry(key.to_path_buf())
            .or_insert_with(|| (procview::loadavg::LoadAvg::default(), UNIX_EPOCH));
        let now = SystemTime::now();
        if now.duration_since(entry.1).unwrap_or(Duration::ZERO) >= interval {
            entry.0.sample(runnable);
            entry.1 = now;
        }
        entry.0.render(running, total, last_pid)
    }
}

fn fixed_attr(ino: u64, kind: FileType, perm: u16, size: u64) -> FileAttr {
    let now = SystemTime::now();
    FileAttr {
        ino,
        size,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind,
        perm,
        nlink: if kind == FileType::Directory { 2 } else { 1 },
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

fn read_host(path: &str) -> Result<String, CoreError> {
    std::fs::read_to_string(path).map_err(|_| CoreError::NotFound(PathBuf::from(path)))
}

fn host_online() -> Result<BTreeSet<u32>, CoreError> {
    let raw = read_host("/sys/devices/system/cpu/online")?;
    libcgroupfs::parse::parse_cpuset(&raw).map_err(|e| CoreError::Invalid(PathBuf::from("online"), e.to_string()))
}

fn read_quantity_file(path: &Path) -> Option<u64> {
    let s = std::fs::read_to_string(path).ok()?;
    match libcgroupfs::parse::parse_quantity(s.trim()).ok()? {
        libcgroupfs::parse::Quantity::Bytes(b) => Some(b),
        libcgroupfs::parse::Quantity::Unlimited => None,
    }
}

fn read_memory_usage(cgroup: &hierarchy::CgroupPath) -> Result<u64, CoreError> {
    let file = match cgroup.version {
        hierarchy::Version::V2 => "memory.current",
        hierarchy::Version::V1 => "memory.usage_in_bytes",
    };
    Ok(read_quantity_file(&cgroup.absolute.join(file)).unwrap_or(0))
}

/// Single key out of `memory.stat` (same key=value-per-line shape on
/// both versions), in bytes.
fn read_memory_stat_key(cgroup: &hierarchy::CgroupPath, key: &str) -> Option<u64> {
    let content = std::fs::read_to_string(cgroup.absolute.join("memory.stat")).ok()?;
    content.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        if parts.next()? == key {
            parts.next()?.parse().ok()
        } else {
            None
        }
    })
}

/// Page-cache size for the `Cached` rewrite (spec §4.4): `memory.stat`
/// calls it `cache` on v1, `file` on v2.
fn read_memory_cache_bytes(cgroup: &hierarchy::CgroupPath) -> Option<u64> {
    let key = match cgroup.version {
        hierarchy::Version::V2 => "file",
        hierarchy::Version::V1 => "cache",
    };
    read_memory_stat_key(cgroup, key)
}

/// `SwapTotal`/`SwapFree` inputs. Only v2 has a swap-only counter
/// (`memory.swap.current`); v1's `memory.memsw.usage_in_bytes` is
/// mem+swap combined and can't be split back apart, so v1 degrades to
/// the host's own swap line (same rule as `diskstats`/`swaps`).
fn read_memory_swap_constraints(cgroup: &hierarchy::CgroupPath) -> (Option<u64>, Option<u64>) {
    if cgroup.version != hierarchy::Version::V2 {
        return (None, None);
    }
    let total = read_quantity_file(&cgroup.absolute.join("memory.swap.max"));
    let used = read_quantity_file(&cgroup.absolute.join("memory.swap.current"));
    (total, used)
}

/// Canonicalizes a path before it crosses into `cgroupfs-tree`'s
/// visibility check (spec §4.5): resolves `..` components and symlinks
/// so a crafted lookup name can't walk a reader out of its own cgroup.
fn canonicalize_path(path: &Path) -> Result<PathBuf, CoreError> {
    std::fs::canonicalize(path).map_err(|_| CoreError::NotFound(path.to_path_buf()))
}

/// `cgroup.procs` (v2) or `tasks` (v1) carry the same newline-separated
/// pid list shape; either file name is tried.
fn list_cgroup_pids(cgroup_dir: &Path) -> Vec<i32> {
    for name in ["cgroup.procs", "tasks"] {
        if let Ok(content) = std::fs::read_to_string(cgroup_dir.join(name)) {
            return content.lines().filter_map(|l| l.trim().parse().ok()).collect();
        }
    }
    Vec::new()
}

/// Reads `/proc/<pid>/stat`'s state (field 3) and start time in clock
/// ticks (field 22), tolerating the process having exited mid-read.
fn read_pid_state_and_start(pid: i32) -> Option<(char, u64)> {
    let content = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // comm can contain spaces/parens; the state field starts right after
    // the last ')'.
    let after_comm = content.rsplit_once(')')?.1;
    let mut fields = after_comm.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let starttime: u64 = fields.nth(18)?.parse().ok()?;
    Some((state, starttime))
}

const CLK_TCK: u64 = 100;

fn earliest_start_secs(pids: &[i32]) -> Option<f64> {
    let boot_secs = host_boot_secs().ok()?;
    pids.iter()
        .filter_map(|&pid| read_pid_state_and_start(pid))
        .map(|(_, start_ticks)| boot_secs + (start_ticks as f64 / CLK_TCK as f64))
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
}

fn host_boot_secs() -> Result<f64, CoreError> {
    let stat = read_host("/proc/stat")?;
    for line in stat.lines() {
        if let Some(rest) = line.strip_prefix("btime ") {
            if let Ok(secs) = rest.trim().parse::<u64>() {
                return Ok(secs as f64);
            }
        }
    }
    Err(CoreError::Invalid(PathBuf::from("/proc/stat"), "missing btime".into()))
}

fn wall_now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

fn count_runnable(pids: &[i32]) -> (u32, u32) {
    let mut running = 0;
    for &pid in pids {
        if let Some((state, _)) = read_pid_state_and_start(pid) {
            if state == 'R' || state == 'D' {
                running += 1;
            }
        }
    }
    (running, pids.len() as u32)
}

/// Maps device name (as it appears in `/proc/diskstats`) to this
/// cgroup's own io-service-bytes count, read from `io.stat` (v2) or
/// `blkio.throttle.io_service_bytes` (v1); devices with no recorded
/// activity are left out of the map, which is the `render` degradation
/// signal for "pass this line through unchanged".
fn blkio_weighted_io(host_diskstats: &str, blkio_dir: &Path) -> HashMap<String, u64> {
    let mut dev_names: HashMap<(u32, u32), String> = HashMap::new();
    for line in host_diskstats.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        if let (Ok(maj), Ok(min)) = (fields[0].parse(), fields[1].parse()) {
            dev_names.insert((maj, min), fields[2].to_string());
        }
    }

    let mut out = HashMap::new();
    if let Ok(content) = std::fs::read_to_string(blkio_dir.join("io.stat")) {
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let Some(devno) = parts.next() else { continue };
            let Some((maj, min)) = devno.split_once(':') else { continue };
            let (Ok(maj), Ok(min)) = (maj.parse(), min.parse()) else { continue };
            let Some(name) = dev_names.get(&(maj, min)) else { continue };
            let total: u64 = parts
                .filter_map(|kv| kv.split_once('='))
                .filter(|(k, _)| *k == "rbytes" || *k == "wbytes")
                .filter_map(|(_, v)| v.parse::<u64>().ok())
                .sum();
            out.insert(name.clone(), total);
        }
    } else if let Ok(content) = std::fs::read_to_string(blkio_dir.join("blkio.throttle.io_service_bytes")) {
        for line in content.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 || fields[1] != "Total" {
                continue;
            }
            let Some((maj, min)) = fields[0].split_once(':') else { continue };
            let (Ok(maj), Ok(min)) = (maj.parse(), min.parse()) else { continue };
            if let (Some(name), Ok(bytes)) = (dev_names.get(&(maj, min)), fields[2].parse::<u64>()) {
                out.insert(name.clone(), bytes);
            }
        }
    }
    out
}

impl Filesystem for CgroupFs {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(ENOENT);
            return;
        };

        let parent_node = {
            let inodes = self.inodes.lock().expect("inode table poisoned");
            inodes.nodes.get(&parent).cloned()
        };

        match parent_node {
            Some(Node::Dir { .. }) if parent == SYS_FS_CGROUP_INO => {
                let Some(controller) = ControllerType::from_name(name) else {
                    reply.error(ENOENT);
                    return;
                };
                let pid = req.pid() as i32;
                match self.resolve_for(pid, controller) {
                    Ok(cgroup) => {
                        let ino = self.inodes.lock().expect("inode table poisoned").lookup_child(
                            parent,
                            name,
                            || Node::CgroupEntry { controller, absolute: cgroup.absolute.clone(), is_dir: true },
                        );
                        reply.entry(&TTL, &self.dir_attr(ino), 0);
                    }
                    Err(e) => reply.error(e.to_errno()),
                }
            }
            Some(Node::CgroupEntry { controller, absolute, .. }) => {
                let pid = req.pid() as i32;
                let caller_root = match self.caller_cgroup_root(pid, controller) {
                    Ok(r) => r,
                    Err(e) => {
                        reply.error(e.to_errno());
                        return;
                    }
                };
                let child = match canonicalize_path(&absolute.join(name)) {
                    Ok(c) => c,
                    Err(e) => {
                        reply.error(e.to_errno());
                        return;
                    }
                };
                let is_dir = child.is_dir();
                let attr = match cgroupfs_tree::getattr(&caller_root, &child, None) {
                    Ok(a) => tree_attr_to_fuse(self.alloc_child_ino(parent, name, controller, &child, is_dir), &a),
                    Err(e) => {
                        reply.error(e.to_errno());
                        return;
                    }
                };
                reply.entry(&TTL, &attr, 0);
            }
            Some(_) => {
                let ino = self.inodes.lock().expect("inode table poisoned").by_parent_name.get(&(parent, name.to_string())).copied();
                match ino {
                    Some(ino) => {
                        let is_dir = matches!(self.inodes.lock().unwrap().nodes.get(&ino), Some(Node::Dir { .. }));
                        if is_dir {
                            reply.entry(&TTL, &self.dir_attr(ino), 0);
                        } else {
                            reply.entry(&TTL, &self.file_attr(ino), 0);
                        }
                    }
                    None => reply.error(ENOENT),
                }
            }
            None => reply.error(ENOENT),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        if ino == ROOT_INO {
            reply.attr(&TTL, &self.dir_attr(ROOT_INO));
            return;
        }
        let node = self.inodes.lock().expect("inode table poisoned").nodes.get(&ino).cloned();
        match node {
            Some(Node::Dir { .. }) => reply.attr(&TTL, &self.dir_attr(ino)),
            Some(Node::ProcFile { .. }) => reply.attr(&TTL, &self.file_attr(ino)),
            Some(Node::CgroupEntry { controller, absolute, .. }) => {
                let pid = req.pid() as i32;
                let result = self
                    .caller_cgroup_root(pid, controller)
                    .and_then(|root| canonicalize_path(&absolute).and_then(|target| cgroupfs_tree::getattr(&root, &target, None)));
                match result {
                    Ok(a) => reply.attr(&TTL, &tree_attr_to_fuse(ino, &a)),
                    Err(e) => reply.error(e.to_errno()),
                }
            }
            None => reply.error(ENOENT),
        }
    }

    fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, fuser::consts::FOPEN_DIRECT_IO as u32);
    }

    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let node = self.inodes.lock().expect("inode table poisoned").nodes.get(&ino).cloned();
        match node {
            Some(Node::ProcFile { kind, .. }) => match self.render_proc_file(kind, req.pid() as i32) {
                Ok(content) => reply_sliced(reply, content.as_bytes(), offset, size),
                Err(e) => {
                    warn!("rendering proc view failed: {e}");
                    reply.error(e.to_errno());
                }
            },
            Some(Node::CgroupEntry { controller, absolute, .. }) => {
                let pid = req.pid() as i32;
                let result = self.caller_cgroup_root(pid, controller).and_then(|root| {
                    canonicalize_path(&absolute)
                        .and_then(|target| cgroupfs_tree::read(&root, &target, offset.max(0) as u64, size))
                });
                match result {
                    Ok(bytes) => reply.data(&bytes),
                    Err(e) => reply.error(e.to_errno()),
                }
            }
            _ => reply.error(ENOENT),
        }
    }

    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let node = self.inodes.lock().expect("inode table poisoned").nodes.get(&ino).cloned();
        match node {
            Some(Node::CgroupEntry { controller, absolute, .. }) => {
                let pid = req.pid() as i32;
                let result = self.caller_cgroup_root(pid, controller).and_then(|root| {
                    canonicalize_path(&absolute).and_then(|target| cgroupfs_tree::write(&root, &target, req.uid(), data))
                });
                match result {
                    Ok(n) => reply.written(n as u32),
                    Err(e) => reply.error(e.to_errno()),
                }
            }
            _ => reply.error(ENOENT),
        }
    }

    fn readdir(&mut self, req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let entries = self.static_dir_entries(ino, req.pid() as i32);
        let entries = match entries {
            Some(e) => e,
            None => {
                let node = self.inodes.lock().expect("inode table poisoned").nodes.get(&ino).cloned();
                match node {
                    Some(Node::CgroupEntry { controller, absolute, .. }) => {
                        let pid = req.pid() as i32;
                        let result = self.caller_cgroup_root(pid, controller).and_then(|root| {
                            canonicalize_path(&absolute).and_then(|target| cgroupfs_tree::readdir(&root, &target))
                        });
                        match result {
                            Ok(entries) => entries
                                .into_iter()
                                .map(|e| {
                                    let kind = if e.kind == cgroupfs_tree::FileKind::Directory {
                                        FileType::Directory
                                    } else {
                                        FileType::RegularFile
                                    };
                                    (0u64, kind, e.name)
                                })
                                .collect(),
                            Err(e) => {
                                reply.error(e.to_errno());
                                return;
                            }
                        }
                    }
                    _ => {
                        reply.error(ENOENT);
                        return;
                    }
                }
            }
        };

        for (i, (child_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(if child_ino == 0 { ino.wrapping_add(i as u64 + 1) } else { child_ino }, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }
}

impl CgroupFs {
    fn alloc_child_ino(&self, parent: u64, name: &str, controller: ControllerType, absolute: &Path, is_dir: bool) -> u64 {
        self.inodes.lock().expect("inode table poisoned").lookup_child(parent, name, || Node::CgroupEntry {
            controller,
            absolute: absolute.to_path_buf(),
            is_dir,
        })
    }

    /// Entries for the handful of fixed directories; `None` for anything
    /// dynamic (cgroup-tree directories), signaling the caller to fall
    /// through to the backing-directory listing.
    fn static_dir_entries(&self, ino: u64, pid: i32) -> Option<Vec<(u64, FileType, String)>> {
        let listing: &[(u64, &str)] = match ino {
            ROOT_INO => &[(PROC_INO, "proc"), (SYS_INO, "sys")],
            PROC_INO => &[
                (CPUINFO_INO, "cpuinfo"),
                (MEMINFO_INO, "meminfo"),
                (STAT_INO, "stat"),
                (LOADAVG_INO, "loadavg"),
                (UPTIME_INO, "uptime"),
                (SWAPS_INO, "swaps"),
                (DISKSTATS_INO, "diskstats"),
            ],
            SYS_INO => &[(SYS_DEVICES_INO, "devices"), (SYS_FS_INO, "fs")],
            SYS_DEVICES_INO => &[(SYS_DEVICES_SYSTEM_INO, "system")],
            SYS_DEVICES_SYSTEM_INO => &[(SYS_DEVICES_SYSTEM_CPU_INO, "cpu")],
            SYS_DEVICES_SYSTEM_CPU_INO => &[(CPU_ONLINE_INO, "online")],
            SYS_FS_INO => &[(SYS_FS_CGROUP_INO, "cgroup")],
            SYS_FS_CGROUP_INO => {
                let snapshot = self.hierarchy.snapshot();
                return Some(
                    snapshot
                        .controllers()
                        .filter(|c| hierarchy::resolve(&snapshot, pid, c.name).is_ok())
                        .map(|c| (0u64, FileType::Directory, c.name.as_ref().to_string()))
                        .collect(),
                );
            }
            _ => return None,
        };
        Some(
            listing
                .iter()
                .map(|(child_ino, name)| {
                    let kind = if *child_ino == CPUINFO_INO
                        || *child_ino == MEMINFO_INO
                        || *child_ino == STAT_INO
                        || *child_ino == LOADAVG_INO
                        || *child_ino == UPTIME_INO
                        || *child_ino == SWAPS_INO
                        || *child_ino == DISKSTATS_INO
                        || *child_ino == CPU_ONLINE_INO
                    {
                        FileType::RegularFile
                    } else {
                        FileType::Directory
                    };
                    (*child_ino, kind, name.to_string())
                })
                .collect(),
        )
    }
}

fn reply_sliced(reply: ReplyData, content: &[u8], offset: i64, size: u32) {
    let start = (offset.max(0) as usize).min(content.len());
    let end = start.saturating_add(size as usize).min(content.len());
    reply.data(&content[start..end]);
}

fn tree_attr_to_fuse(ino: u64, a: &cgroupfs_tree::Attr) -> FileAttr {
    FileAttr {
        ino,
        size: a.size,
        blocks: (a.size + 511) / 512,
        atime: a.mtime,
        mtime: a.mtime,
        ctime: a.mtime,
        crtime: a.mtime,
        kind: if a.kind == cgroupfs_tree::FileKind::Directory {
            FileType::Directory
        } else {
            FileType::RegularFile
        },
        perm: (a.mode & 0o7777) as u16,
        nlink: 1,
        uid: a.uid,
        gid: a.gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}
