//! Derives a [`ConstraintSet`] for a resolved cgroup path (spec §3).
//!
//! Each field degrades to "unlimited/inherit" when its controller file is
//! absent, per the `common::read_cgroup_file` contract this sits on top
//! of: "missing files ⇒ unlimited/inherit" (spec §4.1).

use std::collections::BTreeSet;
use std::path::Path;

use crate::common::read_cgroup_file_opt;
use crate::hierarchy::Version;
use crate::parse::{parse_cpuset, parse_quantity, Quantity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintSet {
    /// Empty means "inherit host": no cpuset restriction was found.
    pub cpuset: BTreeSet<u32>,
    pub cpu_quota_us: Option<u64>,
    pub cpu_period_us: u64,
    pub cpu_shares: u64,
    pub mem_limit_bytes: Option<u64>,
    pub mem_soft_limit_bytes: Option<u64>,
    pub memsw_limit_bytes: Option<u64>,
    pub pids_max: Option<u64>,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        ConstraintSet {
            cpuset: BTreeSet::new(),
            cpu_quota_us: None,
            cpu_period_us: 100_000,
            cpu_shares: 1024,
            mem_limit_bytes: None,
            mem_soft_limit_bytes: None,
            memsw_limit_bytes: None,
            pids_max: None,
        }
    }
}

fn read_quantity(path: &Path) -> Option<u64> {
    match read_cgroup_file_opt(path).ok()? {
        Some(s) => match parse_quantity(&s).ok()? {
            Quantity::Bytes(b) => Some(b),
            Quantity::Unlimited => None,
        },
        None => None,
    }
}

/// Builds the cpuset/cpu/memory/pids view for one resolved controller
/// path. The caller is expected to call this once per controller that is
/// relevant to the synthesizer in play (a `/proc/meminfo` render only
/// needs the memory controller's path, for instance), since `CgroupPath`
/// is per-controller (spec §3: "CgroupPath. A pair (controller, relative
/// path)").
pub struct ConstraintReader<'a> {
    pub cpuset_path: Option<&'a Path>,
    pub cpu_path: Option<&'a Path>,
    pub memory_path: Option<&'a Path>,
    pub pids_path: Option<&'a Path>,
    pub version: Version,
}

impl ConstraintReader<'_> {
    pub fn read(&self) -> ConstraintSet {
        let mut cs = ConstraintSet::default();

        if let Some(p) = self.cpuset_path {
            if let Ok(Some(s)) = read_cgroup_file_opt(p.join("cpuset.cpus")) {
                if let Ok(set) = parse_cpuset(&s) {
                    cs.cpuset = set;
                }
            } else if let Ok(Some(s)) = read_cgroup_file_opt(p.join("cpus")) {
                // cgroup v1 cpuset controller file is just "cpuset.cpus"
                // at the subsystem root too; some hosts mount it bare.
                if let Ok(set) = parse_cpuset(&s) {
                    cs.cpuset = set;
                }
            }
        }

        if let Some(p) = self.cpu_path {
            match self.version {
                Version::V2 => {
                    if let Ok(Some(s)) = read_cgroup_file_opt(p.join("cpu.max")) {
                        let mut parts = s.split_whitespace();
                        if let Some(quota) = parts.next() {
                            cs.cpu_quota_us = parse_quantity(quota).ok().and_then(|q| match q {
                                Quantity::Bytes(b) => Some(b),
                                Quantity::Unlimited => None,
                            });
                        }
                        if let Some(period) = parts.next() {
                            if let Ok(p) = period.parse() {
                                cs.cpu_period_us = p;
                            }
                        }
                    }
                    if let Some(w) = read_quantity(&p.join("cpu.weight")) {
                        cs.cpu_shares = w;
                    }
                }
                Version::V1 => {
                    if let Some(q) = read_quantity(&p.join("cpu.cfs_quota_us")) {
                        cs.cpu_quota_us = Some(q);
                    }
                    if let Some(period) = read_quantity(&p.join("cpu.cfs_period_us")) {
                        cs.cpu_period_us = period;
                    }
                    if let Some(shares) = read_quantity(&p.join("cpu.shares")) {
                        cs.cpu_shares = shares;
                    }
                }
            }
        }

        if let Some(p) = self.memory_path {
            let (limit_file, soft_file, swap_file) = match self.version {
                Version::V2 => ("memory.max", "memory.high", "memory.swap.max"),
                Version::V1 => (
                    "memory.limit_in_bytes",
                    "memory.soft_limit_in_bytes",
                    "memory.memsw.limit_in_bytes",
                ),
            };
            cs.mem_limit_bytes = read_quantity(&p.join(limit_file));
            cs.mem_soft_limit_bytes = read_quantity(&p.join(soft_file));
            cs.memsw_limit_bytes = read_quantity(&p.join(swap_file));
        }

        if let Some(p) = self.pids_path {
            cs.pids_max = read_quantity(&p.join("pids.max"));
        }

        cs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test::{create_temp_dir, set_fixture};

    #[test]
    fn test_missing_controller_yields_unlimited() {
        let tmp = create_temp_dir("constraints_missing").unwrap();
        let reader = ConstraintReader {
            cpuset_path: None,
            cpu_path: None,
            memory_path: Some(&tmp),
            pids_path: None,
            version: Version::V2,
        };
        let cs = reader.read();
        assert_eq!(cs.mem_limit_bytes, None);
    }

    #[test]
    fn test_v2_cpu_max_parses_quota_and_period() {
        let tmp = create_temp_dir("constraints_v2_cpu").unwrap();
        set_fixture(&tmp, "cpu.max", "50000 100000").unwrap();
        let reader = ConstraintReader {
            cpuset_path: None,
            cpu_path: Some(&tmp),
            memory_path: None,
            pids_path: None,
            version: Version::V2,
        };
        let cs = reader.read();
        assert_eq!(cs.cpu_quota_us, Some(50000));
        assert_eq!(cs.cpu_period_us, 100000);
    }

    #[test]
    fn test_v2_cpu_max_unlimited_quota() {
        let tmp = create_temp_dir("constraints_v2_cpu_max").unwrap();
        set_fixture(&tmp, "cpu.max", "max 100000").unwrap();
        let reader = ConstraintReader {
            cpuset_path: None,
            cpu_path: Some(&tmp),
            memory_path: None,
            pids_path: None,
            version: Version::V2,
        };
        let cs = reader.read();
        assert_eq!(cs.cpu_quota_us, None);
    }

    #[test]
    fn test_memory_limit_bytes() {
        let tmp = create_temp_dir("constraints_mem").unwrap();
        set_fixture(&tmp, "memory.max", "1073741824").unwrap();
        let reader = ConstraintReader {
            cpuset_path: None,
            cpu_path: None,
            memory_path: Some(&tmp),
            pids_path: None,
            version: Version::V2,
        };
        let cs = reader.read();
        assert_eq!(cs.mem_limit_bytes, Some(1073741824));
    }

    #[test]
    fn test_cpuset_parsed() {
        let tmp = create_temp_dir("constraints_cpuset").unwrap();
        set_fixture(&tmp, "cpuset.cpus", "2,5").unwrap();
        let reader = ConstraintReader {
            cpuset_path: Some(&tmp),
            cpu_path: None,
            memory_path: None,
            pids_path: None,
            version: Version::V2,
        };
        let cs = reader.read();
        assert_eq!(cs.cpuset, BTreeSet::from([2, 5]));
    }
}
