//! Controller naming, ported from `libcgroups::v1::controller_type`:
//! same enum shape, `Display`/`AsRef<str>` impls, and a flat `CONTROLLERS`
//! slice, extended with the v2 unified pseudo-controller token.

use std::fmt::Display;

#[derive(Hash, PartialEq, Eq, Debug, Clone, Copy)]
pub enum ControllerType {
    Cpu,
    CpuAcct,
    CpuSet,
    Devices,
    HugeTlb,
    Pids,
    PerfEvent,
    Memory,
    Blkio,
    NetworkPriority,
    NetworkClassifier,
    Freezer,
    /// The cgroup v2 unified hierarchy token (`hierarchy-id` 0 in
    /// `/proc/<pid>/cgroup`, used when a controller is only visible
    /// through the single v2 tree).
    Unified,
}

impl Display for ControllerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl AsRef<str> for ControllerType {
    fn as_ref(&self) -> &str {
        match *self {
            Self::Cpu => "cpu",
            Self::CpuAcct => "cpuacct",
            Self::CpuSet => "cpuset",
            Self::Devices => "devices",
            Self::HugeTlb => "hugetlb",
            Self::Pids => "pids",
            Self::PerfEvent => "perf_event",
            Self::Memory => "memory",
            Self::Blkio => "blkio",
            Self::NetworkPriority => "net_prio",
            Self::NetworkClassifier => "net_cls",
            Self::Freezer => "freezer",
            Self::Unified => "",
        }
    }
}

impl ControllerType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "cpu" => Self::Cpu,
            "cpuacct" => Self::CpuAcct,
            "cpuset" => Self::CpuSet,
            "devices" => Self::Devices,
            "hugetlb" => Self::HugeTlb,
            "pids" => Self::Pids,
            "perf_event" => Self::PerfEvent,
            "memory" => Self::Memory,
            "blkio" => Self::Blkio,
            "net_prio" => Self::NetworkPriority,
            "net_cls" => Self::NetworkClassifier,
            "freezer" => Self::Freezer,
            _ => return None,
        })
    }
}

pub const CONTROLLERS: &[ControllerType] = &[
    ControllerType::Cpu,
    ControllerType::CpuAcct,
    ControllerType::CpuSet,
    ControllerType::Devices,
    ControllerType::HugeTlb,
    ControllerType::Memory,
    ControllerType::Pids,
    ControllerType::PerfEvent,
    ControllerType::Blkio,
    ControllerType::NetworkPriority,
    ControllerType::NetworkClassifier,
    ControllerType::Freezer,
];
