//! Proc-view synthesizers (C4): one pure `render` function per
//! virtualized file (spec §3 "ProcView"). Each module operates over
//! already-read host content plus this cgroup's [`ConstraintSet`] and,
//! for `/proc/stat`, the [`crate::accounting::CpuAccountingCache`] — none
//! of these modules perform their own host `/proc` reads, so they are
//! trivially unit-testable against fixture strings.

pub mod cpu_online;
pub mod cpuinfo;
pub mod diskstats;
pub mod loadavg;
pub mod meminfo;
pub mod stat;
pub mod swaps;
pub mod uptime;
