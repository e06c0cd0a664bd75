//! Renders `/proc/stat` (spec §4.4): an aggregate `cpu` line summing the
//! virtual CPUs, one line per virtual CPU sourced from [`CpuAccountingCache`],
//! and every other host line passed through verbatim.
//!
//! The passthrough set is table-driven (`PASSTHROUGH_PREFIXES`), a
//! supplemented feature over the original distillation so kernels that
//! add a new `/proc/stat` line don't silently drop it.

use crate::accounting::{CpuAccountingCache, HostCpuRow, TrackedTicks};

const PASSTHROUGH_PREFIXES: &[&str] = &[
    "intr", "ctxt", "btime", "processes", "procs_running", "procs_blocked", "softirq",
];

/// Parses host `/proc/stat` into per-CPU rows (indexed by host CPU id,
/// taken from the `cpuN` line label) plus the passthrough lines kept
/// verbatim in file order.
pub fn parse_host_stat(content: &str) -> (Vec<HostCpuRow>, Vec<String>) {
    let mut rows: Vec<HostCpuRow> = Vec::new();
    let mut passthrough = Vec::new();

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else { continue };

        if label == "cpu" {
            continue; // aggregate line is synthesized, not copied
        }

        if let Some(idx_str) = label.strip_prefix("cpu") {
            if let Ok(idx) = idx_str.parse::<usize>() {
                let nums: Vec<u64> = fields.filter_map(|f| f.parse().ok()).collect();
                let row = HostCpuRow {
                    tracked: TrackedTicks {
                        user: nums.first().copied().unwrap_or(0),
                        system: nums.get(2).copied().unwrap_or(0),
                        idle: nums.get(3).copied().unwrap_or(0),
                        iowait: nums.get(4).copied().unwrap_or(0),
                    },
                    nice: nums.get(1).copied().unwrap_or(0),
                    irq: nums.get(5).copied().unwrap_or(0),
                    softirq: nums.get(6).copied().unwrap_or(0),
                    steal: nums.get(7).copied().unwrap_or(0),
                    guest: nums.get(8).copied().unwrap_or(0),
                    guest_nice: nums.get(9).copied().unwrap_or(0),
                };
                if rows.len() <= idx {
                    rows.resize(idx + 1, HostCpuRow::default());
                }
                rows[idx] = row;
                continue;
            }
        }

        if PASSTHROUGH_PREFIXES.iter().any(|p| *p == label) {
            passthrough.push(line.to_string());
        }
    }

    (rows, passthrough)
}

fn format_row(label: &str, row: &HostCpuRow) -> String {
    format!(
        "{} {} {} {} {} {} {} {} {} {} {}",
        label,
        row.tracked.user,
        row.nice,
        row.tracked.system,
        row.tracked.idle,
        row.tracked.iowait,
        row.irq,
        row.softirq,
        row.steal,
        row.guest,
        row.guest_nice,
    )
}

fn sum_rows(rows: &[HostCpuRow]) -> HostCpuRow {
    let mut total = HostCpuRow::default();
    for r in rows {
        total.tracked.user += r.tracked.user;
        total.tracked.system += r.tracked.system;
        total.tracked.idle += r.tracked.idle;
        total.tracked.iowait += r.tracked.iowait;
        total.nice += r.nice;
        total.irq += r.irq;
        total.softirq += r.softirq;
        total.steal += r.steal;
        total.guest += r.guest;
        total.guest_nice += r.guest_nice;
    }
    total
}

/// `cgroup_path` keys the accounting cache; `ordered_host_ids` is the
/// cpuset∩online intersection in ascending order (virtual CPU `i` is
/// backed by `ordered_host_ids[i]`).
pub fn render(
    host_stat: &str,
    cache: &CpuAccountingCache,
    cgroup_path: &std::path::Path,
    ordered_host_ids: &[u32],
) -> String {
    let (host_rows, passthrough) = parse_host_stat(host_stat);
    let virt_rows = cache.sample(cgroup_path, ordered_host_ids, &host_rows);

    let mut out = String::new();
    // The host kernel prints the aggregate label followed by two spaces
    // before the first field; per-cpu lines get a single space.
    out.push_str(&format_row("cpu ", &sum_rows(&virt_rows)));
    out.push('\n');

    for (i, row) in virt_rows.iter().enumerate() {
        out.push_str(&format_row(&format!("cpu{i}"), row));
        out.push('\n');
    }

    for line in passthrough {
        out.push_str(&line);
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_host() -> String {
        "cpu  100 5 50 900 10 0 2 0 0 0\n\
         cpu0 50 2 25 450 5 0 1 0 0 0\n\
         cpu1 50 3 25 450 5 0 1 0 0 0\n\
         intr 12345 0\n\
         ctxt 98765\n\
         btime 1600000000\n\
         processes 4321\n\
         procs_running 2\n\
         procs_blocked 0\n\
         softirq 5555 1 2 3\n"
            .to_string()
    }

    #[test]
    fn test_parse_host_stat_rows_and_passthrough() {
        let (rows, passthrough) = parse_host_stat(&sample_host());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tracked.user, 50);
        assert_eq!(passthrough.len(), 7);
    }

    #[test]
    fn test_render_aggregate_sums_virtual_cpus() {
        let cache = CpuAccountingCache::new();
        let host = sample_host();
        let path = std::path::PathBuf::from("/sys/fs/cgroup/test-stat");
        let rendered = render(&host, &cache, &path, &[0, 1]);

        let agg_line = rendered.lines().next().unwrap();
        // two spaces between the label and the first field, ten tracked
        // columns including guest_nice, matching the host's own format.
        assert_eq!(agg_line, "cpu  100 5 50 900 10 0 2 0 0 0");
    }

    #[test]
    fn test_render_per_cpu_line_has_ten_columns_and_single_space() {
        let cache = CpuAccountingCache::new();
        let host = sample_host();
        let path = std::path::PathBuf::from("/sys/fs/cgroup/test-stat-percpu");
        let rendered = render(&host, &cache, &path, &[0, 1]);
        let cpu0_line = rendered.lines().find(|l| l.starts_with("cpu0 ")).unwrap();
        assert_eq!(cpu0_line, "cpu0 50 2 25 450 5 0 1 0 0 0");
    }

    #[test]
    fn test_render_keeps_passthrough_lines() {
        let cache = CpuAccountingCache::new();
        let host = sample_host();
        let path = std::path::PathBuf::from("/sys/fs/cgroup/test-stat2");
        let rendered = render(&host, &cache, &path, &[0, 1]);
        assert!(rendered.contains("btime 1600000000"));
    }

    #[test]
    fn test_render_virtual_cpu_count_matches_ordered_ids() {
        let cache = CpuAccountingCache::new();
        let host = sample_host();
        let path = std::path::PathBuf::from("/sys/fs/cgroup/test-stat3");
        let rendered = render(&host, &cache, &path, &[1]);
        let cpu_lines: Vec<&str> = rendered
            .lines()
            .filter(|l| l.starts_with("cpu") && l.as_bytes()[3] != b' ')
            .collect();
        assert_eq!(cpu_lines.len(), 1);
        assert!(cpu_lines[0].starts_with("cpu0 "));
    }
}
