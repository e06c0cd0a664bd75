//! Renders `/proc/uptime` (spec §4.4).

/// `earliest_start_secs` is the earliest `start_time` (converted to wall
/// clock seconds) among `/proc/<pid>/stat` entries for PIDs in the
/// caller's cgroup; `None` when the cgroup has no resident processes.
/// The second field mirrors the kernel's "cumulative idle across all
/// CPUs" convention, scaled by the virtual CPU count this cgroup sees.
pub fn render(wall_now_secs: f64, earliest_start_secs: Option<f64>, virt_cpu_count: u32) -> String {
    let uptime = match earliest_start_secs {
        Some(start) => (wall_now_secs - start).max(0.0),
        None => 0.0,
    };
    let idle = uptime * virt_cpu_count as f64;
    format!("{uptime:.2} {idle:.2}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_resident_processes_yields_zero() {
        assert_eq!(render(1000.0, None, 4), "0.00 0.00\n");
    }

    #[test]
    fn test_uptime_scales_idle_by_virt_cpu_count() {
        let rendered = render(1100.0, Some(1000.0), 2);
        assert_eq!(rendered, "100.00 200.00\n");
    }

    #[test]
    fn test_clamped_to_zero_when_start_in_future() {
        let rendered = render(100.0, Some(200.0), 1);
        assert_eq!(rendered, "0.00 0.00\n");
    }
}
