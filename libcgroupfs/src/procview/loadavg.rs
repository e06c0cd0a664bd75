//! Renders `/proc/loadavg` (spec §4.4). Two modes, selected by
//! `cgroupfsd::config::Config::cgroup_loadavg`: proxy the host file
//! unchanged, or maintain a per-cgroup EMA over the count of
//! running+uninterruptible tasks, sampled on a fixed interval.

/// The kernel's own 1/5/15-minute exponential decay constants, expressed
/// as `EXP_N / 2048` per sample (`include/linux/sched/loadavg.h`).
const EXP_1: f64 = 1884.0 / 2048.0;
const EXP_5: f64 = 2014.0 / 2048.0;
const EXP_15: f64 = 2037.0 / 2048.0;

const SAMPLE_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct LoadAvg {
    avg1: f64,
    avg5: f64,
    avg15: f64,
}

impl Default for LoadAvg {
    fn default() -> Self {
        LoadAvg {
            avg1: 0.0,
            avg5: 0.0,
            avg15: 0.0,
        }
    }
}

impl LoadAvg {
    /// Folds in one sample of `runnable` (running + uninterruptible
    /// tasks in the cgroup at this instant), per the kernel's
    /// `calc_load` recurrence: `avg' = avg * exp + runnable * (1 - exp)`.
    pub fn sample(&mut self, runnable: f64) {
        self.avg1 = self.avg1 * EXP_1 + runnable * (1.0 - EXP_1);
        self.avg5 = self.avg5 * EXP_5 + runnable * (1.0 - EXP_5);
        self.avg15 = self.avg15 * EXP_15 + runnable * (1.0 - EXP_15);
    }

    pub fn sample_interval_secs() -> u64 {
        SAMPLE_INTERVAL_SECS
    }

    /// `runnable/total` and the last-allocated PID are pass-through
    /// fields the kernel itself reports; this crate has no reason to
    /// virtualize them separately from the host.
    pub fn render(&self, runnable: u32, total: u32, last_pid: u32) -> String {
        format!(
            "{:.2} {:.2} {:.2} {}/{} {}\n",
            self.avg1, self.avg5, self.avg15, runnable, total, last_pid
        )
    }
}

/// Passes the host `/proc/loadavg` content through verbatim (the
/// cgroup-loadavg EMA is disabled).
pub fn render_passthrough(host_loadavg: &str) -> String {
    host_loadavg.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_converges_toward_constant_load() {
        let mut avg = LoadAvg::default();
        for _ in 0..500 {
            avg.sample(2.0);
        }
        assert!((avg.avg1 - 2.0).abs() < 0.01);
        assert!((avg.avg15 - 2.0).abs() < 0.5);
    }

    #[test]
    fn test_zero_load_stays_zero() {
        let mut avg = LoadAvg::default();
        avg.sample(0.0);
        assert_eq!(avg.avg1, 0.0);
    }

    #[test]
    fn test_render_format() {
        let avg = LoadAvg {
            avg1: 1.5,
            avg5: 1.2,
            avg15: 0.9,
        };
        assert_eq!(avg.render(3, 120, 4321), "1.50 1.20 0.90 3/120 4321\n");
    }

    #[test]
    fn test_passthrough_unchanged() {
        let host = "0.10 0.05 0.01 1/234 5678\n";
        assert_eq!(render_passthrough(host), host);
    }
}
