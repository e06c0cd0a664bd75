//! Renders `/sys/devices/system/cpu/online` (spec §4.4).

use std::collections::BTreeSet;

use crate::parse::canonicalize_cpuset;

/// `N = |cpuset ∩ online|`; emits the canonical range string, or an empty
/// line if N = 0. The *virtual* CPU numbering (`0..N`), not the host
/// CPU ids, is what's emitted here — mirrors what a container sees.
pub fn render(cpuset: &BTreeSet<u32>, host_online: &BTreeSet<u32>) -> String {
    let visible = crate::parse::intersect(cpuset, host_online);
    if visible.is_empty() {
        return String::new();
    }
    let renumbered: BTreeSet<u32> = (0..visible.len() as u32).collect();
    format!("{}\n", canonicalize_cpuset(&renumbered))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_two_cpus() {
        let cpuset = BTreeSet::from([2, 5]);
        let online = BTreeSet::from([0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(render(&cpuset, &online), "0-1\n");
    }

    #[test]
    fn test_render_empty_when_none_online() {
        let cpuset = BTreeSet::from([9]);
        let online = BTreeSet::from([0, 1]);
        assert_eq!(render(&cpuset, &online), "");
    }

    #[test]
    fn test_render_single_cpu() {
        let cpuset = BTreeSet::from([3]);
        let online = BTreeSet::from([0, 1, 2, 3]);
        assert_eq!(render(&cpuset, &online), "0\n");
    }
}
