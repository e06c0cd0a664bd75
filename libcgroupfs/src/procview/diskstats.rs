//! Renders `/proc/diskstats` (spec §4.4): pass-through only. Unlike
//! `meminfo`/`swaps`, the kernel's per-field layout here (sectors,
//! merges, time-in-queue, ...) has no single column that a per-cgroup
//! io-service-bytes count can be substituted into without inventing a
//! value the kernel never reports, so every line is copied verbatim.
//! `blkio_weighted_io` is accepted so a future column-aware rewrite can
//! key off it, but it is not consulted today.

/// `blkio_weighted_io` holds, per device name as it appears in the host
/// `diskstats` line, the cgroup's own io-service-bytes count for that
/// device. Currently unused: see module docs.
pub fn render(host_diskstats: &str, _blkio_weighted_io: &std::collections::HashMap<String, u64>) -> String {
    host_diskstats.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_blkio_map_passes_through() {
        let host = "   8       0 sda 100 0 200 0 0 0 0 0 0 0 0\n";
        assert_eq!(render(host, &HashMap::new()), host);
    }

    #[test]
    fn test_nonempty_blkio_map_still_passes_through_verbatim() {
        let host = "   8       0 sda 100 0 200 0 0 0 0 0 0 0 0\n";
        let mut map = HashMap::new();
        map.insert("sda".to_string(), 300u64);
        assert_eq!(render(host, &map), host);
    }
}
