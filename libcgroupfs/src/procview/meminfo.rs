//! Renders `/proc/meminfo` (spec §4.4): rewrites the memory-capacity keys
//! against the cgroup's own limit, usage and swap accounting, preserving
//! host field order and byte-for-byte column alignment for every other
//! key (lxcfs rewrites this same key set: `MemTotal`, `MemFree`,
//! `MemAvailable`, `Buffers`, `Cached`, `SwapTotal`, `SwapFree`).

const REWRITE_KEYS: &[&str] =
    &["MemTotal", "MemFree", "MemAvailable", "Buffers", "Cached", "SwapTotal", "SwapFree"];

/// `mem_limit_bytes` is `None` when the memory controller is absent or
/// unlimited, in which case `MemTotal`/`MemFree`/`MemAvailable` simply
/// mirror the host line unchanged. `usage_bytes` is the cgroup's current
/// `memory.current`/`memory.usage_in_bytes` reading. `cache_bytes` is the
/// cgroup's own page-cache size from `memory.stat` (`cache` on v1,
/// `file` on v2); `Buffers` always renders as `0`, since no per-cgroup
/// buffer count exists to report. `swap_total_bytes`/`swap_used_bytes`
/// come from `memory.swap.max`/`memory.swap.current`; either being
/// absent (v1 has no per-cgroup swap-only counter) falls back to the
/// host's own `SwapTotal`/`SwapFree` line, same degradation rule as
/// `diskstats`/`swaps`.
pub fn render(
    host_meminfo: &str,
    mem_limit_bytes: Option<u64>,
    usage_bytes: u64,
    cache_bytes: Option<u64>,
    swap_total_bytes: Option<u64>,
    swap_used_bytes: Option<u64>,
) -> String {
    let mut out = String::new();

    for line in host_meminfo.lines() {
        let Some((key_part, rest)) = line.split_once(':') else {
            out.push_str(line);
            out.push('\n');
            continue;
        };
        let key = key_part.trim();

        if !REWRITE_KEYS.contains(&key) {
            out.push_str(line);
            out.push('\n');
            continue;
        }

        let host_value_kb: u64 = rest
            .trim()
            .split_whitespace()
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let total_kb = match mem_limit_bytes {
            Some(limit) => host_value_kb.min(limit / 1024),
            None => host_value_kb,
        };

        let new_value_kb = match key {
            "MemTotal" => total_kb,
            "MemFree" | "MemAvailable" => total_kb.saturating_sub(usage_bytes / 1024),
            "Buffers" => 0,
            "Cached" => cache_bytes.map(|c| c / 1024).unwrap_or(host_value_kb),
            "SwapTotal" => swap_total_bytes.map(|b| b / 1024).unwrap_or(host_value_kb),
            "SwapFree" => match (swap_total_bytes, swap_used_bytes) {
                (Some(total), Some(used)) => (total / 1024).saturating_sub(used / 1024),
                _ => host_value_kb,
            },
            _ => host_value_kb,
        };

        out.push_str(&rewrite_line(key_part, rest, new_value_kb));
        out.push('\n');
    }

    out
}

/// Rewrites the numeric field of a `key:   value unit` line while
/// reproducing the exact whitespace span the host kernel used, so the
/// rewritten line stays byte-identical in every column but the digits
/// that actually changed.
fn rewrite_line(key_part: &str, rest: &str, new_value: u64) -> String {
    let trimmed = rest.trim_start();
    let leading_ws_len = rest.len() - trimmed.len();
    let mut parts = trimmed.splitn(2, ' ');
    let digits = parts.next().unwrap_or("");
    let remainder = parts.next().unwrap_or("");
    let width = leading_ws_len + digits.len();
    format!("{key_part}:{:>width$} {remainder}", new_value, width = width)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_host() -> String {
        "MemTotal:        8122360 kB\n\
         MemFree:         3000000 kB\n\
         MemAvailable:    5000000 kB\n\
         Buffers:          200000 kB\n\
         Cached:           900000 kB\n\
         SwapTotal:             0 kB\n\
         SwapFree:              0 kB\n\
         Dirty:               100 kB\n"
            .to_string()
    }

    #[test]
    fn test_mem_total_clamped_to_limit() {
        let host = sample_host();
        // 1 GiB limit
        let rendered = render(&host, Some(1024 * 1024 * 1024), 0, None, None, None);
        let total_line = rendered.lines().find(|l| l.starts_with("MemTotal")).unwrap();
        assert_eq!(total_line, "MemTotal:        1048576 kB");
    }

    #[test]
    fn test_mem_free_subtracts_usage() {
        let host = sample_host();
        let rendered = render(&host, Some(1024 * 1024 * 1024), 512 * 1024 * 1024, None, None, None);
        let free_line = rendered.lines().find(|l| l.starts_with("MemFree")).unwrap();
        assert_eq!(free_line, "MemFree:          524288 kB");
    }

    #[test]
    fn test_no_limit_passes_through_host_value_byte_identical() {
        let host = sample_host();
        let rendered = render(&host, None, 0, None, None, None);
        let total_line = rendered.lines().find(|l| l.starts_with("MemTotal")).unwrap();
        assert_eq!(total_line, "MemTotal:        8122360 kB");
    }

    #[test]
    fn test_unrewritten_key_untouched() {
        let host = sample_host();
        let rendered = render(&host, Some(1024 * 1024 * 1024), 0, None, None, None);
        assert!(rendered.contains("Dirty:               100 kB"));
    }

    #[test]
    fn test_mem_free_never_negative() {
        let host = sample_host();
        let rendered = render(&host, Some(1024 * 1024), 10 * 1024 * 1024 * 1024, None, None, None);
        let free_line = rendered.lines().find(|l| l.starts_with("MemFree")).unwrap();
        assert_eq!(free_line, "MemFree:               0 kB");
    }

    #[test]
    fn test_buffers_always_zero() {
        let host = sample_host();
        let rendered = render(&host, Some(1024 * 1024 * 1024), 0, None, None, None);
        let buffers_line = rendered.lines().find(|l| l.starts_with("Buffers")).unwrap();
        assert_eq!(buffers_line, "Buffers:               0 kB");
    }

    #[test]
    fn test_cached_rewritten_from_cgroup_memory_stat() {
        let host = sample_host();
        let rendered = render(&host, Some(1024 * 1024 * 1024), 0, Some(100 * 1024), None, None);
        let cached_line = rendered.lines().find(|l| l.starts_with("Cached")).unwrap();
        assert_eq!(cached_line, "Cached:              100 kB");
    }

    #[test]
    fn test_swap_total_and_free_rewritten_when_available() {
        let host = sample_host();
        let rendered = render(
            &host,
            Some(1024 * 1024 * 1024),
            0,
            None,
            Some(2 * 1024 * 1024),
            Some(512 * 1024),
        );
        let total_line = rendered.lines().find(|l| l.starts_with("SwapTotal")).unwrap();
        let free_line = rendered.lines().find(|l| l.starts_with("SwapFree")).unwrap();
        assert_eq!(total_line, "SwapTotal:          2048 kB");
        assert_eq!(free_line, "SwapFree:           1536 kB");
    }

    #[test]
    fn test_swap_passes_through_host_value_when_unavailable() {
        let host = sample_host();
        let rendered = render(&host, Some(1024 * 1024 * 1024), 0, None, None, None);
        let total_line = rendered.lines().find(|l| l.starts_with("SwapTotal")).unwrap();
        assert_eq!(total_line, "SwapTotal:             0 kB");
    }
}
