//! Renders `/proc/swaps` (spec §4.4): same degradation rule as
//! `diskstats` — proxy host content unchanged when no blkio-derived
//! accounting is available for a swap device.

/// `cgroup_swap_used_bytes` rescales the `Used` column for devices the
/// cgroup has its own `memory.swap.current` reading for; any device not
/// present in the map is passed through verbatim.
pub fn render(host_swaps: &str, cgroup_swap_used_bytes: Option<u64>) -> String {
    let Some(used_bytes) = cgroup_swap_used_bytes else {
        return host_swaps.to_string();
    };

    let mut lines = host_swaps.lines();
    let mut out = String::new();
    if let Some(header) = lines.next() {
        out.push_str(header);
        out.push('\n');
    }

    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        let used_kb = used_bytes / 1024;
        out.push_str(&format!(
            "{:<24}{:<10}{:>10}{:>11}{:>5}\n",
            fields[0], fields[1], fields[2], used_kb, fields.get(4).copied().unwrap_or("-2")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_host() -> String {
        "Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority\n\
         /dev/sda2                               partition\t8388604\t\t102400\t\t-2\n"
            .to_string()
    }

    #[test]
    fn test_passthrough_without_cgroup_value() {
        let host = sample_host();
        assert_eq!(render(&host, None), host);
    }

    #[test]
    fn test_rewrites_used_column() {
        let host = sample_host();
        let rendered = render(&host, Some(1024 * 1024));
        assert!(rendered.contains("1024"));
    }
}
