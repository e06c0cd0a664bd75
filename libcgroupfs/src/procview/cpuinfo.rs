//! Renders `/proc/cpuinfo` (spec §4.4): filter to the caller's visible
//! CPUs, renumber `processor:` blocks starting at 0 in intersection
//! order.

use std::collections::BTreeSet;

/// Host `/proc/cpuinfo` is a sequence of blocks separated by a blank
/// line, each block's first field being `processor\t: N`. Blocks are
/// kept in host order, filtered to `visible`, and renumbered.
pub fn render(host_cpuinfo: &str, cpuset: &BTreeSet<u32>, host_online: &BTreeSet<u32>) -> String {
    let visible = crate::parse::intersect(cpuset, host_online);

    let blocks: Vec<&str> = host_cpuinfo.split("\n\n").filter(|b| !b.trim().is_empty()).collect();
    let mut out = String::new();
    let mut next_id = 0u32;

    for block in blocks {
        let Some(host_id) = processor_id(block) else {
            continue;
        };
        if !visible.contains(&host_id) {
            continue;
        }

        for line in block.lines() {
            match line.split_once(':') {
                Some((key, _)) if key.trim() == "processor" => {
                    out.push_str(&format!("{}: {}\n", key, next_id));
                }
                _ => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        out.push('\n');
        next_id += 1;
    }

    out
}

fn processor_id(block: &str) -> Option<u32> {
    for line in block.lines() {
        if let Some((key, val)) = line.split_once(':') {
            if key.trim() == "processor" {
                return val.trim().parse().ok();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_host() -> String {
        let mut s = String::new();
        for i in 0..8u32 {
            s.push_str(&format!("processor\t: {i}\nvendor_id\t: GenuineIntel\nmodel name\t: Test CPU\n\n"));
        }
        s
    }

    #[test]
    fn test_filters_and_renumbers() {
        let host = sample_host();
        let cpuset = BTreeSet::from([2, 5]);
        let online: BTreeSet<u32> = (0..8).collect();
        let rendered = render(&host, &cpuset, &online);

        let processor_lines: Vec<&str> = rendered
            .lines()
            .filter(|l| l.starts_with("processor"))
            .collect();
        assert_eq!(processor_lines.len(), 2);
        assert!(processor_lines[0].ends_with(": 0"));
        assert!(processor_lines[1].ends_with(": 1"));
    }

    #[test]
    fn test_preserves_other_fields() {
        let host = sample_host();
        let cpuset = BTreeSet::from([0]);
        let online: BTreeSet<u32> = (0..8).collect();
        let rendered = render(&host, &cpuset, &online);
        assert!(rendered.contains("vendor_id\t: GenuineIntel"));
    }

    #[test]
    fn test_empty_cpuset_yields_empty() {
        let host = sample_host();
        let cpuset = BTreeSet::new();
        let online: BTreeSet<u32> = (0..8).collect();
        assert_eq!(render(&host, &cpuset, &online), "");
    }
}
