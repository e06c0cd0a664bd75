//! CPU-set and numeric parsers (C2).
//!
//! Small, pure string->value functions. There's no direct analogue in
//! `libcgroups` (the teacher only ever *writes* these fields from an
//! already-typed `oci_spec::runtime::LinuxCpu`), so this module is built
//! fresh but kept in the same terse, free-function style as
//! `libcgroups::common`'s helpers.

use std::collections::BTreeSet;
use std::fmt;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid cpuset token {0:?}")]
    BadCpuSetToken(String),
    #[error("invalid range {0}-{1}: start must be <= end")]
    BadRange(u32, u32),
    #[error("invalid quantity {0:?}")]
    BadQuantity(String),
}

/// A non-negative quantity, or the unlimited sentinel (`max` on v2, `-1`
/// on v1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Bytes(u64),
    Unlimited,
}

impl Quantity {
    pub fn bytes_or(self, default: u64) -> u64 {
        match self {
            Quantity::Bytes(b) => b,
            Quantity::Unlimited => default,
        }
    }

    pub fn is_unlimited(self) -> bool {
        matches!(self, Quantity::Unlimited)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Bytes(b) => write!(f, "{b}"),
            Quantity::Unlimited => write!(f, "max"),
        }
    }
}

/// Parses `parse_cpuset(s)`: comma-separated `N` or `A-B` tokens
/// (`A <= B`, both >= 0, decimal). Empty string yields the empty set;
/// duplicates collapse because the result is a `BTreeSet`.
pub fn parse_cpuset(s: &str) -> Result<BTreeSet<u32>, ParseError> {
    let s = s.trim();
    let mut out = BTreeSet::new();
    if s.is_empty() {
        return Ok(out);
    }

    for token in s.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.split_once('-') {
            Some((a, b)) => {
                let a: u32 = a
                    .parse()
                    .map_err(|_| ParseError::BadCpuSetToken(token.to_string()))?;
                let b: u32 = b
                    .parse()
                    .map_err(|_| ParseError::BadCpuSetToken(token.to_string()))?;
                if a > b {
                    return Err(ParseError::BadRange(a, b));
                }
                out.extend(a..=b);
            }
            None => {
                let n: u32 = token
                    .parse()
                    .map_err(|_| ParseError::BadCpuSetToken(token.to_string()))?;
                out.insert(n);
            }
        }
    }

    Ok(out)
}

/// Canonicalizes a cpuset back to its minimal comma/range string form, the
/// `c` half of the `parse_cpuset . canonicalize` round trip in spec §8.
pub fn canonicalize_cpuset(set: &BTreeSet<u32>) -> String {
    let mut parts = Vec::new();
    let mut iter = set.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end = iter.next().unwrap();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
    }
    parts.join(",")
}

/// Parses `parse_quantity(s)`: a non-negative integer optionally followed
/// by a SI-1024 unit (`k`/`K`, `M`, `G`, `T`). `max` (v2) or `-1` (v1)
/// means unlimited.
pub fn parse_quantity(s: &str) -> Result<Quantity, ParseError> {
    let s = s.trim();
    if s == "max" || s == "-1" {
        return Ok(Quantity::Unlimited);
    }

    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => (&s[..idx], &s[idx..]),
        None => (s, ""),
    };

    if digits.is_empty() {
        return Err(ParseError::BadQuantity(s.to_string()));
    }
    let base: u64 = digits
        .parse()
        .map_err(|_| ParseError::BadQuantity(s.to_string()))?;

    let multiplier: u64 = match unit {
        "" => 1,
        "k" | "K" => 1024,
        "M" => 1024 * 1024,
        "G" => 1024 * 1024 * 1024,
        "T" => 1024 * 1024 * 1024 * 1024,
        _ => return Err(ParseError::BadQuantity(s.to_string())),
    };

    Ok(Quantity::Bytes(base.saturating_mul(multiplier)))
}

/// Parses a newline/whitespace-separated list of non-negative integers,
/// e.g. `cgroup.procs`.
pub fn parse_int_list(s: &str) -> Vec<i64> {
    s.split_whitespace().filter_map(|t| t.parse().ok()).collect()
}

/// `intersect(a, host_online)`: the subset of `a` also online on the host.
pub fn intersect(a: &BTreeSet<u32>, host_online: &BTreeSet<u32>) -> BTreeSet<u32> {
    a.intersection(host_online).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    #[test]
    fn test_parse_cpuset_empty() {
        assert_eq!(parse_cpuset("").unwrap(), BTreeSet::new());
    }

    #[test]
    fn test_parse_cpuset_single() {
        assert_eq!(parse_cpuset("5").unwrap(), BTreeSet::from([5]));
    }

    #[test]
    fn test_parse_cpuset_range() {
        assert_eq!(parse_cpuset("2-5").unwrap(), BTreeSet::from([2, 3, 4, 5]));
    }

    #[test]
    fn test_parse_cpuset_mixed_and_dedup() {
        assert_eq!(
            parse_cpuset("2,5,2,8-10").unwrap(),
            BTreeSet::from([2, 5, 8, 9, 10])
        );
    }

    #[test]
    fn test_parse_cpuset_bad_range() {
        assert_eq!(parse_cpuset("5-2").unwrap_err(), ParseError::BadRange(5, 2));
    }

    #[test]
    fn test_parse_cpuset_bad_token() {
        assert!(parse_cpuset("a-b").is_err());
    }

    #[test]
    fn test_canonicalize_cpuset() {
        let set = parse_cpuset("2,5,8-10,3").unwrap();
        assert_eq!(canonicalize_cpuset(&set), "2-3,5,8-10");
    }

    #[test]
    fn test_parse_quantity_plain() {
        assert_eq!(parse_quantity("1024").unwrap(), Quantity::Bytes(1024));
    }

    #[test]
    fn test_parse_quantity_units() {
        assert_eq!(parse_quantity("1K").unwrap(), Quantity::Bytes(1024));
        assert_eq!(parse_quantity("1M").unwrap(), Quantity::Bytes(1024 * 1024));
        assert_eq!(
            parse_quantity("2G").unwrap(),
            Quantity::Bytes(2 * 1024 * 1024 * 1024)
        );
    }

    #[test]
    fn test_parse_quantity_unlimited() {
        assert!(parse_quantity("max").unwrap().is_unlimited());
        assert!(parse_quantity("-1").unwrap().is_unlimited());
    }

    #[test]
    fn test_intersect() {
        let a = parse_cpuset("0-7").unwrap();
        let online = parse_cpuset("2,5").unwrap();
        let result = intersect(&a, &online);
        assert_eq!(result, BTreeSet::from([2, 5]));
    }

    quickcheck! {
        fn roundtrip_idempotent(xs: Vec<u32>) -> bool {
            let capped: BTreeSet<u32> = xs.into_iter().map(|x| x % 64).collect();
            let once = canonicalize_cpuset(&capped);
            let parsed = parse_cpuset(&once).unwrap();
            let twice = canonicalize_cpuset(&parsed);
            once == twice
        }
    }
}
