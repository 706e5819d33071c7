use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A release version reduced to its numeric core.
///
/// Decorations such as a leading `v` or a `-rc1` / `+build` suffix are
/// accepted by [`Version::parse`] but do not take part in ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable version string {input:?}")]
pub struct VersionParseError {
    pub input: String,
}

/// Outcome of comparing two version strings.
///
/// `Incomparable` is returned when either side fails to parse; callers must
/// handle it explicitly instead of treating it as equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
    Incomparable,
}

impl From<Ordering> for Comparison {
    fn from(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => Self::Less,
            Ordering::Equal => Self::Equal,
            Ordering::Greater => Self::Greater,
        }
    }
}

impl Version {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `v1.2.3`, `1.2`, `3`, `1.2.3-rc1` and similar strings.
    ///
    /// # Errors
    /// Returns [`VersionParseError`] when the input has no numeric core, more
    /// than three components, an empty component, or a non-numeric component.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let invalid = || VersionParseError {
            input: input.to_string(),
        };

        let trimmed = input.trim();
        let unprefixed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let (core, _suffix) = split_core_and_suffix(unprefixed);

        let mut numbers = [0_u64; 3];
        let mut count = 0;
        for part in core.split('.') {
            if count == numbers.len()
                || part.is_empty()
                || !part.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(invalid());
            }
            numbers[count] = part.parse::<u64>().map_err(|_| invalid())?;
            count += 1;
        }

        let [major, minor, patch] = numbers;
        Ok(Self::new(major, minor, patch))
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Compare two version strings structurally.
#[must_use]
pub fn compare(a: &str, b: &str) -> Comparison {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b).into(),
        _ => Comparison::Incomparable,
    }
}

fn split_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}

#[cfg(test)]
mod tests {
    use super::{Comparison, Version, compare};

    #[test]
    fn parse_fills_missing_components_with_zero() {
        assert_eq!(Version::parse("v1.2"), Ok(Version::new(1, 2, 0)));
        assert_eq!(Version::parse("3"), Ok(Version::new(3, 0, 0)));
        assert_eq!(Version::parse("0.6.0"), Ok(Version::new(0, 6, 0)));
        assert_eq!(Version::parse("  v0.7\n"), Ok(Version::new(0, 7, 0)));
    }

    #[test]
    fn parse_discards_suffix_decoration() {
        assert_eq!(Version::parse("1.2.3-rc1"), Ok(Version::new(1, 2, 3)));
        assert_eq!(Version::parse("v0.6-stable"), Ok(Version::new(0, 6, 0)));
        assert_eq!(Version::parse("2.0.0+build.7"), Ok(Version::new(2, 0, 0)));
    }

    #[test]
    fn parse_rejects_inputs_outside_the_grammar() {
        for input in ["", "v", "latest", "1.2.3.4", "1..2", "1.", ".1", "-rc1", "1.x"] {
            assert!(Version::parse(input).is_err(), "{input:?} should not parse");
        }
    }

    #[test]
    fn parse_accepts_free_form_suffix() {
        assert_eq!(Version::parse("0.6.0-src"), Ok(Version::new(0, 6, 0)));
        assert_eq!(Version::parse("1.2-"), Ok(Version::new(1, 2, 0)));
        assert_eq!(Version::parse("1+a-b.c"), Ok(Version::new(1, 0, 0)));
    }

    #[test]
    fn parse_error_keeps_original_input() {
        let error = Version::parse("main").expect_err("branch names are not versions");
        assert_eq!(error.input, "main");
        assert_eq!(error.to_string(), "unparseable version string \"main\"");
    }

    #[test]
    fn display_uses_normalized_triple() {
        let version = Version::parse("v1.4").expect("version should parse");
        assert_eq!(version.to_string(), "1.4.0");
    }

    #[test]
    fn compare_orders_by_numeric_triple() {
        assert_eq!(compare("0.6.0", "0.7"), Comparison::Less);
        assert_eq!(compare("1.10.0", "1.9.9"), Comparison::Greater);
        assert_eq!(compare("v1.2", "1.2.0"), Comparison::Equal);
        assert_eq!(compare("1.2.3-rc1", "1.2.3"), Comparison::Equal);
    }

    #[test]
    fn compare_reports_incomparable_for_unparseable_input() {
        assert_eq!(compare("main", "0.6.0"), Comparison::Incomparable);
        assert_eq!(compare("0.6.0", "nightly"), Comparison::Incomparable);
        assert_eq!(compare("nightly", "nightly"), Comparison::Incomparable);
    }

    #[test]
    fn compare_is_reflexive_antisymmetric_and_transitive() {
        let samples = ["0", "0.1", "0.6.0", "v0.7", "1", "1.0.1", "1.2-rc", "2.0.0", "10.0"];

        for a in samples {
            assert_eq!(compare(a, a), Comparison::Equal);
            for b in samples {
                let forward = compare(a, b);
                let backward = compare(b, a);
                let mirrored = match backward {
                    Comparison::Less => Comparison::Greater,
                    Comparison::Greater => Comparison::Less,
                    other => other,
                };
                assert_eq!(forward, mirrored, "{a} vs {b}");

                for c in samples {
                    if compare(a, b) == Comparison::Less && compare(b, c) == Comparison::Less {
                        assert_eq!(compare(a, c), Comparison::Less, "{a} < {b} < {c}");
                    }
                }
            }
        }
    }
}
