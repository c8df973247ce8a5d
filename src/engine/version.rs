//! Version Ordering
//!
//! Dotted numeric versions ("1.2", "0.0.10") compared component-wise with
//! implicit zero padding, so "1.2" and "1.2.0" are the same version.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("invalid component {component:?} in version {input:?}")]
    InvalidComponent { input: String, component: String },
}

/// A release version: an ordered tuple of non-negative integers.
///
/// Components are kept as canonical digit strings (no leading zeros), so
/// there is no upper bound on their magnitude.
#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<String>,
}

fn canonical(component: &str) -> String {
    let trimmed = component.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Numeric order of two canonical digit strings
fn cmp_component(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl Version {
    /// Parse a dotted version string. Every component must be plain ASCII digits.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        if input.is_empty() {
            return Err(VersionError::Empty);
        }

        let parts = input
            .split('.')
            .map(|component| {
                if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(VersionError::InvalidComponent {
                        input: input.to_string(),
                        component: component.to_string(),
                    });
                }
                Ok(canonical(component))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { parts })
    }

    /// Parse a version, falling back to 0.0.0 when the input is malformed.
    ///
    /// Used wherever a version is extracted from a name on disk (installer
    /// filenames, checker directory ordering): a bad name sorts lowest
    /// instead of aborting the scan.
    pub fn parse_or_zero(input: &str) -> Self {
        Self::parse(input).unwrap_or_else(|_| Self::zero())
    }

    pub fn zero() -> Self {
        Self {
            parts: vec!["0".to_string(); 3],
        }
    }

    /// True for the "no prior install" sentinel (every component is zero).
    pub fn is_zero(&self) -> bool {
        self.parts.iter().all(|p| p == "0")
    }
}

/// Compare two version strings (-> Greater when `a` is newer).
pub fn compare(a: &str, b: &str) -> Result<Ordering, VersionError> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).map_or("0", String::as_str);
            let b = other.parts.get(i).map_or("0", String::as_str);
            match cmp_component(a, b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.parts {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", part)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_padding_equality() {
        assert_eq!(compare("1.2", "1.2.0").unwrap(), Ordering::Equal);
        assert_eq!(v("1.2"), v("1.2.0.0"));
    }

    #[test]
    fn test_ordering_examples() {
        assert_eq!(compare("2", "1.9.9").unwrap(), Ordering::Greater);
        assert_eq!(compare("0.0.2", "0.0.10").unwrap(), Ordering::Less);
        assert_eq!(compare("0.1.0", "0.0.99").unwrap(), Ordering::Greater);
        assert_eq!(compare("1.0.0", "1.0.0").unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_total_order_properties() {
        let samples = ["0", "0.0.1", "0.0.2", "0.0.10", "0.1", "1", "1.0.1", "1.2", "2", "10.0"];
        for a in samples {
            assert_eq!(v(a).cmp(&v(a)), Ordering::Equal);
            for b in samples {
                // antisymmetry
                assert_eq!(v(a).cmp(&v(b)), v(b).cmp(&v(a)).reverse());
                for c in samples {
                    if v(a) <= v(b) && v(b) <= v(c) {
                        assert!(v(a) <= v(c), "{} <= {} <= {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_malformed_components_are_errors() {
        assert_eq!(Version::parse(""), Err(VersionError::Empty));
        for bad in ["1..2", "1.x", "v1.0", "1.2-beta", "+1.0", " 1.0", "1.", "-1"] {
            assert!(
                matches!(Version::parse(bad), Err(VersionError::InvalidComponent { .. })),
                "{} should be rejected",
                bad
            );
        }
        assert!(compare("1.0", "abc").is_err());
    }

    #[test]
    fn test_components_beyond_u64() {
        let huge = v("1.18446744073709551616");
        assert!(huge > v("1.18446744073709551615"));
        assert!(huge < v("2"));
        assert_eq!(huge.to_string(), "1.18446744073709551616");
        assert_eq!(
            compare("0.99999999999999999999999", "0.100000000000000000000000").unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_leading_zeros_are_insignificant() {
        assert_eq!(v("01.002"), v("1.2"));
        assert_eq!(v("1.010").to_string(), "1.10");
        assert!(v("00.000").is_zero());
    }

    #[test]
    fn test_parse_or_zero() {
        assert_eq!(Version::parse_or_zero("0.0.3"), v("0.0.3"));
        assert_eq!(Version::parse_or_zero("beta"), Version::zero());
        assert!(Version::parse_or_zero("").is_zero());
    }

    #[test]
    fn test_zero_sentinel() {
        assert!(v("0.0.0").is_zero());
        assert!(v("0").is_zero());
        assert!(!v("0.0.1").is_zero());
    }

    #[test]
    fn test_display_and_serde() {
        assert_eq!(v("0.0.2").to_string(), "0.0.2");
        let json = serde_json::to_string(&v("1.10.3")).unwrap();
        assert_eq!(json, "\"1.10.3\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("1.10.3"));
        assert!(serde_json::from_str::<Version>("\"1.a\"").is_err());
    }
}
