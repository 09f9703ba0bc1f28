//! Semantic versions of locally catalogued processes
//!
//! Parsing follows the semver.org grammar strictly. Ordering is total and
//! ignores build metadata, so `1.0.0+a == 1.0.0+b`.

use crate::error::{CwlError, CwlResult};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit0, one_of},
    combinator::{all_consuming, map_res, opt, recognize},
    multi::separated_list1,
    sequence::{pair, preceded, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// One dot-separated prerelease identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrereleaseIdentifier {
    Numeric(u64),
    AlphaNumeric(String),
}

impl Ord for PrereleaseIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::AlphaNumeric(a), Self::AlphaNumeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::AlphaNumeric(_)) => Ordering::Less,
            (Self::AlphaNumeric(_), Self::Numeric(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for PrereleaseIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PrereleaseIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{}", n),
            Self::AlphaNumeric(s) => f.write_str(s),
        }
    }
}

/// A semantic version: `major.minor.patch[-prerelease][+build]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Vec<PrereleaseIdentifier>,
    pub build: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: Vec::new(),
            build: None,
        }
    }

    /// Parse a version string.
    pub fn parse(input: &str) -> CwlResult<Self> {
        match all_consuming(version)(input) {
            Ok((_, parsed)) => Ok(parsed),
            Err(_) => Err(CwlError::invalid_version(
                input,
                "Version must follow semantic versioning (see semver.org)",
            )),
        }
    }

    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// `0` or a digit string without a leading zero
fn numeric_identifier(input: &str) -> IResult<&str, u64> {
    map_res(
        alt((recognize(pair(one_of("123456789"), digit0)), tag("0"))),
        str::parse::<u64>,
    )(input)
}

fn prerelease_identifier(input: &str) -> IResult<&str, PrereleaseIdentifier> {
    map_res(take_while1(is_identifier_char), |token: &str| {
        if token.chars().all(|c| c.is_ascii_digit()) {
            if token.len() > 1 && token.starts_with('0') {
                return Err("numeric identifier with leading zero");
            }
            token
                .parse::<u64>()
                .map(PrereleaseIdentifier::Numeric)
                .map_err(|_| "numeric identifier out of range")
        } else {
            Ok(PrereleaseIdentifier::AlphaNumeric(token.to_string()))
        }
    })(input)
}

fn build_metadata(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(char('.'), take_while1(is_identifier_char)))(input)
}

fn version(input: &str) -> IResult<&str, Version> {
    let (input, (major, _, minor, _, patch)) = tuple((
        numeric_identifier,
        char('.'),
        numeric_identifier,
        char('.'),
        numeric_identifier,
    ))(input)?;
    let (input, prerelease) = opt(preceded(
        char('-'),
        separated_list1(char('.'), prerelease_identifier),
    ))(input)?;
    let (input, build) = opt(preceded(char('+'), build_metadata))(input)?;

    Ok((
        input,
        Version {
            major,
            minor,
            patch,
            prerelease: prerelease.unwrap_or_default(),
            build: build.map(str::to_string),
        },
    ))
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.prerelease.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| {
                match (self.prerelease.is_empty(), other.prerelease.is_empty()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    // Lexicographic slice order: a strict prefix sorts first
                    (false, false) => self.prerelease.cmp(&other.prerelease),
                }
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        for (i, identifier) in self.prerelease.iter().enumerate() {
            let separator = if i == 0 { '-' } else { '.' };
            write!(f, "{}{}", separator, identifier)?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = CwlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = CwlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_components() {
        let version = v("1.2.3-rc.1+build.5");
        assert_eq!((version.major, version.minor, version.patch), (1, 2, 3));
        assert_eq!(
            version.prerelease,
            vec![
                PrereleaseIdentifier::AlphaNumeric("rc".to_string()),
                PrereleaseIdentifier::Numeric(1)
            ]
        );
        assert_eq!(version.build.as_deref(), Some("build.5"));
        assert_eq!(version.to_string(), "1.2.3-rc.1+build.5");
    }

    #[test]
    fn test_rejects_malformed_versions() {
        for bad in [
            "1.2",
            "01.2.3",
            "1.02.3",
            "1.2.03",
            "1.2.3-",
            "1.2.3-01",
            "1.2.3-alpha..1",
            "1.2.3+",
            "v1.2.3",
            "1.2.3 ",
            "",
        ] {
            assert!(
                matches!(Version::parse(bad), Err(CwlError::InvalidVersion { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_accepts_zero_components() {
        assert_eq!(v("0.0.0"), Version::new(0, 0, 0));
        assert!(v("1.0.0-0").is_prerelease());
        assert!(v("1.0.0-0a").is_prerelease());
    }

    #[test]
    fn test_semver_precedence_chain() {
        let chain = [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-alpha.beta",
            "1.0.0-beta",
            "1.0.0-beta.2",
            "1.0.0-beta.11",
            "1.0.0-rc.1",
            "1.0.0",
        ];
        for pair in chain.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_core_ordering() {
        assert!(v("1.9.0") < v("1.10.0"));
        assert!(v("2.0.0") > v("1.99.99"));
        assert!(v("1.0.1-alpha") > v("1.0.0"));
    }

    #[test]
    fn test_build_metadata_ignored() {
        assert_eq!(v("1.0.0+a"), v("1.0.0+b"));
        assert_eq!(v("1.0.0-rc.1+x").cmp(&v("1.0.0-rc.1")), Ordering::Equal);
        assert_ne!(v("1.0.0-rc.1"), v("1.0.0"));
    }

    #[test]
    fn test_serde_as_string() {
        let version: Version = serde_json::from_str("\"0.3.1-beta\"").unwrap();
        assert_eq!(version, v("0.3.1-beta"));
        assert_eq!(serde_json::to_string(&version).unwrap(), "\"0.3.1-beta\"");
        assert!(serde_json::from_str::<Version>("\"0.3\"").is_err());
    }
}
