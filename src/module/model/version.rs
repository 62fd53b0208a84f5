//! Version and version range model
//!
//! Versions follow the `major.minor.micro[.qualifier]` scheme used by module
//! manifests: missing numeric components default to zero and qualifiers
//! compare lexically. Ranges use interval notation (`[1.0,2.0)`) or a bare
//! version meaning "at least".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Version syntax errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version component '{component}' in '{input}'")]
    InvalidComponent { input: String, component: String },

    #[error("invalid version qualifier '{qualifier}' in '{input}'")]
    InvalidQualifier { input: String, qualifier: String },

    #[error("invalid version range '{0}'")]
    InvalidRange(String),

    #[error("empty version range '{0}' (floor above ceiling)")]
    EmptyRange(String),
}

/// Module or capability version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    /// Parse a version; the empty string is `0.0.0`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(Self::default());
        }

        let mut parts = text.splitn(4, '.');
        let mut numbers = [0u32; 3];
        for slot in numbers.iter_mut() {
            match parts.next() {
                Some(component) => {
                    *slot = component.parse().map_err(|_| VersionError::InvalidComponent {
                        input: input.to_string(),
                        component: component.to_string(),
                    })?;
                }
                None => break,
            }
        }

        let qualifier = parts.next().unwrap_or_default().to_string();
        if !qualifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(VersionError::InvalidQualifier {
                input: input.to_string(),
                qualifier,
            });
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            micro: numbers[2],
            qualifier,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
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

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// Version interval a requirement accepts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    floor: Version,
    floor_inclusive: bool,
    ceiling: Option<Version>,
    ceiling_inclusive: bool,
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl VersionRange {
    /// Every version, `[0.0.0, ∞)`
    pub fn any() -> Self {
        Self::at_least(Version::default())
    }

    pub fn at_least(floor: Version) -> Self {
        Self {
            floor,
            floor_inclusive: true,
            ceiling: None,
            ceiling_inclusive: false,
        }
    }

    /// Half-open interval `[floor, ceiling)`
    pub fn between(floor: Version, ceiling: Version) -> Self {
        Self {
            floor,
            floor_inclusive: true,
            ceiling: Some(ceiling),
            ceiling_inclusive: false,
        }
    }

    /// Exactly one version, `[v, v]`
    pub fn exactly(version: Version) -> Self {
        Self {
            floor: version.clone(),
            floor_inclusive: true,
            ceiling: Some(version),
            ceiling_inclusive: true,
        }
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(Self::any());
        }

        let open = text.chars().next();
        if !matches!(open, Some('[') | Some('(')) {
            return Ok(Self::at_least(Version::parse(text)?));
        }

        let close = text.chars().last();
        if text.len() < 2 || !matches!(close, Some(']') | Some(')')) {
            return Err(VersionError::InvalidRange(input.to_string()));
        }

        let body = &text[1..text.len() - 1];
        let (low, high) = body
            .split_once(',')
            .ok_or_else(|| VersionError::InvalidRange(input.to_string()))?;

        let range = Self {
            floor: Version::parse(low)?,
            floor_inclusive: open == Some('['),
            ceiling: Some(Version::parse(high)?),
            ceiling_inclusive: close == Some(']'),
        };

        if range.is_empty() {
            return Err(VersionError::EmptyRange(input.to_string()));
        }
        Ok(range)
    }

    pub fn floor(&self) -> &Version {
        &self.floor
    }

    pub fn ceiling(&self) -> Option<&Version> {
        self.ceiling.as_ref()
    }

    pub fn is_any(&self) -> bool {
        self.ceiling.is_none() && self.floor_inclusive && self.floor == Version::default()
    }

    pub fn includes(&self, version: &Version) -> bool {
        let above_floor = if self.floor_inclusive {
            *version >= self.floor
        } else {
            *version > self.floor
        };
        if !above_floor {
            return false;
        }

        match &self.ceiling {
            None => true,
            Some(ceiling) if self.ceiling_inclusive => version <= ceiling,
            Some(ceiling) => version < ceiling,
        }
    }

    fn is_empty(&self) -> bool {
        match &self.ceiling {
            None => false,
            Some(ceiling) => {
                if self.floor == *ceiling {
                    !(self.floor_inclusive && self.ceiling_inclusive)
                } else {
                    self.floor > *ceiling
                }
            }
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ceiling {
            None if self.floor_inclusive => write!(f, "{}", self.floor),
            None => write!(f, "({},)", self.floor),
            Some(ceiling) => write!(
                f,
                "{}{},{}{}",
                if self.floor_inclusive { '[' } else { '(' },
                self.floor,
                ceiling,
                if self.ceiling_inclusive { ']' } else { ')' }
            ),
        }
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.to_string()
    }
}
