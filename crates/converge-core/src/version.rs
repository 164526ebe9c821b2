//! Module versions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A `major.minor.micro.qualifier` version.
///
/// Missing numeric parts default to zero and a missing qualifier to the empty
/// string, which sorts before any other qualifier. A `-` may separate the
/// qualifier as well, so `1.0-SNAPSHOT` and `1.0.0.SNAPSHOT` are the same version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
    pub qualifier: String,
}

impl Version {
    /// Create a version without qualifier.
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        input.parse()
    }

    /// Snapshot versions may change content without changing version.
    pub fn is_snapshot(&self) -> bool {
        self.qualifier.ends_with("SNAPSHOT")
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidVersion(input.to_string()));
        }

        let mut numbers = [0u64; 3];
        let mut qualifier = String::new();
        let mut rest = trimmed;

        for (index, slot) in numbers.iter_mut().enumerate() {
            let end = rest.find(['.', '-']).unwrap_or(rest.len());
            let (head, tail) = rest.split_at(end);
            *slot = head
                .parse()
                .map_err(|_| CoreError::InvalidVersion(input.to_string()))?;

            let mut chars = tail.chars();
            match chars.next() {
                None => break,
                Some('-') => {
                    qualifier = chars.as_str().to_string();
                    break;
                }
                Some(_) if index == 2 => {
                    qualifier = chars.as_str().to_string();
                    break;
                }
                Some(_) => rest = chars.as_str(),
            }
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            micro: numbers[2],
            qualifier,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
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
