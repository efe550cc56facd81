//! Schema type versions

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SchemaError};

/// The version half of a schema identity.
///
/// Versions are semantic versions. A leading `v` is accepted, and short forms
/// are completed: `"2"` becomes `2.0.0`, `"2.1"` becomes `2.1.0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeVersion {
    version: Version,
}

impl TypeVersion {
    /// Create from explicit components
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            version: Version::new(major, minor, patch),
        }
    }

    /// Parse a version string
    pub fn parse(version_str: &str) -> Result<Self> {
        let trimmed = version_str.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(SchemaError::InvalidVersion(version_str.to_string()));
        }

        let completed = match trimmed.split('.').count() {
            1 => format!("{}.0.0", trimmed),
            2 => format!("{}.0", trimmed),
            _ => trimmed.to_string(),
        };

        let version = Version::parse(&completed)?;
        Ok(Self { version })
    }

    /// Get the version string (e.g., "1.2.3")
    pub fn version_string(&self) -> String {
        self.version.to_string()
    }

    /// The underlying semantic version
    pub fn semver(&self) -> &Version {
        &self.version
    }
}

impl fmt::Display for TypeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)
    }
}

impl TryFrom<String> for TypeVersion {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TypeVersion> for String {
    fn from(value: TypeVersion) -> Self {
        value.version_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let v = TypeVersion::parse("1.2.3").unwrap();
        assert_eq!(v.version_string(), "1.2.3");
    }

    #[test]
    fn test_version_with_v_prefix() {
        let v = TypeVersion::parse("v1.2.3").unwrap();
        assert_eq!(v.version_string(), "1.2.3");
    }

    #[test]
    fn test_short_versions_are_completed() {
        assert_eq!(TypeVersion::parse("2").unwrap(), TypeVersion::new(2, 0, 0));
        assert_eq!(TypeVersion::parse("v2.1").unwrap(), TypeVersion::new(2, 1, 0));
    }

    #[test]
    fn test_invalid_version() {
        assert!(TypeVersion::parse("").is_err());
        assert!(TypeVersion::parse("one.two").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let v: TypeVersion = serde_json::from_str("\"3.1\"").unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"3.1.0\"");
    }
}
