//! Shared value types

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Trust model used for an entire operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustMode {
    /// Pre-provisioned asymmetric key pair
    Key,
    /// Short-lived certificate derived from an OIDC identity token
    Keyless,
}

impl std::fmt::Display for TrustMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key => write!(f, "key"),
            Self::Keyless => write!(f, "keyless"),
        }
    }
}

impl std::str::FromStr for TrustMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "key" | "keypair" | "key-pair" => Ok(Self::Key),
            "keyless" | "oidc" | "identity" => Ok(Self::Keyless),
            _ => Err(ConfigError::invalid(
                "signing.mode",
                format!("unknown trust mode '{}', expected 'key' or 'keyless'", s),
            )),
        }
    }
}

/// Which container inspection tool resolves image digests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestBackendKind {
    /// Prefer crane, fall back to docker
    #[default]
    Auto,
    /// Remote inspection with `crane digest`
    Crane,
    /// Local engine inspection with `docker image inspect`
    Docker,
}

impl std::fmt::Display for DigestBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Crane => write!(f, "crane"),
            Self::Docker => write!(f, "docker"),
        }
    }
}

impl std::str::FromStr for DigestBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "crane" => Ok(Self::Crane),
            "docker" => Ok(Self::Docker),
            _ => Err(ConfigError::invalid(
                "digest.backend",
                format!("unknown digest backend '{}', expected auto, crane or docker", s),
            )),
        }
    }
}

/// A single `key=value` annotation attached to a signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub key: String,
    pub value: String,
}

impl Annotation {
    /// Render as the `key=value` form the signer expects after `-a`
    pub fn as_pair(&self) -> String {
        format!("{}={}", self.key, self.value)
    }
}

impl std::fmt::Display for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Parse a comma-separated annotation list such as `"a=1, b=2"`.
///
/// Every entry must contain exactly one `=` and a non-empty key. Blank
/// entries (including an entirely blank input) are skipped.
pub fn parse_annotations(input: &str) -> Result<Vec<Annotation>> {
    let mut annotations = Vec::new();

    for (i, raw) in input.split(',').enumerate() {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }

        if entry.matches('=').count() != 1 {
            return Err(ConfigError::invalid(
                format!("annotations[{}]", i),
                format!("'{}' must be a single key=value pair", entry),
            ));
        }

        let (key, value) = entry.split_once('=').unwrap_or((entry, ""));
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::invalid(
                format!("annotations[{}]", i),
                format!("'{}' has an empty key", entry),
            ));
        }

        annotations.push(Annotation {
            key: key.to_string(),
            value: value.trim().to_string(),
        });
    }

    Ok(annotations)
}
