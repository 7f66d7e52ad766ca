//! Signer major versions and what each one can do
//!
//! Every version-dependent decision in the crate goes through
//! [`Capabilities::for_version`]; nothing else compares version numbers.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigurationError, Result};

/// Supported major versions of the signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ToolVersion {
    V1,
    V2,
    V3,
}

impl ToolVersion {
    /// Map a major version number to a supported variant
    pub fn from_major(major: u64) -> Result<Self> {
        match major {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            other => Err(ConfigurationError::UnsupportedVersion {
                reported: other.to_string(),
            }
            .into()),
        }
    }

    /// Parse the output of `cosign version`.
    ///
    /// Looks for the `GitVersion:` line (e.g. `GitVersion:    v2.4.1`) and
    /// falls back to the first token that looks like a version.
    pub fn parse_version_output(output: &str) -> Result<Self> {
        let raw = output
            .lines()
            .find_map(|line| line.trim().strip_prefix("GitVersion:"))
            .map(|v| v.trim().to_string())
            .or_else(|| {
                output
                    .split_whitespace()
                    .find(|t| t.trim_start_matches('v').starts_with(|c: char| c.is_ascii_digit()))
                    .map(|t| t.to_string())
            })
            .ok_or_else(|| {
                ConfigurationError::VersionQuery(format!(
                    "no version found in signer output: {}",
                    output.trim()
                ))
            })?;

        let major = parse_major(&raw).ok_or_else(|| ConfigurationError::UnsupportedVersion {
            reported: raw.clone(),
        })?;
        debug!(raw = %raw, major, "parsed signer version");
        Self::from_major(major)
    }

    /// Major version number
    pub fn major(&self) -> u64 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_version(*self)
    }
}

impl std::fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.major())
    }
}

fn parse_major(raw: &str) -> Option<u64> {
    let trimmed = raw.trim().trim_start_matches('v');
    if let Ok(version) = semver::Version::parse(trimmed) {
        return Some(version.major);
    }
    // Pre-release builds and `devel` strings are not always semver
    trimmed
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

/// How log upload is disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogUploadSwitch {
    /// `--no-tlog-upload`
    Legacy,
    /// `--tlog-upload=false`
    Typed,
}

impl LogUploadSwitch {
    pub fn disable_flag(&self) -> &'static str {
        match self {
            Self::Legacy => "--no-tlog-upload",
            Self::Typed => "--tlog-upload=false",
        }
    }
}

/// What a signer version accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub version: ToolVersion,
    pub log_upload_switch: LogUploadSwitch,
    /// Keyless operations need `COSIGN_EXPERIMENTAL=1`
    pub keyless_requires_experimental: bool,
    /// `--yes` skips the upload confirmation prompt
    pub skip_confirmation: bool,
    /// `--certificate-oidc-issuer-regexp`
    pub issuer_pattern: bool,
    /// `--certificate-identity-regexp`
    pub subject_pattern: bool,
    /// Keyless verification needs a subject claim in addition to the issuer
    pub subject_required: bool,
    /// `--insecure-ignore-tlog=true` on key-based verification
    pub skip_transparency_on_verify: bool,
    /// `--private-infrastructure=true` on keyless verification
    pub private_infrastructure_verify: bool,
    /// Managed signing configuration (`--use-signing-config`, `--signing-config`)
    pub signing_config: bool,
    /// `-a` on attest and verify-attestation
    pub attestation_annotations: bool,
}

impl Capabilities {
    /// The single capability table
    pub fn for_version(version: ToolVersion) -> Self {
        match version {
            ToolVersion::V1 => Self {
                version,
                log_upload_switch: LogUploadSwitch::Legacy,
                keyless_requires_experimental: true,
                skip_confirmation: false,
                issuer_pattern: false,
                subject_pattern: false,
                subject_required: false,
                skip_transparency_on_verify: false,
                private_infrastructure_verify: false,
                signing_config: false,
                attestation_annotations: false,
            },
            ToolVersion::V2 => Self {
                version,
                log_upload_switch: LogUploadSwitch::Typed,
                keyless_requires_experimental: false,
                skip_confirmation: true,
                issuer_pattern: true,
                subject_pattern: true,
                subject_required: true,
                skip_transparency_on_verify: true,
                private_infrastructure_verify: true,
                signing_config: false,
                attestation_annotations: false,
            },
            ToolVersion::V3 => Self {
                version,
                log_upload_switch: LogUploadSwitch::Typed,
                keyless_requires_experimental: false,
                skip_confirmation: true,
                issuer_pattern: true,
                subject_pattern: true,
                subject_required: true,
                skip_transparency_on_verify: true,
                private_infrastructure_verify: true,
                signing_config: true,
                attestation_annotations: false,
            },
        }
    }

    /// Every long flag this version accepts, for checking generated commands
    pub fn known_flags(&self) -> Vec<&'static str> {
        let mut flags = vec![
            "--key",
            "--yes",
            "-a",
            "--identity-token",
            "--fulcio-url",
            "--rekor-url",
            "--oidc-issuer",
            "--output-signature",
            "--output-certificate",
            "--signature",
            "--certificate",
            "--predicate",
            "--type",
            "--certificate-identity",
            "--certificate-oidc-issuer",
            self.log_upload_switch.disable_flag(),
        ];
        if !self.skip_confirmation {
            flags.retain(|f| *f != "--yes");
        }
        if self.issuer_pattern {
            flags.push("--certificate-oidc-issuer-regexp");
        }
        if self.subject_pattern {
            flags.push("--certificate-identity-regexp");
        }
        if self.skip_transparency_on_verify {
            flags.push("--insecure-ignore-tlog=true");
        }
        if self.private_infrastructure_verify {
            flags.push("--private-infrastructure=true");
        }
        if self.signing_config {
            flags.extend([
                "--use-signing-config=false",
                "--new-bundle-format=false",
                "--signing-config",
            ]);
        }
        flags
    }
}
