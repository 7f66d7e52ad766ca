//! Error types for signing orchestration
//!
//! Four categories, each its own enum, wrapped by [`SigningError`]:
//! configuration, secret material, identity matching, and signer execution.

use std::path::PathBuf;
use thiserror::Error;

use crate::version::ToolVersion;

/// Result type alias for signing operations
pub type Result<T> = std::result::Result<T, SigningError>;

/// Top-level signing error
#[derive(Debug, Error)]
pub enum SigningError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl From<sigwright_core::ConfigError> for SigningError {
    fn from(err: sigwright_core::ConfigError) -> Self {
        Self::Configuration(ConfigurationError::Config(err))
    }
}

/// Error category, used for exit-code mapping and summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Secret,
    Identity,
    Execution,
}

impl SigningError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Secret(_) => ErrorKind::Secret,
            Self::Identity(_) => ErrorKind::Identity,
            Self::Execution(_) => ErrorKind::Execution,
        }
    }

    /// Exit code reported by the signer, when this error carries one
    pub fn signer_exit_code(&self) -> Option<i32> {
        match self {
            Self::Execution(ExecutionError::Failed { code, .. }) => *code,
            _ => None,
        }
    }
}

/// Missing or invalid parameters, unsupported versions, unreachable collaborators
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration file or value error
    #[error(transparent)]
    Config(#[from] sigwright_core::ConfigError),

    /// A required parameter was not supplied
    #[error("Missing required parameter '{parameter}': {hint}")]
    MissingParameter { parameter: String, hint: String },

    /// A parameter was supplied where it does not apply
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },

    /// Key material and keyless mode were both requested
    #[error("Key material is configured ({variable}) but keyless mode was requested; choose one trust mode")]
    ConflictingTrustModes { variable: String },

    /// Keyless signing without a reachable identity token
    #[error("Keyless signing requires an identity token, but none of {} is set. Run inside a job with OIDC tokens enabled or switch to key mode", .sources.join(", "))]
    MissingIdentityToken { sources: Vec<String> },

    /// The signer reported a major version this tool does not drive
    #[error("Unsupported signer version '{reported}': only major versions 1, 2 and 3 are supported")]
    UnsupportedVersion { reported: String },

    /// A requested capability has no equivalent on the detected signer version
    #[error("{capability} is not supported by signer {version}")]
    UnsupportedCapability {
        version: ToolVersion,
        capability: String,
    },

    /// A collaborating executable was not found
    #[error("Tool not found: {tool}. {hint}")]
    ToolNotFound { tool: String, hint: String },

    /// Could not determine the signer version
    #[error("Could not determine signer version: {0}")]
    VersionQuery(String),

    /// Neither digest inspection backend can be used
    #[error("No image inspection backend available: install crane or docker")]
    NoDigestBackend,

    /// The digest backend ran but did not produce a digest
    #[error("Digest lookup with {backend} failed for {reference}: {reason}")]
    DigestLookup {
        backend: String,
        reference: String,
        reason: String,
    },

    /// IO error while preparing auxiliary files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Missing, empty or undecodable key material
#[derive(Debug, Error)]
pub enum SecretError {
    /// No key material configured
    #[error("Key material not found: set {variable} to the base64-encoded key")]
    Missing { variable: String },

    /// The configured value is not valid base64
    #[error("Key material in {variable} is not valid base64: {reason}")]
    Undecodable { variable: String, reason: String },

    /// The configured value decoded to nothing
    #[error("Key material in {variable} is empty after decoding")]
    Empty { variable: String },

    /// Writing or restricting the decoded key failed
    #[error("Failed to materialize key at {path}: {source}")]
    Materialize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scratch directory could not be created
    #[error("Failed to create secret scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
}

/// Unresolved or contradictory identity-matching parameters
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No usable issuer/subject claim could be resolved
    #[error("Cannot verify keyless signature on signer {version}: no {missing} to match. Pass --certificate-oidc-issuer/--certificate-identity (or their -regexp forms), or run where {org_env} and {project_env} are set so they can be derived")]
    Unresolved {
        version: ToolVersion,
        missing: String,
        org_env: String,
        project_env: String,
    },

    /// Pattern issuer matching requested on a signer that lacks it
    #[error("Signer {version} cannot match the certificate issuer by pattern; pass an exact --certificate-oidc-issuer instead")]
    PatternIssuerUnsupported { version: ToolVersion },

    /// Pattern subject matching requested on a signer that lacks it, in strict mode
    #[error("Signer {version} cannot match the certificate subject by pattern and strict identity checking is enabled")]
    PatternSubjectUnsupported { version: ToolVersion },

    /// A pattern failed to compile
    #[error("Invalid {field} pattern '{pattern}': {reason}")]
    InvalidPattern {
        field: String,
        pattern: String,
        reason: String,
    },
}

/// Non-zero result from the signer
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The signer could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The signer exited unsuccessfully
    #[error("{program} {operation} failed with {}", .code.map(|c| format!("exit code {}", c)).unwrap_or_else(|| "a signal".to_string()))]
    Failed {
        program: String,
        operation: String,
        code: Option<i32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err: SigningError = SecretError::Empty {
            variable: "COSIGN_PRIVATE_KEY".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Secret);
        assert_eq!(err.signer_exit_code(), None);
    }

    #[test]
    fn test_execution_exit_code() {
        let err: SigningError = ExecutionError::Failed {
            program: "cosign".to_string(),
            operation: "verify".to_string(),
            code: Some(12),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(err.signer_exit_code(), Some(12));
        assert!(err.to_string().contains("exit code 12"));
    }

    #[test]
    fn test_unresolved_names_both_remediations() {
        let err = IdentityError::Unresolved {
            version: ToolVersion::V2,
            missing: "issuer".to_string(),
            org_env: "CIRCLE_ORGANIZATION_ID".to_string(),
            project_env: "CIRCLE_PROJECT_ID".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("--certificate-oidc-issuer"));
        assert!(msg.contains("CIRCLE_ORGANIZATION_ID"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: SigningError = sigwright_core::ConfigError::MissingField("x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
