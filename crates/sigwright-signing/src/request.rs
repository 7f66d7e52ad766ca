//! The signing request built once per call

use std::path::{Path, PathBuf};

use serde::Serialize;
use sigwright_core::{parse_annotations, Annotation, Config, TrustMode};

use crate::digest::ImageReference;
use crate::error::{ConfigurationError, Result};

/// Logical operation requested of the signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Sign,
    Verify,
    Attest,
    VerifyAttestation,
}

impl Operation {
    /// Whether the operation produces a signature or attestation
    pub fn produces_signature(&self) -> bool {
        matches!(self, Self::Sign | Self::Attest)
    }

    /// Whether the operation is an attestation flow
    pub fn is_attestation(&self) -> bool {
        matches!(self, Self::Attest | Self::VerifyAttestation)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sign => write!(f, "sign"),
            Self::Verify => write!(f, "verify"),
            Self::Attest => write!(f, "attest"),
            Self::VerifyAttestation => write!(f, "verify-attestation"),
        }
    }
}

/// What the operation targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// A container image reference (tag- or digest-qualified)
    Image { reference: ImageReference },
    /// A file on disk
    Blob {
        path: PathBuf,
        /// Signature file written by sign, read by verify
        signature: PathBuf,
        /// Certificate file written by keyless sign, read by keyless verify
        certificate: Option<PathBuf>,
    },
}

impl Target {
    pub fn image(reference: &str) -> Result<Self> {
        Ok(Self::Image {
            reference: ImageReference::parse(reference)?,
        })
    }

    pub fn blob(path: impl Into<PathBuf>, signature: impl Into<PathBuf>) -> Self {
        Self::Blob {
            path: path.into(),
            signature: signature.into(),
            certificate: None,
        }
    }

    /// Attach a certificate path to a blob target
    pub fn with_certificate(self, certificate: impl Into<PathBuf>) -> Self {
        match self {
            Self::Blob {
                path, signature, ..
            } => Self::Blob {
                path,
                signature,
                certificate: Some(certificate.into()),
            },
            image => image,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }

    /// Human-readable artifact reference
    pub fn artifact(&self) -> String {
        match self {
            Self::Image { reference } => reference.to_string(),
            Self::Blob { path, .. } => path.display().to_string(),
        }
    }
}

/// Service endpoint overrides (keyless only)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Endpoints {
    pub fulcio_url: Option<String>,
    pub rekor_url: Option<String>,
    pub oidc_issuer: Option<String>,
}

impl Endpoints {
    pub fn is_empty(&self) -> bool {
        self.fulcio_url.is_none() && self.rekor_url.is_none() && self.oidc_issuer.is_none()
    }
}

/// Explicit identity-matching parameters as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityParams {
    pub issuer: Option<String>,
    pub issuer_pattern: Option<String>,
    pub subject: Option<String>,
    pub subject_pattern: Option<String>,
}

/// A fully-specified request; immutable once built
#[derive(Debug, Clone, Serialize)]
pub struct SigningRequest {
    pub operation: Operation,
    pub target: Target,
    /// Requested trust mode; `None` lets the mode resolver infer it
    pub mode: Option<TrustMode>,
    pub predicate_file: Option<PathBuf>,
    pub predicate_type: Option<String>,
    pub annotations: Vec<Annotation>,
    pub private_infrastructure: bool,
    pub endpoints: Endpoints,
    pub identity: IdentityParams,
}

impl SigningRequest {
    /// Create a request with nothing but the operation and target set
    pub fn new(operation: Operation, target: Target) -> Self {
        Self {
            operation,
            target,
            mode: None,
            predicate_file: None,
            predicate_type: None,
            annotations: Vec::new(),
            private_infrastructure: false,
            endpoints: Endpoints::default(),
            identity: IdentityParams::default(),
        }
    }

    /// Build a request from loaded configuration
    pub fn from_config(operation: Operation, target: Target, config: &Config) -> Result<Self> {
        let annotations = match &config.signing.annotations {
            Some(raw) => parse_annotations(raw)?,
            None => Vec::new(),
        };

        let request = Self {
            mode: config.signing.mode,
            annotations,
            private_infrastructure: config.signing.private_infrastructure,
            endpoints: Endpoints {
                fulcio_url: config.keyless.fulcio_url.clone(),
                rekor_url: config.keyless.rekor_url.clone(),
                oidc_issuer: config.keyless.oidc_issuer.clone(),
            },
            identity: IdentityParams {
                issuer: config.identity.certificate_oidc_issuer.clone(),
                issuer_pattern: config.identity.certificate_oidc_issuer_regexp.clone(),
                subject: config.identity.certificate_identity.clone(),
                subject_pattern: config.identity.certificate_identity_regexp.clone(),
            },
            ..Self::new(operation, target)
        };
        Ok(request)
    }

    /// Set the trust mode
    pub fn with_mode(mut self, mode: TrustMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the attestation predicate
    pub fn with_predicate(mut self, file: impl Into<PathBuf>, predicate_type: Option<String>) -> Self {
        self.predicate_file = Some(file.into());
        self.predicate_type = predicate_type;
        self
    }

    /// Set the predicate type matched by verify-attestation
    pub fn with_predicate_type(mut self, predicate_type: impl Into<String>) -> Self {
        self.predicate_type = Some(predicate_type.into());
        self
    }

    /// Replace annotations from a comma-separated `key=value` list
    pub fn with_annotations(mut self, raw: &str) -> Result<Self> {
        self.annotations = parse_annotations(raw)?;
        Ok(self)
    }

    pub fn with_private_infrastructure(mut self, private: bool) -> Self {
        self.private_infrastructure = private;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_identity(mut self, identity: IdentityParams) -> Self {
        self.identity = identity;
        self
    }

    /// Structural checks that need no external state
    pub fn validate(&self) -> Result<()> {
        match self.operation {
            Operation::Attest => {
                let predicate = self.predicate_file.as_deref().ok_or_else(|| {
                    ConfigurationError::MissingParameter {
                        parameter: "predicate".to_string(),
                        hint: "attestations need a predicate file".to_string(),
                    }
                })?;
                require_file("predicate", predicate)?;
            }
            Operation::Sign | Operation::Verify => {
                if self.predicate_file.is_some() || self.predicate_type.is_some() {
                    return Err(ConfigurationError::InvalidParameter {
                        parameter: "predicate".to_string(),
                        reason: format!("{} does not take a predicate", self.operation),
                    }
                    .into());
                }
            }
            Operation::VerifyAttestation => {
                if self.predicate_file.is_some() {
                    return Err(ConfigurationError::InvalidParameter {
                        parameter: "predicate".to_string(),
                        reason: "verify-attestation matches on --type, not a predicate file"
                            .to_string(),
                    }
                    .into());
                }
            }
        }

        if self.operation.is_attestation() && !self.target.is_image() {
            return Err(ConfigurationError::InvalidParameter {
                parameter: "target".to_string(),
                reason: "attestations can only target images".to_string(),
            }
            .into());
        }

        if let Target::Blob { path, .. } = &self.target {
            require_file("blob", path)?;
        }

        if let Target::Blob {
            signature,
            certificate,
            ..
        } = &self.target
        {
            if !self.operation.produces_signature() {
                require_file("signature", signature)?;
                if let Some(certificate) = certificate {
                    require_file("certificate", certificate)?;
                }
            }
        }

        Ok(())
    }
}

fn require_file(parameter: &str, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(ConfigurationError::InvalidParameter {
            parameter: parameter.to_string(),
            reason: format!("{} does not exist or is not a file", path.display()),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SigningError;
    use tempfile::TempDir;

    #[test]
    fn test_from_config_parses_annotations() {
        let mut config = Config::default();
        config.signing.annotations = Some("a=1, b=2".to_string());
        let target = Target::image("registry/img:v1").unwrap();

        let request = SigningRequest::from_config(Operation::Sign, target, &config).unwrap();
        let pairs: Vec<_> = request.annotations.iter().map(|a| a.as_pair()).collect();
        assert_eq!(pairs, vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_bad_annotation_is_configuration_error() {
        let target = Target::image("registry/img:v1").unwrap();
        let err = SigningRequest::new(Operation::Sign, target)
            .with_annotations("bad")
            .unwrap_err();
        assert!(matches!(err, SigningError::Configuration(_)));
    }

    #[test]
    fn test_attest_requires_predicate() {
        let target = Target::image("registry/img:v1").unwrap();
        let err = SigningRequest::new(Operation::Attest, target).validate().unwrap_err();
        assert!(matches!(
            err,
            SigningError::Configuration(ConfigurationError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_attest_rejects_blob() {
        let temp = TempDir::new().unwrap();
        let blob = temp.path().join("artifact.tar");
        let predicate = temp.path().join("sbom.json");
        std::fs::write(&blob, b"data").unwrap();
        std::fs::write(&predicate, b"{}").unwrap();

        let request = SigningRequest::new(
            Operation::Attest,
            Target::blob(&blob, temp.path().join("artifact.sig")),
        )
        .with_predicate(&predicate, None);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_verify_blob_requires_signature_file() {
        let temp = TempDir::new().unwrap();
        let blob = temp.path().join("artifact.tar");
        std::fs::write(&blob, b"data").unwrap();

        let request = SigningRequest::new(
            Operation::Verify,
            Target::blob(&blob, temp.path().join("missing.sig")),
        );
        assert!(request.validate().is_err());

        std::fs::write(temp.path().join("missing.sig"), b"sig").unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_sign_rejects_predicate() {
        let target = Target::image("registry/img:v1").unwrap();
        let request = SigningRequest::new(Operation::Sign, target).with_predicate("x.json", None);
        assert!(request.validate().is_err());
    }
}
