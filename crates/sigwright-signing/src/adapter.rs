//! Version-correct argument vectors
//!
//! [`VersionAdapter::build`] is a pure function of the detected version,
//! the request, the trust mode and the already-resolved parts (digest,
//! key file, identity policy). It never touches the filesystem: auxiliary
//! documents it needs are returned in the plan for the caller to write.

use std::path::{Path, PathBuf};

use sigwright_core::TrustMode;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::digest::ArtifactDigestReference;
use crate::error::{ConfigurationError, Result};
use crate::identity::{IdentityPolicy, Matcher};
use crate::request::{Operation, SigningRequest, Target};
use crate::version::{Capabilities, LogUploadSwitch, ToolVersion};

/// File name of the inline private signing configuration
pub const SIGNING_CONFIG_FILE: &str = "signing-config.json";

/// Media type of the inline signing configuration document
pub const SIGNING_CONFIG_MEDIA_TYPE: &str = "application/vnd.dev.sigstore.signingconfig.v0.2+json";

const REDACTED: &str = "<redacted>";

/// Values produced by earlier pipeline stages
#[derive(Debug, Default, Clone, Copy)]
pub struct Resolved<'a> {
    /// Digest-qualified reference, for image targets
    pub reference: Option<&'a ArtifactDigestReference>,
    /// Materialized key file, in key mode
    pub key_path: Option<&'a Path>,
    pub password: Option<&'a str>,
    /// Matching predicates, for keyless verification
    pub identity: Option<&'a IdentityPolicy>,
    /// Identity token, for keyless signing
    pub identity_token: Option<&'a str>,
}

/// A document the signer reads from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Everything needed to run the signer once
#[derive(Debug, Default)]
pub struct CommandPlan {
    pub args: Vec<String>,
    /// Child-process environment additions
    pub env: Vec<(String, Zeroizing<String>)>,
    pub aux_files: Vec<AuxFile>,
    pub warnings: Vec<String>,
}

impl CommandPlan {
    /// Arguments with secret values masked, for logs and dry runs
    pub fn redacted_args(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.args.len());
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                out.push(REDACTED.to_string());
                mask_next = false;
            } else if let Some((flag, _)) = arg.split_once('=').filter(|(f, _)| *f == "--identity-token") {
                out.push(format!("{}={}", flag, REDACTED));
            } else {
                mask_next = arg == "--identity-token";
                out.push(arg.clone());
            }
        }
        out
    }

    /// Environment variable names, values omitted
    pub fn env_names(&self) -> Vec<&str> {
        self.env.iter().map(|(k, _)| k.as_str()).collect()
    }

    fn flag(&mut self, flag: &str) {
        self.args.push(flag.to_string());
    }

    fn opt(&mut self, flag: &str, value: impl Into<String>) {
        self.args.push(flag.to_string());
        self.args.push(value.into());
    }

    fn path(&mut self, flag: &str, value: &Path) {
        self.opt(flag, value.display().to_string());
    }

    fn set_env(&mut self, name: &str, value: &str) {
        self.env.push((name.to_string(), Zeroizing::new(value.to_string())));
    }
}

/// Translates requests into arguments for one signer version
#[derive(Debug, Clone, Copy)]
pub struct VersionAdapter {
    caps: Capabilities,
}

impl VersionAdapter {
    pub fn new(version: ToolVersion) -> Self {
        Self {
            caps: version.capabilities(),
        }
    }

    pub fn version(&self) -> ToolVersion {
        self.caps.version
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Signer subcommand for a request
    pub fn subcommand(request: &SigningRequest) -> &'static str {
        match (request.operation, request.target.is_image()) {
            (Operation::Sign, true) => "sign",
            (Operation::Sign, false) => "sign-blob",
            (Operation::Verify, true) => "verify",
            (Operation::Verify, false) => "verify-blob",
            (Operation::Attest, _) => "attest",
            (Operation::VerifyAttestation, _) => "verify-attestation",
        }
    }

    /// Reject combinations this version cannot express.
    ///
    /// Runs before any secret is materialized.
    pub fn check(&self, request: &SigningRequest, mode: TrustMode) -> Result<()> {
        let unsupported = |capability: &str| -> crate::SigningError {
            ConfigurationError::UnsupportedCapability {
                version: self.caps.version,
                capability: capability.to_string(),
            }
            .into()
        };

        if !request.annotations.is_empty() {
            if !request.target.is_image() {
                return Err(unsupported("annotations on blob signatures"));
            }
            if request.operation.is_attestation() && !self.caps.attestation_annotations {
                return Err(unsupported("annotations on attestations"));
            }
        }

        if request.private_infrastructure && mode == TrustMode::Keyless {
            let expressible = if request.operation.produces_signature() {
                // Keyless signing without a public log needs the typed switch
                // or an inline signing configuration
                self.caps.log_upload_switch != LogUploadSwitch::Legacy
            } else {
                self.caps.private_infrastructure_verify
            };
            if !expressible {
                return Err(unsupported("private infrastructure in keyless mode"));
            }
        }

        if let Target::Blob { certificate, .. } = &request.target {
            match mode {
                TrustMode::Keyless if certificate.is_none() => {
                    return Err(ConfigurationError::MissingParameter {
                        parameter: "certificate".to_string(),
                        hint: "keyless blob signatures need a certificate file path".to_string(),
                    }
                    .into())
                }
                TrustMode::Key if certificate.is_some() => {
                    return Err(ConfigurationError::InvalidParameter {
                        parameter: "certificate".to_string(),
                        reason: "certificate files only apply in keyless mode".to_string(),
                    }
                    .into())
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Build the argument vector and environment
    pub fn build(
        &self,
        request: &SigningRequest,
        mode: TrustMode,
        resolved: &Resolved<'_>,
        scratch: &Path,
    ) -> Result<CommandPlan> {
        self.check(request, mode)?;

        let mut plan = CommandPlan::default();
        plan.flag(Self::subcommand(request));

        if request.operation.produces_signature() {
            self.signing_args(&mut plan, request, mode, resolved, scratch)?;
        } else {
            self.verification_args(&mut plan, request, mode, resolved)?;
        }

        for annotation in &request.annotations {
            plan.opt("-a", annotation.as_pair());
        }

        match &request.target {
            Target::Image { .. } => {
                let reference = resolved.reference.ok_or_else(|| missing("digest reference"))?;
                plan.args.push(reference.to_string());
            }
            Target::Blob { path, .. } => plan.args.push(path.display().to_string()),
        }

        debug!(
            version = %self.caps.version,
            mode = %mode,
            args = ?plan.redacted_args(),
            env = ?plan.env_names(),
            "built signer command"
        );
        Ok(plan)
    }

    fn signing_args(
        &self,
        plan: &mut CommandPlan,
        request: &SigningRequest,
        mode: TrustMode,
        resolved: &Resolved<'_>,
        scratch: &Path,
    ) -> Result<()> {
        match mode {
            TrustMode::Key => {
                let key = resolved.key_path.ok_or_else(|| missing("key"))?;
                plan.path("--key", key);
                plan.set_env("COSIGN_PASSWORD", resolved.password.unwrap_or(""));
            }
            TrustMode::Keyless => {
                let token = resolved.identity_token.ok_or_else(|| missing("identity token"))?;
                plan.opt("--identity-token", token);
                if let Some(url) = &request.endpoints.fulcio_url {
                    plan.opt("--fulcio-url", url);
                }
                if let Some(url) = &request.endpoints.rekor_url {
                    plan.opt("--rekor-url", url);
                }
                if let Some(url) = &request.endpoints.oidc_issuer {
                    plan.opt("--oidc-issuer", url);
                }
                if self.caps.keyless_requires_experimental {
                    plan.set_env("COSIGN_EXPERIMENTAL", "1");
                }
            }
        }

        if self.caps.skip_confirmation {
            plan.flag("--yes");
        }

        if let Operation::Attest = request.operation {
            let predicate = request.predicate_file.as_deref().ok_or_else(|| missing("predicate"))?;
            plan.path("--predicate", predicate);
            if let Some(kind) = &request.predicate_type {
                plan.opt("--type", kind);
            }
        }

        let legacy_outputs = !request.target.is_image();
        if let Target::Blob {
            signature,
            certificate,
            ..
        } = &request.target
        {
            plan.path("--output-signature", signature);
            if let (TrustMode::Keyless, Some(certificate)) = (mode, certificate) {
                plan.path("--output-certificate", certificate);
            }
        }

        if self.caps.signing_config {
            let explicit_endpoints = mode == TrustMode::Keyless && !request.endpoints.is_empty();
            let opt_out = explicit_endpoints || legacy_outputs;
            if opt_out {
                plan.flag("--use-signing-config=false");
                if legacy_outputs {
                    plan.flag("--new-bundle-format=false");
                }
                if request.private_infrastructure {
                    plan.flag(self.caps.log_upload_switch.disable_flag());
                }
            } else if request.private_infrastructure {
                let path = scratch.join(SIGNING_CONFIG_FILE);
                plan.path("--signing-config", &path);
                plan.aux_files.push(AuxFile {
                    path,
                    contents: private_signing_config(),
                });
            }
        } else if request.private_infrastructure {
            plan.flag(self.caps.log_upload_switch.disable_flag());
        }

        Ok(())
    }

    fn verification_args(
        &self,
        plan: &mut CommandPlan,
        request: &SigningRequest,
        mode: TrustMode,
        resolved: &Resolved<'_>,
    ) -> Result<()> {
        match mode {
            TrustMode::Key => {
                let key = resolved.key_path.ok_or_else(|| missing("public key"))?;
                plan.path("--key", key);
                if request.private_infrastructure {
                    if self.caps.skip_transparency_on_verify {
                        plan.flag("--insecure-ignore-tlog=true");
                    } else {
                        let message = format!(
                            "signer {} has no switch to skip the transparency log during key verification",
                            self.caps.version
                        );
                        warn!("{}", message);
                        plan.warnings.push(message);
                    }
                }
            }
            TrustMode::Keyless => {
                let identity = resolved.identity.ok_or_else(|| missing("identity policy"))?;
                match &identity.issuer {
                    Matcher::Exact(v) => plan.opt("--certificate-oidc-issuer", v),
                    Matcher::Pattern(_) if !self.caps.issuer_pattern => {
                        return Err(ConfigurationError::UnsupportedCapability {
                            version: self.caps.version,
                            capability: "pattern-based issuer matching".to_string(),
                        }
                        .into())
                    }
                    Matcher::Pattern(v) => plan.opt("--certificate-oidc-issuer-regexp", v),
                }
                plan.warnings.extend(identity.warnings.iter().cloned());
                match &identity.subject {
                    Some(Matcher::Exact(v)) => plan.opt("--certificate-identity", v),
                    Some(Matcher::Pattern(v)) if !self.caps.subject_pattern => {
                        let message = format!(
                            "signer {} cannot match subject pattern {}; verifying issuer only",
                            self.caps.version, v
                        );
                        warn!("{}", message);
                        plan.warnings.push(message);
                    }
                    Some(Matcher::Pattern(v)) => plan.opt("--certificate-identity-regexp", v),
                    None => {}
                }

                if let Some(url) = &request.endpoints.rekor_url {
                    plan.opt("--rekor-url", url);
                }
                if request.private_infrastructure {
                    plan.flag("--private-infrastructure=true");
                }
                if self.caps.keyless_requires_experimental {
                    plan.set_env("COSIGN_EXPERIMENTAL", "1");
                }
            }
        }

        if let Operation::VerifyAttestation = request.operation {
            if let Some(kind) = &request.predicate_type {
                plan.opt("--type", kind);
            }
        }

        if let Target::Blob {
            signature,
            certificate,
            ..
        } = &request.target
        {
            plan.path("--signature", signature);
            if let (TrustMode::Keyless, Some(certificate)) = (mode, certificate) {
                plan.path("--certificate", certificate);
            }
        }

        Ok(())
    }
}

fn missing(parameter: &str) -> crate::SigningError {
    ConfigurationError::MissingParameter {
        parameter: parameter.to_string(),
        hint: "it must be resolved before the command is built".to_string(),
    }
    .into()
}

/// Signing configuration that names no external service
pub fn private_signing_config() -> String {
    serde_json::json!({
        "mediaType": SIGNING_CONFIG_MEDIA_TYPE,
        "caUrls": [],
        "oidcUrls": [],
        "rekorTlogUrls": [],
        "tsaUrls": [],
        "rekorTlogConfig": { "selector": "ANY" },
        "tsaConfig": { "selector": "ANY" },
    })
    .to_string()
}
