//! Configuration types

use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::types::{DigestBackendKind, TrustMode};

/// Main configuration for sigwright
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Version of the config schema
    #[serde(rename = "$schema")]
    pub schema: Option<String>,

    /// External signer executable
    pub signer: SignerConfig,

    /// Trust mode and key material
    pub signing: SigningConfig,

    /// Identity-token source and service endpoints (keyless only)
    pub keyless: KeylessConfig,

    /// Certificate identity matching for keyless verification
    pub identity: IdentityConfig,

    /// Image digest resolution
    pub digest: DigestConfig,
}

/// External signer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Path or name of the signer binary
    pub path: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_SIGNER.to_string(),
        }
    }
}

/// Trust mode and key material configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Trust mode; when unset it is inferred from whether key material is present
    pub mode: Option<TrustMode>,

    /// Avoid every public certificate authority and transparency log
    pub private_infrastructure: bool,

    /// Comma-separated `key=value` annotations
    pub annotations: Option<String>,

    /// Environment variable holding the base64-encoded private key
    pub private_key_env: String,

    /// Environment variable holding the base64-encoded public key
    pub public_key_env: String,

    /// Environment variable holding the private key password
    pub password_env: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            mode: None,
            private_infrastructure: false,
            annotations: None,
            private_key_env: DEFAULT_PRIVATE_KEY_ENV.to_string(),
            public_key_env: DEFAULT_PUBLIC_KEY_ENV.to_string(),
            password_env: DEFAULT_PASSWORD_ENV.to_string(),
        }
    }
}

/// Keyless (identity-based) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeylessConfig {
    /// Environment variables searched, in order, for the identity token
    pub token_env: Vec<String>,

    /// Certificate authority URL override
    pub fulcio_url: Option<String>,

    /// Transparency log URL override
    pub rekor_url: Option<String>,

    /// OIDC issuer URL override used when requesting a certificate
    pub oidc_issuer: Option<String>,
}

impl Default for KeylessConfig {
    fn default() -> Self {
        Self {
            token_env: DEFAULT_TOKEN_ENVS.iter().map(|s| s.to_string()).collect(),
            fulcio_url: None,
            rekor_url: None,
            oidc_issuer: None,
        }
    }
}

impl KeylessConfig {
    /// Whether any service endpoint override is configured
    pub fn has_endpoint_overrides(&self) -> bool {
        self.fulcio_url.is_some() || self.rekor_url.is_some() || self.oidc_issuer.is_some()
    }
}

/// Identity matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Exact expected certificate subject
    pub certificate_identity: Option<String>,

    /// Pattern for the expected certificate subject
    pub certificate_identity_regexp: Option<String>,

    /// Exact expected certificate issuer
    pub certificate_oidc_issuer: Option<String>,

    /// Pattern for the expected certificate issuer
    pub certificate_oidc_issuer_regexp: Option<String>,

    /// Base URL the issuer is derived from
    pub issuer_base: String,

    /// Base URL the subject pattern is derived from
    pub subject_base: String,

    /// Environment variable holding the ambient organization id
    pub organization_id_env: String,

    /// Environment variable holding the ambient project id
    pub project_id_env: String,

    /// Fail instead of degrading to issuer-only verification on old signers
    pub strict: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            certificate_identity: None,
            certificate_identity_regexp: None,
            certificate_oidc_issuer: None,
            certificate_oidc_issuer_regexp: None,
            issuer_base: DEFAULT_ISSUER_BASE.to_string(),
            subject_base: DEFAULT_SUBJECT_BASE.to_string(),
            organization_id_env: DEFAULT_ORGANIZATION_ID_ENV.to_string(),
            project_id_env: DEFAULT_PROJECT_ID_ENV.to_string(),
            strict: false,
        }
    }
}

/// Digest resolution configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Inspection backend
    pub backend: DigestBackendKind,
}
