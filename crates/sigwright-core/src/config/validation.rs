//! Configuration validation

use tracing::debug;
use url::Url;

use crate::error::{ConfigError, Result};
use crate::types::{parse_annotations, TrustMode};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_signer(config)?;
    validate_signing(config)?;
    validate_keyless(config)?;
    validate_identity(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_signer(config: &Config) -> Result<()> {
    if config.signer.path.trim().is_empty() {
        return Err(ConfigError::invalid(
            "signer.path",
            "signer path cannot be empty",
        ));
    }
    Ok(())
}

fn validate_signing(config: &Config) -> Result<()> {
    if let Some(annotations) = &config.signing.annotations {
        parse_annotations(annotations)?;
    }

    for (field, value) in [
        ("signing.private_key_env", &config.signing.private_key_env),
        ("signing.public_key_env", &config.signing.public_key_env),
        ("signing.password_env", &config.signing.password_env),
    ] {
        if value.is_empty() {
            return Err(ConfigError::invalid(field, "variable name cannot be empty"));
        }
    }

    Ok(())
}

fn validate_keyless(config: &Config) -> Result<()> {
    if config.signing.mode == Some(TrustMode::Key) && config.keyless.has_endpoint_overrides() {
        return Err(ConfigError::invalid(
            "keyless",
            "service endpoint overrides only apply in keyless mode",
        ));
    }

    for (field, value) in [
        ("keyless.fulcio_url", &config.keyless.fulcio_url),
        ("keyless.rekor_url", &config.keyless.rekor_url),
        ("keyless.oidc_issuer", &config.keyless.oidc_issuer),
    ] {
        if let Some(value) = value {
            validate_url(field, value)?;
        }
    }

    Ok(())
}

fn validate_identity(config: &Config) -> Result<()> {
    let identity = &config.identity;
    validate_url("identity.issuer_base", &identity.issuer_base)?;
    validate_url("identity.subject_base", &identity.subject_base)?;

    if identity.organization_id_env.is_empty() || identity.project_id_env.is_empty() {
        return Err(ConfigError::invalid(
            "identity",
            "ambient identifier variable names cannot be empty",
        ));
    }

    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::invalid(field, format!("'{}' is not a valid URL: {}", value, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            field,
            format!("'{}' must use http or https", value),
        ));
    }

    Ok(())
}
