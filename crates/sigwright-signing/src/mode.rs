//! Trust-mode resolution
//!
//! Runs before the signer is queried and before any secret is decoded, so
//! an invalid combination never leaves a key file behind.

use sigwright_core::TrustMode;
use tracing::{debug, info};

use crate::context::InvocationContext;
use crate::error::{ConfigurationError, Result, SecretError};
use crate::request::SigningRequest;

/// Picks exactly one trust path for a request
#[derive(Debug, Default, Clone, Copy)]
pub struct ModeResolver;

impl ModeResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, request: &SigningRequest, ctx: &InvocationContext) -> Result<TrustMode> {
        let has_key = ctx.key.is_some();

        let mode = match request.mode {
            Some(TrustMode::Key) if !has_key => {
                return Err(SecretError::Missing {
                    variable: ctx.key_variable.clone(),
                }
                .into())
            }
            Some(TrustMode::Keyless) if has_key => {
                return Err(ConfigurationError::ConflictingTrustModes {
                    variable: ctx.key_variable.clone(),
                }
                .into())
            }
            Some(mode) => mode,
            None if has_key => {
                debug!(variable = %ctx.key_variable, "key material present, inferring key mode");
                TrustMode::Key
            }
            None => TrustMode::Keyless,
        };

        match mode {
            TrustMode::Key => {
                if !request.endpoints.is_empty() {
                    return Err(ConfigurationError::InvalidParameter {
                        parameter: "endpoints".to_string(),
                        reason: "service endpoint overrides only apply in keyless mode".to_string(),
                    }
                    .into());
                }
            }
            TrustMode::Keyless => {
                if request.operation.produces_signature() && ctx.identity_token.is_none() {
                    return Err(ConfigurationError::MissingIdentityToken {
                        sources: ctx.token_variables.clone(),
                    }
                    .into());
                }
            }
        }

        info!(mode = %mode, operation = %request.operation, "resolved trust mode");
        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EncodedKey, IdentityToken};
    use crate::request::{Endpoints, Operation, Target};
    use crate::SigningError;
    use zeroize::Zeroizing;

    fn request(operation: Operation) -> SigningRequest {
        SigningRequest::new(operation, Target::image("registry/img:v1").unwrap())
    }

    fn ctx(key: bool, token: bool) -> InvocationContext {
        InvocationContext {
            key: key.then(|| EncodedKey {
                variable: "COSIGN_PRIVATE_KEY".to_string(),
                value: Zeroizing::new("a2V5".to_string()),
            }),
            key_variable: "COSIGN_PRIVATE_KEY".to_string(),
            identity_token: token.then(|| IdentityToken {
                variable: "CIRCLE_OIDC_TOKEN_V2".to_string(),
                value: Zeroizing::new("token".to_string()),
            }),
            token_variables: vec!["CIRCLE_OIDC_TOKEN_V2".to_string(), "CIRCLE_OIDC_TOKEN".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_inferred_from_key_presence() {
        let r = ModeResolver::new();
        assert_eq!(r.resolve(&request(Operation::Sign), &ctx(true, false)).unwrap(), TrustMode::Key);
        assert_eq!(
            r.resolve(&request(Operation::Sign), &ctx(false, true)).unwrap(),
            TrustMode::Keyless
        );
    }

    #[test]
    fn test_explicit_key_without_material() {
        let err = ModeResolver::new()
            .resolve(&request(Operation::Sign).with_mode(TrustMode::Key), &ctx(false, true))
            .unwrap_err();
        assert!(matches!(err, SigningError::Secret(SecretError::Missing { .. })));
    }

    #[test]
    fn test_keyless_with_key_material_conflicts() {
        let err = ModeResolver::new()
            .resolve(&request(Operation::Sign).with_mode(TrustMode::Keyless), &ctx(true, true))
            .unwrap_err();
        assert!(matches!(
            err,
            SigningError::Configuration(ConfigurationError::ConflictingTrustModes { .. })
        ));
    }

    #[test]
    fn test_keyless_sign_needs_token() {
        let err = ModeResolver::new()
            .resolve(&request(Operation::Attest), &ctx(false, false))
            .unwrap_err();
        assert!(err.to_string().contains("CIRCLE_OIDC_TOKEN_V2"));
    }

    #[test]
    fn test_keyless_verify_needs_no_token() {
        let mode = ModeResolver::new()
            .resolve(&request(Operation::Verify), &ctx(false, false))
            .unwrap();
        assert_eq!(mode, TrustMode::Keyless);
    }

    #[test]
    fn test_endpoints_rejected_in_key_mode() {
        let req = request(Operation::Sign).with_endpoints(Endpoints {
            rekor_url: Some("https://rekor.internal".to_string()),
            ..Default::default()
        });
        let err = ModeResolver::new().resolve(&req, &ctx(true, false)).unwrap_err();
        assert!(matches!(
            err,
            SigningError::Configuration(ConfigurationError::InvalidParameter { .. })
        ));
    }
}
