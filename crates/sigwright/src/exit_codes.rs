//! Exit codes for the CLI
//!
//! Signer failures exit with the signer's own code.

use sigwright_signing::{ErrorKind, SigningError};

/// Success
pub const SUCCESS: i32 = 0;

/// General error, also used when the signer was killed by a signal
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Key material error
pub const SECRET_ERROR: i32 = 3;

/// Identity resolution error
pub const IDENTITY_ERROR: i32 = 4;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Marker error for an interrupted run
#[derive(Debug, thiserror::Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Map an error to the process exit code
pub fn for_error(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<Interrupted>().is_some() {
        return CANCELLED;
    }
    if let Some(signing) = err.downcast_ref::<SigningError>() {
        return match signing.kind() {
            ErrorKind::Configuration => CONFIG_ERROR,
            ErrorKind::Secret => SECRET_ERROR,
            ErrorKind::Identity => IDENTITY_ERROR,
            ErrorKind::Execution => signing.signer_exit_code().unwrap_or(ERROR),
        };
    }
    if err.downcast_ref::<sigwright_core::ConfigError>().is_some() {
        return CONFIG_ERROR;
    }
    ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigwright_signing::{ExecutionError, IdentityError, SecretError, ToolVersion};

    #[test]
    fn test_category_codes() {
        let secret = anyhow::Error::from(SigningError::from(SecretError::Empty {
            variable: "COSIGN_PRIVATE_KEY".to_string(),
        }));
        assert_eq!(for_error(&secret), SECRET_ERROR);

        let identity = anyhow::Error::from(SigningError::from(
            IdentityError::PatternIssuerUnsupported {
                version: ToolVersion::V1,
            },
        ));
        assert_eq!(for_error(&identity), IDENTITY_ERROR);

        let config = anyhow::Error::from(sigwright_core::ConfigError::MissingField(
            "signer.path".to_string(),
        ));
        assert_eq!(for_error(&config), CONFIG_ERROR);
    }

    #[test]
    fn test_signer_code_is_propagated() {
        let failed = |code| {
            anyhow::Error::from(SigningError::from(ExecutionError::Failed {
                program: "cosign".to_string(),
                operation: "verify".to_string(),
                code,
            }))
        };
        assert_eq!(for_error(&failed(Some(12))), 12);
        assert_eq!(for_error(&failed(None)), ERROR);
    }

    #[test]
    fn test_interrupt_and_context() {
        assert_eq!(for_error(&anyhow::Error::from(Interrupted)), CANCELLED);

        let wrapped = anyhow::Error::from(SigningError::from(SecretError::Missing {
            variable: "COSIGN_PRIVATE_KEY".to_string(),
        }))
        .context("signing failed");
        assert_eq!(for_error(&wrapped), SECRET_ERROR);
        assert_eq!(for_error(&anyhow::anyhow!("other")), ERROR);
    }
}
