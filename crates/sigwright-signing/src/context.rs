//! Ambient values the caller hands to the pipeline
//!
//! Environment variables are read once, here, into an explicit value. The
//! rest of the crate never touches the process environment.

use sigwright_core::Config;
use zeroize::Zeroizing;

use crate::request::Operation;

/// Encoded key material together with the variable it came from
pub struct EncodedKey {
    pub variable: String,
    pub value: Zeroizing<String>,
}

/// Identity token together with the variable it came from
pub struct IdentityToken {
    pub variable: String,
    pub value: Zeroizing<String>,
}

/// Secret and ambient inputs for one invocation
#[derive(Default)]
pub struct InvocationContext {
    /// Base64 private key (sign/attest) or public key (verify)
    pub key: Option<EncodedKey>,
    /// Variable name the key would have been read from, for diagnostics
    pub key_variable: String,
    pub password: Option<Zeroizing<String>>,
    pub identity_token: Option<IdentityToken>,
    /// Variables searched for the identity token, for diagnostics
    pub token_variables: Vec<String>,
    pub organization_id: Option<String>,
    pub project_id: Option<String>,
    pub organization_id_variable: String,
    pub project_id_variable: String,
}

impl InvocationContext {
    /// Read every ambient input for `operation` from the process environment
    pub fn from_env(config: &Config, operation: Operation) -> Self {
        Self::from_lookup(config, operation, |name| std::env::var(name).ok())
    }

    /// Same as [`InvocationContext::from_env`] with an explicit variable lookup
    pub fn from_lookup<F>(config: &Config, operation: Operation, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let key_variable = if operation.produces_signature() {
            config.signing.private_key_env.clone()
        } else {
            config.signing.public_key_env.clone()
        };

        // An empty key variable is kept so it surfaces as an "empty" error
        // rather than silently switching to keyless
        let key = lookup(&key_variable).map(|value| EncodedKey {
            variable: key_variable.clone(),
            value: Zeroizing::new(value),
        });

        let identity_token = config.keyless.token_env.iter().find_map(|name| {
            non_empty(name).map(|value| IdentityToken {
                variable: name.clone(),
                value: Zeroizing::new(value),
            })
        });

        Self {
            key,
            key_variable,
            password: lookup(&config.signing.password_env).map(Zeroizing::new),
            identity_token,
            token_variables: config.keyless.token_env.clone(),
            organization_id: non_empty(&config.identity.organization_id_env),
            project_id: non_empty(&config.identity.project_id_env),
            organization_id_variable: config.identity.organization_id_env.clone(),
            project_id_variable: config.identity.project_id_env.clone(),
        }
    }

    /// Drop every secret this context still holds
    pub fn clear(&mut self) {
        self.key = None;
        self.password = None;
        self.identity_token = None;
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("key", &self.key.as_ref().map(|k| &k.variable))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "identity_token",
                &self.identity_token.as_ref().map(|t| &t.variable),
            )
            .field("organization_id", &self.organization_id)
            .field("project_id", &self.project_id)
            .finish()
    }
}
