//! Default configuration values

use super::types::Config;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "sigwright.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "sigwright.yaml";

/// Default signer binary
pub const DEFAULT_SIGNER: &str = "cosign";

pub const DEFAULT_PRIVATE_KEY_ENV: &str = "COSIGN_PRIVATE_KEY";
pub const DEFAULT_PUBLIC_KEY_ENV: &str = "COSIGN_PUBLIC_KEY";
pub const DEFAULT_PASSWORD_ENV: &str = "COSIGN_PASSWORD";

/// Identity token variables, newest first
pub const DEFAULT_TOKEN_ENVS: &[&str] = &["CIRCLE_OIDC_TOKEN_V2", "CIRCLE_OIDC_TOKEN"];

pub const DEFAULT_ORGANIZATION_ID_ENV: &str = "CIRCLE_ORGANIZATION_ID";
pub const DEFAULT_PROJECT_ID_ENV: &str = "CIRCLE_PROJECT_ID";

/// Issuer prefix; the organization id is appended as `/org/<id>`
pub const DEFAULT_ISSUER_BASE: &str = "https://oidc.circleci.com";

/// Subject prefix; the project id is appended as `/projects/<id>/pipeline-definitions/.*`
pub const DEFAULT_SUBJECT_BASE: &str = "https://circleci.com/api/v2";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".sigwright.toml",
        ".sigwright.yaml",
    ]
}

/// Generate default configuration TOML
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&Config::default()).unwrap_or_default()
}
