//! Certificate identity matching for keyless verification
//!
//! Explicit parameters win. Whatever side (issuer or subject) is left
//! unset is derived from the ambient CI organization and project ids.
//! The result is then gated by what the detected signer version can match.

use serde::Serialize;
use sigwright_core::config::IdentityConfig;
use tracing::{debug, warn};

use crate::context::InvocationContext;
use crate::error::{IdentityError, Result};
use crate::request::IdentityParams;
use crate::version::ToolVersion;

/// How one certificate claim is matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "match", content = "value", rename_all = "snake_case")]
pub enum Matcher {
    Exact(String),
    Pattern(String),
}

impl Matcher {
    pub fn value(&self) -> &str {
        match self {
            Self::Exact(v) | Self::Pattern(v) => v,
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern(_))
    }
}

/// Where a matcher came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSource {
    Explicit,
    Derived,
}

/// Resolved matching predicates for one verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityPolicy {
    pub issuer: Matcher,
    pub issuer_source: ClaimSource,
    /// `None` when the signer version verifies the issuer only
    pub subject: Option<Matcher>,
    pub subject_source: Option<ClaimSource>,
    /// Non-fatal degradations applied during resolution
    pub warnings: Vec<String>,
}

/// Derives [`IdentityPolicy`] values
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    issuer_base: String,
    subject_base: String,
    strict: bool,
}

impl IdentityResolver {
    pub fn new(issuer_base: impl Into<String>, subject_base: impl Into<String>) -> Self {
        Self {
            issuer_base: issuer_base.into(),
            subject_base: subject_base.into(),
            strict: false,
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(&config.issuer_base, &config.subject_base).with_strict(config.strict)
    }

    /// Fail instead of dropping an unsupported subject pattern
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// `<issuer-base>/org/<orgId>`
    pub fn derive_issuer(&self, organization_id: &str) -> String {
        format!("{}/org/{}", self.issuer_base.trim_end_matches('/'), organization_id)
    }

    /// `<subject-base>/projects/<projectId>/pipeline-definitions/.*`
    pub fn derive_subject_pattern(&self, project_id: &str) -> String {
        format!(
            "{}/projects/{}/pipeline-definitions/.*",
            self.subject_base.trim_end_matches('/'),
            project_id
        )
    }

    /// Resolve the matchers for `version`
    pub fn resolve(
        &self,
        version: ToolVersion,
        params: &IdentityParams,
        ctx: &InvocationContext,
    ) -> Result<IdentityPolicy> {
        let caps = version.capabilities();
        let mut warnings = Vec::new();

        let issuer = pick(
            params.issuer.as_deref(),
            params.issuer_pattern.as_deref(),
            || ctx.organization_id.as_deref().map(|id| Matcher::Exact(self.derive_issuer(id))),
        );
        let subject = pick(
            params.subject.as_deref(),
            params.subject_pattern.as_deref(),
            || {
                ctx.project_id
                    .as_deref()
                    .map(|id| Matcher::Pattern(self.derive_subject_pattern(id)))
            },
        );

        if let Some((matcher, _)) = &issuer {
            check_pattern("issuer", matcher)?;
            if matcher.is_pattern() && !caps.issuer_pattern {
                return Err(IdentityError::PatternIssuerUnsupported { version }.into());
            }
        }

        let subject = match subject {
            Some((matcher, source)) => {
                check_pattern("subject", &matcher)?;
                if matcher.is_pattern() && !caps.subject_pattern {
                    if self.strict {
                        return Err(IdentityError::PatternSubjectUnsupported { version }.into());
                    }
                    let message = format!(
                        "signer {} cannot match the certificate subject by pattern; verifying the issuer only",
                        version
                    );
                    warn!(pattern = matcher.value(), "{}", message);
                    warnings.push(message);
                    None
                } else {
                    Some((matcher, source))
                }
            }
            None => None,
        };

        let unresolved = |missing: &str| IdentityError::Unresolved {
            version,
            missing: missing.to_string(),
            org_env: ctx.organization_id_variable.clone(),
            project_env: ctx.project_id_variable.clone(),
        };

        let (issuer, issuer_source) = issuer.ok_or_else(|| unresolved("issuer"))?;
        if caps.subject_required && subject.is_none() {
            return Err(unresolved("subject").into());
        }

        let policy = IdentityPolicy {
            issuer,
            issuer_source,
            subject_source: subject.as_ref().map(|(_, s)| *s),
            subject: subject.map(|(m, _)| m),
            warnings,
        };
        debug!(?policy, "resolved identity policy");
        Ok(policy)
    }
}

/// Exact beats pattern, explicit beats derived
fn pick(
    exact: Option<&str>,
    pattern: Option<&str>,
    derive: impl FnOnce() -> Option<Matcher>,
) -> Option<(Matcher, ClaimSource)> {
    let exact = exact.filter(|v| !v.trim().is_empty());
    let pattern = pattern.filter(|v| !v.trim().is_empty());

    if let Some(value) = exact {
        if pattern.is_some() {
            debug!(exact = value, "exact identity value overrides pattern");
        }
        return Some((Matcher::Exact(value.to_string()), ClaimSource::Explicit));
    }
    if let Some(value) = pattern {
        return Some((Matcher::Pattern(value.to_string()), ClaimSource::Explicit));
    }
    derive().map(|m| (m, ClaimSource::Derived))
}

fn check_pattern(field: &str, matcher: &Matcher) -> Result<()> {
    if let Matcher::Pattern(pattern) = matcher {
        regex::Regex::new(pattern).map_err(|e| IdentityError::InvalidPattern {
            field: field.to_string(),
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SigningError;

    fn resolver() -> IdentityResolver {
        IdentityResolver::from_config(&IdentityConfig::default())
    }

    fn ambient(org: Option<&str>, project: Option<&str>) -> InvocationContext {
        InvocationContext {
            organization_id: org.map(String::from),
            project_id: project.map(String::from),
            organization_id_variable: "CIRCLE_ORGANIZATION_ID".to_string(),
            project_id_variable: "CIRCLE_PROJECT_ID".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_derives_from_ambient_ids() {
        let policy = resolver()
            .resolve(
                ToolVersion::V2,
                &IdentityParams::default(),
                &ambient(Some("org-123"), Some("proj-456")),
            )
            .unwrap();

        assert_eq!(
            policy.issuer,
            Matcher::Exact("https://oidc.circleci.com/org/org-123".to_string())
        );
        assert_eq!(
            policy.subject,
            Some(Matcher::Pattern(
                "https://circleci.com/api/v2/projects/proj-456/pipeline-definitions/.*".to_string()
            ))
        );
        assert_eq!(policy.issuer_source, ClaimSource::Derived);
        assert!(policy.warnings.is_empty());
    }

    #[test]
    fn test_custom_bases() {
        let r = IdentityResolver::new("https://issuer.example/", "https://api.example");
        assert_eq!(r.derive_issuer("o"), "https://issuer.example/org/o");
        assert_eq!(
            r.derive_subject_pattern("p"),
            "https://api.example/projects/p/pipeline-definitions/.*"
        );
    }

    #[test]
    fn test_exact_beats_pattern() {
        let params = IdentityParams {
            issuer: Some("https://issuer.example".to_string()),
            issuer_pattern: Some("https://.*".to_string()),
            subject: Some("user@example.com".to_string()),
            subject_pattern: Some(".*".to_string()),
        };
        let policy = resolver()
            .resolve(ToolVersion::V3, &params, &ambient(None, None))
            .unwrap();
        assert_eq!(policy.issuer, Matcher::Exact("https://issuer.example".to_string()));
        assert_eq!(policy.subject, Some(Matcher::Exact("user@example.com".to_string())));
    }

    #[test]
    fn test_sides_resolve_independently() {
        let params = IdentityParams {
            issuer: Some("https://issuer.example".to_string()),
            ..Default::default()
        };
        let policy = resolver()
            .resolve(ToolVersion::V2, &params, &ambient(None, Some("proj-456")))
            .unwrap();
        assert_eq!(policy.issuer_source, ClaimSource::Explicit);
        assert_eq!(policy.subject_source, Some(ClaimSource::Derived));
    }

    #[test]
    fn test_v1_subject_pattern_degrades_with_warning() {
        let policy = resolver()
            .resolve(
                ToolVersion::V1,
                &IdentityParams::default(),
                &ambient(Some("org-123"), Some("proj-456")),
            )
            .unwrap();
        assert!(policy.subject.is_none());
        assert_eq!(policy.warnings.len(), 1);
        assert_eq!(policy.issuer.value(), "https://oidc.circleci.com/org/org-123");
    }

    #[test]
    fn test_v1_subject_pattern_strict_fails() {
        let err = resolver()
            .with_strict(true)
            .resolve(
                ToolVersion::V1,
                &IdentityParams::default(),
                &ambient(Some("org-123"), Some("proj-456")),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SigningError::Identity(IdentityError::PatternSubjectUnsupported { .. })
        ));
    }

    #[test]
    fn test_v1_issuer_pattern_fails() {
        let params = IdentityParams {
            issuer_pattern: Some("https://oidc\\..*".to_string()),
            ..Default::default()
        };
        let err = resolver()
            .resolve(ToolVersion::V1, &params, &ambient(None, None))
            .unwrap_err();
        assert!(matches!(
            err,
            SigningError::Identity(IdentityError::PatternIssuerUnsupported { .. })
        ));
    }

    #[test]
    fn test_v1_exact_subject_is_kept() {
        let params = IdentityParams {
            issuer: Some("https://issuer.example".to_string()),
            subject: Some("user@example.com".to_string()),
            ..Default::default()
        };
        let policy = resolver()
            .resolve(ToolVersion::V1, &params, &ambient(None, None))
            .unwrap();
        assert_eq!(policy.subject, Some(Matcher::Exact("user@example.com".to_string())));
    }

    #[test]
    fn test_unresolved_issuer() {
        let err = resolver()
            .resolve(ToolVersion::V1, &IdentityParams::default(), &ambient(None, None))
            .unwrap_err();
        assert!(matches!(
            err,
            SigningError::Identity(IdentityError::Unresolved { ref missing, .. }) if missing == "issuer"
        ));
    }

    #[test]
    fn test_v2_requires_subject() {
        let err = resolver()
            .resolve(
                ToolVersion::V2,
                &IdentityParams::default(),
                &ambient(Some("org-123"), None),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SigningError::Identity(IdentityError::Unresolved { ref missing, .. }) if missing == "subject"
        ));

        // v1 is satisfied by the issuer alone
        assert!(resolver()
            .resolve(
                ToolVersion::V1,
                &IdentityParams::default(),
                &ambient(Some("org-123"), None),
            )
            .is_ok());
    }

    #[test]
    fn test_invalid_pattern() {
        let params = IdentityParams {
            issuer: Some("https://issuer.example".to_string()),
            subject_pattern: Some("(unclosed".to_string()),
            ..Default::default()
        };
        let err = resolver()
            .resolve(ToolVersion::V2, &params, &ambient(None, None))
            .unwrap_err();
        assert!(matches!(
            err,
            SigningError::Identity(IdentityError::InvalidPattern { .. })
        ));
    }
}
