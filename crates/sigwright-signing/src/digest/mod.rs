//! Image digest resolution
//!
//! Signing must bind to immutable content, so every image reference is
//! turned into `<repository>@<digest>` before the signer sees it. Two
//! inspection backends are available behind [`DigestBackend`]:
//! - crane: remote inspection, returns a bare digest
//! - docker: local engine, pulls if needed, returns `repo@digest` pairs

pub mod crane;
pub mod docker;

use serde::Serialize;
use sigwright_core::DigestBackendKind;
use tracing::{debug, info, instrument, warn};

use crate::error::{ConfigurationError, Result};

/// A parsed image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReference {
    /// Registry and path, without tag or digest
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse `registry[:port]/path[:tag][@digest]`
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = |reason: &str| ConfigurationError::InvalidParameter {
            parameter: "image".to_string(),
            reason: format!("'{}' {}", input, reason),
        };

        if input.is_empty() || input.chars().any(char::is_whitespace) {
            return Err(invalid("is not a valid image reference").into());
        }

        let (name, digest) = match input.split_once('@') {
            Some((name, digest)) => {
                validate_digest(digest).map_err(|reason| invalid(&reason))?;
                (name, Some(digest.to_string()))
            }
            None => (input, None),
        };

        // A ':' only introduces a tag when it follows the last '/', otherwise
        // it is a registry port
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(name[split + 1..].to_string()))
            }
            None => (name, None),
        };

        if repository.is_empty() || repository.ends_with('/') {
            return Err(invalid("has an empty repository").into());
        }
        if tag.as_deref() == Some("") {
            return Err(invalid("has an empty tag").into());
        }

        Ok(Self {
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// The reference with tag but without digest, as passed to inspection tools
    pub fn tagged(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}:{}", self.repository, tag),
            None => self.repository.clone(),
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tagged())?;
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// An immutable, digest-qualified reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDigestReference {
    pub repository: String,
    pub digest: String,
}

impl std::fmt::Display for ArtifactDigestReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.repository, self.digest)
    }
}

/// What an inspection backend reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestReport {
    /// Just the digest
    Bare(String),
    /// A digest paired with whatever repository the backend associated it with
    Qualified { repository: String, digest: String },
}

impl DigestReport {
    pub fn digest(&self) -> &str {
        match self {
            Self::Bare(digest) => digest,
            Self::Qualified { digest, .. } => digest,
        }
    }
}

/// Check `<algorithm>:<hex>`
pub(crate) fn validate_digest(digest: &str) -> std::result::Result<(), String> {
    let (algorithm, encoded) = digest
        .split_once(':')
        .ok_or_else(|| format!("digest '{}' has no algorithm prefix", digest))?;

    if algorithm.is_empty()
        || !algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
    {
        return Err(format!("digest '{}' has an invalid algorithm", digest));
    }
    if encoded.is_empty() || !encoded.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("digest '{}' is not hex encoded", digest));
    }
    if algorithm == "sha256" && encoded.len() != 64 {
        return Err(format!("sha256 digest '{}' must be 64 hex characters", digest));
    }
    Ok(())
}

/// A container inspection tool that can report an image digest
#[async_trait::async_trait]
pub trait DigestBackend: Send + Sync {
    /// Name of the backend
    fn name(&self) -> &str;

    /// Check if the backend's tool is installed
    fn is_available(&self) -> bool;

    /// Look up the digest for a tag-qualified reference
    async fn inspect(&self, reference: &ImageReference) -> Result<DigestReport>;
}

/// Pick the inspection backend once, at startup
pub fn select_backend(kind: DigestBackendKind) -> Result<Box<dyn DigestBackend>> {
    select_from(kind, crane::CraneBackend::new(), docker::DockerBackend::new())
}

/// Pick between the given backends; crane wins when both are usable
pub(crate) fn select_from(
    kind: DigestBackendKind,
    crane: crane::CraneBackend,
    docker: docker::DockerBackend,
) -> Result<Box<dyn DigestBackend>> {
    let selected: Box<dyn DigestBackend> = match kind {
        DigestBackendKind::Crane if crane.is_available() => Box::new(crane),
        DigestBackendKind::Docker if docker.is_available() => Box::new(docker),
        DigestBackendKind::Crane | DigestBackendKind::Docker => {
            return Err(ConfigurationError::ToolNotFound {
                tool: kind.to_string(),
                hint: "install it or set digest.backend = \"auto\"".to_string(),
            }
            .into())
        }
        DigestBackendKind::Auto if crane.is_available() => Box::new(crane),
        DigestBackendKind::Auto if docker.is_available() => Box::new(docker),
        DigestBackendKind::Auto => return Err(ConfigurationError::NoDigestBackend.into()),
    };

    info!(backend = selected.name(), "selected digest backend");
    Ok(selected)
}

/// Turns tag-qualified references into digest-qualified ones
pub struct DigestResolver {
    backend: Box<dyn DigestBackend>,
}

impl DigestResolver {
    pub fn new(backend: Box<dyn DigestBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Resolve to `<requested repository>@<digest>`.
    ///
    /// The repository always comes from the requested reference; any
    /// repository the backend reports is discarded.
    #[instrument(skip(self), fields(backend = self.backend.name(), reference = %reference))]
    pub async fn resolve(&self, reference: &ImageReference) -> Result<ArtifactDigestReference> {
        if let Some(digest) = &reference.digest {
            debug!("reference is already digest-qualified");
            return Ok(ArtifactDigestReference {
                repository: reference.repository.clone(),
                digest: digest.clone(),
            });
        }

        let report = self.backend.inspect(reference).await?;

        if let DigestReport::Qualified { repository, .. } = &report {
            if repository != &reference.repository {
                warn!(
                    reported = %repository,
                    requested = %reference.repository,
                    "backend reported a different repository, keeping the requested one"
                );
            }
        }

        let digest = report.digest().trim().to_string();
        validate_digest(&digest).map_err(|reason| ConfigurationError::DigestLookup {
            backend: self.backend.name().to_string(),
            reference: reference.to_string(),
            reason,
        })?;

        let resolved = ArtifactDigestReference {
            repository: reference.repository.clone(),
            digest,
        };
        info!(resolved = %resolved, "resolved image digest");
        Ok(resolved)
    }
}

/// Scripted stand-ins for inspection tools
#[cfg(all(test, unix))]
pub(crate) mod testing {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable `/bin/sh` script named `name` into `dir`
    pub(crate) fn write_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}
