//! Local engine inspection with docker

use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::{DigestBackend, DigestReport, ImageReference};
use crate::error::{ConfigurationError, Result};

/// `docker image inspect` backend.
///
/// The engine only knows about images present locally, so a missing image
/// is pulled first. Its `RepoDigests` list may name any registry the same
/// content was ever pushed to.
pub struct DockerBackend {
    docker_path: String,
}

impl DockerBackend {
    pub fn new() -> Self {
        Self::with_path("docker")
    }

    /// Use a specific docker executable
    pub fn with_path(docker_path: impl Into<String>) -> Self {
        Self {
            docker_path: docker_path.into(),
        }
    }

    async fn run_docker(&self, args: &[&str]) -> Result<Output> {
        debug!("Running docker with args: {:?}", args);
        let output = Command::new(&self.docker_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(ConfigurationError::Io)?;
        Ok(output)
    }

    async fn repo_digests(&self, tagged: &str) -> Result<Option<Vec<String>>> {
        let output = self
            .run_docker(&["image", "inspect", "--format", "{{json .RepoDigests}}", tagged])
            .await?;

        if !output.status.success() {
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let digests: Vec<String> = serde_json::from_str(stdout.trim()).map_err(|e| {
            ConfigurationError::DigestLookup {
                backend: "docker".to_string(),
                reference: tagged.to_string(),
                reason: format!("unexpected inspect output: {}", e),
            }
        })?;
        Ok(Some(digests))
    }

    /// Pick the `repo@digest` entry for the requested repository, or the first one
    pub(crate) fn pick_repo_digest(
        repo_digests: &[String],
        requested_repository: &str,
    ) -> Option<(String, String)> {
        let parsed: Vec<(String, String)> = repo_digests
            .iter()
            .filter_map(|entry| entry.split_once('@'))
            .map(|(repo, digest)| (repo.to_string(), digest.to_string()))
            .collect();

        parsed
            .iter()
            .find(|(repo, _)| repo == requested_repository)
            .or_else(|| parsed.first())
            .cloned()
    }
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DigestBackend for DockerBackend {
    fn name(&self) -> &str {
        "docker"
    }

    fn is_available(&self) -> bool {
        which::which(&self.docker_path).is_ok()
    }

    #[instrument(skip(self), fields(backend = "docker", reference = %reference))]
    async fn inspect(&self, reference: &ImageReference) -> Result<DigestReport> {
        let tagged = reference.tagged();

        let digests = match self.repo_digests(&tagged).await? {
            Some(digests) => digests,
            None => {
                info!("image not present locally, pulling {}", tagged);
                let pull = self.run_docker(&["pull", "--quiet", &tagged]).await?;
                if !pull.status.success() {
                    return Err(ConfigurationError::DigestLookup {
                        backend: "docker".to_string(),
                        reference: tagged,
                        reason: String::from_utf8_lossy(&pull.stderr).trim().to_string(),
                    }
                    .into());
                }
                self.repo_digests(&tagged).await?.unwrap_or_default()
            }
        };

        let (repository, digest) = Self::pick_repo_digest(&digests, &reference.repository)
            .ok_or_else(|| ConfigurationError::DigestLookup {
                backend: "docker".to_string(),
                reference: tagged.clone(),
                reason: "image has no registry digest; push it before signing".to_string(),
            })?;

        Ok(DigestReport::Qualified { repository, digest })
    }
}
