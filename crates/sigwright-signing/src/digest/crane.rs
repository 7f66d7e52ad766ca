//! Remote inspection with crane

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, instrument};

use super::{DigestBackend, DigestReport, ImageReference};
use crate::error::{ConfigurationError, Result};

/// `crane digest` backend; asks the registry directly, no local pull
pub struct CraneBackend {
    crane_path: String,
}

impl CraneBackend {
    pub fn new() -> Self {
        Self::with_path("crane")
    }

    /// Use a specific crane executable
    pub fn with_path(crane_path: impl Into<String>) -> Self {
        Self {
            crane_path: crane_path.into(),
        }
    }
}

impl Default for CraneBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DigestBackend for CraneBackend {
    fn name(&self) -> &str {
        "crane"
    }

    fn is_available(&self) -> bool {
        which::which(&self.crane_path).is_ok()
    }

    #[instrument(skip(self), fields(backend = "crane", reference = %reference))]
    async fn inspect(&self, reference: &ImageReference) -> Result<DigestReport> {
        let tagged = reference.tagged();
        debug!("Running crane digest {}", tagged);

        let output = Command::new(&self.crane_path)
            .args(["digest", &tagged])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(ConfigurationError::Io)?;

        if !output.status.success() {
            return Err(ConfigurationError::DigestLookup {
                backend: "crane".to_string(),
                reference: tagged,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let digest = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(DigestReport::Bare(digest))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::digest::testing::write_tool;
    use crate::SigningError;

    const DIGEST: &str = "sha256:abcd000000000000000000000000000000000000000000000000000000000000";

    #[tokio::test]
    async fn test_inspect_trims_output() {
        let temp = tempfile::TempDir::new().unwrap();
        let args = temp.path().join("args");
        let crane = write_tool(
            temp.path(),
            "crane",
            &format!("echo \"$@\" > '{}'\nprintf '  {}\\n\\n'\n", args.display(), DIGEST),
        );

        let reference = ImageReference::parse("registry/img:v1").unwrap();
        let report = CraneBackend::with_path(crane.display().to_string())
            .inspect(&reference)
            .await
            .unwrap();

        assert_eq!(report, DigestReport::Bare(DIGEST.to_string()));
        assert_eq!(std::fs::read_to_string(&args).unwrap().trim(), "digest registry/img:v1");
    }

    #[tokio::test]
    async fn test_inspect_failure_is_lookup_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let crane = write_tool(
            temp.path(),
            "crane",
            "echo 'UNAUTHORIZED: authentication required' >&2\nexit 1\n",
        );

        let reference = ImageReference::parse("registry/img:v1").unwrap();
        let err = CraneBackend::with_path(crane.display().to_string())
            .inspect(&reference)
            .await
            .unwrap_err();

        match err {
            SigningError::Configuration(ConfigurationError::DigestLookup {
                backend,
                reference,
                reason,
            }) => {
                assert_eq!(backend, "crane");
                assert_eq!(reference, "registry/img:v1");
                assert_eq!(reason, "UNAUTHORIZED: authentication required");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
