//! Running the signer executable

use std::io::ErrorKind as IoErrorKind;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::adapter::CommandPlan;
use crate::error::{ConfigurationError, ExecutionError, Result};
use crate::version::ToolVersion;

/// Handle on the signer executable
#[derive(Debug, Clone)]
pub struct Signer {
    program: String,
}

impl Signer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Check if the signer can be found
    pub fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    /// Ask the signer for its version
    #[instrument(skip(self), fields(program = %self.program))]
    pub async fn query_version(&self) -> Result<ToolVersion> {
        debug!("Running {} version", self.program);

        let output = Command::new(&self.program)
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.not_found(e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(ConfigurationError::VersionQuery(format!(
                "{} version exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            ))
            .into());
        }

        // Some releases print the banner on stderr
        let version = ToolVersion::parse_version_output(&format!("{}\n{}", stdout, stderr))?;
        info!(version = %version, "detected signer version");
        Ok(version)
    }

    /// Run the planned command with inherited stdio.
    ///
    /// The exit status is surfaced unchanged. The child is killed if this
    /// future is dropped.
    #[instrument(skip(self, plan), fields(program = %self.program, subcommand = plan.args.first().map(String::as_str).unwrap_or("")))]
    pub async fn run(&self, plan: &CommandPlan) -> Result<()> {
        debug!(args = ?plan.redacted_args(), env = ?plan.env_names(), "executing signer");

        let mut command = Command::new(&self.program);
        command
            .args(&plan.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for (name, value) in &plan.env {
            command.env(name, value.as_str());
        }

        let status = command
            .status()
            .await
            .map_err(|source| ExecutionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(ExecutionError::Failed {
                program: self.program.clone(),
                operation: plan.args.first().cloned().unwrap_or_default(),
                code: status.code(),
            }
            .into());
        }

        info!("signer completed successfully");
        Ok(())
    }

    fn not_found(&self, e: std::io::Error) -> ConfigurationError {
        if e.kind() == IoErrorKind::NotFound {
            ConfigurationError::ToolNotFound {
                tool: self.program.clone(),
                hint: "install cosign or set signer.path in the configuration".to_string(),
            }
        } else {
            ConfigurationError::Io(e)
        }
    }
}

impl Default for Signer {
    fn default() -> Self {
        Self::new(sigwright_core::config::DEFAULT_SIGNER)
    }
}
