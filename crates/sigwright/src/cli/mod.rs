//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;

use sigwright_core::config::{load_config, load_config_or_default, Config};

use commands::{
    AttestCommand, InitCommand, SignBlobCommand, SignCommand, VerifyAttestationCommand,
    VerifyBlobCommand, VerifyCommand, VersionCommand,
};

/// sigwright - version-aware cosign signing for CI pipelines
#[derive(Debug, Parser)]
#[command(name = "sigwright")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Configuration file (default: search sigwright.toml / sigwright.yaml upwards)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sign a container image
    Sign(SignCommand),

    /// Sign a file
    SignBlob(SignBlobCommand),

    /// Verify a container image signature
    Verify(VerifyCommand),

    /// Verify a file signature
    VerifyBlob(VerifyBlobCommand),

    /// Attach an attestation to a container image
    Attest(AttestCommand),

    /// Verify a container image attestation
    VerifyAttestation(VerifyAttestationCommand),

    /// Show the detected signer version and its capabilities
    Version(VersionCommand),

    /// Write a default configuration file
    Init(InitCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Sign(ref cmd) => cmd.execute(&self),
            Commands::SignBlob(ref cmd) => cmd.execute(&self),
            Commands::Verify(ref cmd) => cmd.execute(&self),
            Commands::VerifyBlob(ref cmd) => cmd.execute(&self),
            Commands::Attest(ref cmd) => cmd.execute(&self),
            Commands::VerifyAttestation(ref cmd) => cmd.execute(&self),
            Commands::Version(ref cmd) => cmd.execute(&self),
            Commands::Init(ref cmd) => cmd.execute(&self),
        }
    }

    /// Load configuration from `--config` or by searching from the working directory
    pub fn load_config(&self) -> anyhow::Result<(Config, Option<PathBuf>)> {
        let (config, path) = match &self.config {
            Some(path) => (load_config(path)?, Some(path.clone())),
            None => load_config_or_default(&std::env::current_dir()?)?,
        };
        match &path {
            Some(path) => debug!(path = %path.display(), "loaded configuration"),
            None => debug!("no configuration file found, using defaults"),
        }
        Ok((config, path))
    }

    /// Whether human-readable progress should be printed
    pub fn show_progress(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }
}

/// Display a path relative to the working directory when possible
pub fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sign_blob() {
        let cli = Cli::try_parse_from([
            "sigwright",
            "--format",
            "json",
            "sign-blob",
            "artifact.tar",
            "--signature",
            "artifact.sig",
            "--mode",
            "key",
            "--private",
            "--annotations",
            "a=1",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::SignBlob(_)));
    }

    #[test]
    fn test_parse_verify_with_identity() {
        let cli = Cli::try_parse_from([
            "sigwright",
            "verify",
            "registry/img:v1",
            "--certificate-oidc-issuer",
            "https://oidc.circleci.com/org/org-123",
            "--certificate-identity-regexp",
            ".*",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Verify(cmd) => {
                assert!(cmd.signing.dry_run);
                assert_eq!(cmd.signing.certificate_identity_regexp.as_deref(), Some(".*"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["sigwright", "sign", "img:v1", "--mode", "sideways"]).is_err());
    }
}
