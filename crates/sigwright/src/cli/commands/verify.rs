//! Verify commands

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use sigwright_signing::{Operation, SigningRequest, Target};

use super::common::{run_pipeline, SigningArgs};
use crate::cli::Cli;

/// Verify a container image signature
#[derive(Debug, Args)]
pub struct VerifyCommand {
    /// Image reference
    pub image: String,

    #[command(flatten)]
    pub signing: SigningArgs,
}

impl VerifyCommand {
    /// Execute the verify command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(image = %self.image, "executing verify command");
        let config = self.signing.resolve_config(cli)?;
        let request =
            SigningRequest::from_config(Operation::Verify, Target::image(&self.image)?, &config)?;
        run_pipeline(cli, &config, request, self.signing.dry_run)
    }
}

/// Verify a file signature
#[derive(Debug, Args)]
pub struct VerifyBlobCommand {
    /// File to verify
    pub path: PathBuf,

    /// Signature file
    #[arg(long)]
    pub signature: PathBuf,

    /// Signing certificate (keyless mode)
    #[arg(long)]
    pub certificate: Option<PathBuf>,

    #[command(flatten)]
    pub signing: SigningArgs,
}

impl VerifyBlobCommand {
    /// Execute the verify-blob command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(path = %self.path.display(), "executing verify-blob command");
        let config = self.signing.resolve_config(cli)?;

        let mut target = Target::blob(&self.path, &self.signature);
        if let Some(certificate) = &self.certificate {
            target = target.with_certificate(certificate);
        }

        let request = SigningRequest::from_config(Operation::Verify, target, &config)?;
        run_pipeline(cli, &config, request, self.signing.dry_run)
    }
}
