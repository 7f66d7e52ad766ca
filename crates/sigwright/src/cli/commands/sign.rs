//! Sign commands

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use sigwright_signing::{Operation, SigningRequest, Target};

use super::common::{run_pipeline, SigningArgs};
use crate::cli::Cli;

/// Sign a container image
#[derive(Debug, Args)]
pub struct SignCommand {
    /// Image reference; tags are resolved to a digest before signing
    pub image: String,

    #[command(flatten)]
    pub signing: SigningArgs,
}

impl SignCommand {
    /// Execute the sign command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(image = %self.image, "executing sign command");
        let config = self.signing.resolve_config(cli)?;
        let request =
            SigningRequest::from_config(Operation::Sign, Target::image(&self.image)?, &config)?;
        run_pipeline(cli, &config, request, self.signing.dry_run)
    }
}

/// Sign a file
#[derive(Debug, Args)]
pub struct SignBlobCommand {
    /// File to sign
    pub path: PathBuf,

    /// Where to write the signature
    #[arg(long)]
    pub signature: PathBuf,

    /// Where to write the signing certificate (keyless mode)
    #[arg(long)]
    pub certificate: Option<PathBuf>,

    #[command(flatten)]
    pub signing: SigningArgs,
}

impl SignBlobCommand {
    /// Execute the sign-blob command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(path = %self.path.display(), "executing sign-blob command");
        let config = self.signing.resolve_config(cli)?;

        let mut target = Target::blob(&self.path, &self.signature);
        if let Some(certificate) = &self.certificate {
            target = target.with_certificate(certificate);
        }

        let request = SigningRequest::from_config(Operation::Sign, target, &config)?;
        run_pipeline(cli, &config, request, self.signing.dry_run)
    }
}
