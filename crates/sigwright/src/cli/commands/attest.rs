//! Attestation commands

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use sigwright_signing::{Operation, SigningRequest, Target};

use super::common::{run_pipeline, SigningArgs};
use crate::cli::Cli;

/// Attach an attestation to a container image
#[derive(Debug, Args)]
pub struct AttestCommand {
    /// Image reference
    pub image: String,

    /// Predicate file (e.g. an SBOM or provenance document)
    #[arg(long)]
    pub predicate: PathBuf,

    /// Predicate type (e.g. slsaprovenance, spdxjson, or a URI)
    #[arg(long = "type")]
    pub predicate_type: Option<String>,

    #[command(flatten)]
    pub signing: SigningArgs,
}

impl AttestCommand {
    /// Execute the attest command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(image = %self.image, predicate = %self.predicate.display(), "executing attest command");
        let config = self.signing.resolve_config(cli)?;
        let request =
            SigningRequest::from_config(Operation::Attest, Target::image(&self.image)?, &config)?
                .with_predicate(&self.predicate, self.predicate_type.clone());
        run_pipeline(cli, &config, request, self.signing.dry_run)
    }
}

/// Verify a container image attestation
#[derive(Debug, Args)]
pub struct VerifyAttestationCommand {
    /// Image reference
    pub image: String,

    /// Predicate type to match
    #[arg(long = "type")]
    pub predicate_type: Option<String>,

    #[command(flatten)]
    pub signing: SigningArgs,
}

impl VerifyAttestationCommand {
    /// Execute the verify-attestation command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(image = %self.image, "executing verify-attestation command");
        let config = self.signing.resolve_config(cli)?;
        let mut request = SigningRequest::from_config(
            Operation::VerifyAttestation,
            Target::image(&self.image)?,
            &config,
        )?;
        if let Some(predicate_type) = &self.predicate_type {
            request = request.with_predicate_type(predicate_type);
        }
        run_pipeline(cli, &config, request, self.signing.dry_run)
    }
}
