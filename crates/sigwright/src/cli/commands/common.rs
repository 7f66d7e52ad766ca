//! Flags and plumbing shared by the signing commands

use std::future::Future;

use clap::Args;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use sigwright_core::{validate_config, Config, TrustMode};
use sigwright_signing::{
    InvocationContext, Pipeline, SigningRequest, StageReporter, TracingReporter,
};

use crate::cli::output::{self, ConsoleReporter};
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes::Interrupted;

/// Options common to every signing and verification command
#[derive(Debug, Clone, Default, Args)]
pub struct SigningArgs {
    /// Trust mode (key or keyless); inferred from key material when omitted
    #[arg(long)]
    pub mode: Option<TrustMode>,

    /// Avoid every public certificate authority and transparency log
    #[arg(long)]
    pub private: bool,

    /// Comma-separated key=value annotations
    #[arg(long)]
    pub annotations: Option<String>,

    /// Exact expected certificate subject (keyless verification)
    #[arg(long)]
    pub certificate_identity: Option<String>,

    /// Pattern for the expected certificate subject (keyless verification)
    #[arg(long)]
    pub certificate_identity_regexp: Option<String>,

    /// Exact expected certificate issuer (keyless verification)
    #[arg(long)]
    pub certificate_oidc_issuer: Option<String>,

    /// Pattern for the expected certificate issuer (keyless verification)
    #[arg(long)]
    pub certificate_oidc_issuer_regexp: Option<String>,

    /// Certificate authority URL (keyless only)
    #[arg(long)]
    pub fulcio_url: Option<String>,

    /// Transparency log URL (keyless only)
    #[arg(long)]
    pub rekor_url: Option<String>,

    /// OIDC issuer URL used to obtain a certificate (keyless only)
    #[arg(long)]
    pub oidc_issuer: Option<String>,

    /// Resolve and validate everything, print the command instead of running it
    #[arg(long)]
    pub dry_run: bool,
}

impl SigningArgs {
    /// Layer command-line values over the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        fn set(target: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }

        if self.mode.is_some() {
            config.signing.mode = self.mode;
        }
        if self.private {
            config.signing.private_infrastructure = true;
        }
        set(&mut config.signing.annotations, &self.annotations);
        set(&mut config.identity.certificate_identity, &self.certificate_identity);
        set(
            &mut config.identity.certificate_identity_regexp,
            &self.certificate_identity_regexp,
        );
        set(&mut config.identity.certificate_oidc_issuer, &self.certificate_oidc_issuer);
        set(
            &mut config.identity.certificate_oidc_issuer_regexp,
            &self.certificate_oidc_issuer_regexp,
        );
        set(&mut config.keyless.fulcio_url, &self.fulcio_url);
        set(&mut config.keyless.rekor_url, &self.rekor_url);
        set(&mut config.keyless.oidc_issuer, &self.oidc_issuer);
    }

    /// Load configuration, apply flags and validate the result
    pub fn resolve_config(&self, cli: &Cli) -> anyhow::Result<Config> {
        let (mut config, _) = cli.load_config()?;
        self.apply(&mut config);
        validate_config(&config)?;
        Ok(config)
    }
}

/// Run one request through the pipeline and print the outcome
pub fn run_pipeline(
    cli: &Cli,
    config: &Config,
    request: SigningRequest,
    dry_run: bool,
) -> anyhow::Result<()> {
    info!(operation = %request.operation, artifact = %request.target.artifact(), dry_run, "running signing pipeline");

    let ctx = InvocationContext::from_env(config, request.operation);
    let pipeline = Pipeline::from_config(config).with_dry_run(dry_run);

    let console = ConsoleReporter::new(cli.verbose);
    let reporter: &dyn StageReporter = if cli.show_progress() {
        &console
    } else {
        &TracingReporter
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let outcome = runtime.block_on(until_interrupted(async {
        pipeline
            .run(&request, ctx, reporter)
            .await
            .map_err(anyhow::Error::from)
    }));

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            if e.downcast_ref::<Interrupted>().is_some() && !cli.quiet {
                output::warning("Interrupted; key material removed");
            }
            return Err(e);
        }
    };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => {
            if !cli.quiet {
                output::summary(&outcome);
            }
        }
    }

    Ok(())
}

/// Drive `work` until it finishes or the process is asked to stop.
///
/// Ctrl-C and, on Unix, SIGTERM drop `work`, which kills the signer and
/// shreds any materialized key before [`Interrupted`] is returned.
pub(crate) async fn until_interrupted<T, F>(work: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    #[cfg(unix)]
    let mut terminate = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let terminated = terminate.recv();
    #[cfg(not(unix))]
    let terminated = std::future::pending::<Option<()>>();

    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => Err(Interrupted.into()),
        _ = terminated => Err(Interrupted.into()),
    }
}
