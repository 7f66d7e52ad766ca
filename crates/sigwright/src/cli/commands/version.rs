//! Version command

use clap::Args;
use console::style;
use tracing::info;

use sigwright_signing::{Capabilities, Signer};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Show the detected signer version and its capabilities
#[derive(Debug, Args)]
pub struct VersionCommand {
    /// Print only the major version
    #[arg(long)]
    pub short: bool,
}

impl VersionCommand {
    /// Execute the version command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(short = self.short, "executing version command");
        let (config, _) = cli.load_config()?;
        let signer = Signer::new(&config.signer.path);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let version = runtime.block_on(signer.query_version())?;
        let caps = version.capabilities();

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "signer": signer.program(),
                    "major": version.major(),
                    "capabilities": caps,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text if self.short => println!("{}", version.major()),
            OutputFormat::Text => self.print_table(signer.program(), &caps, cli),
        }

        Ok(())
    }

    fn print_table(&self, program: &str, caps: &Capabilities, cli: &Cli) {
        if cli.quiet {
            println!("{}", caps.version);
            return;
        }

        let yes_no = |on: bool| {
            if on {
                style("yes").green().to_string()
            } else {
                style("no").dim().to_string()
            }
        };

        println!(
            "{} {}",
            output::header(program),
            output::version_style().apply_to(caps.version)
        );
        println!();
        println!(
            "{}",
            output::key_value("Disable log upload", caps.log_upload_switch.disable_flag())
        );
        println!(
            "{}",
            output::key_value("Keyless needs COSIGN_EXPERIMENTAL", &yes_no(caps.keyless_requires_experimental))
        );
        println!("{}", output::key_value("Skip confirmation (--yes)", &yes_no(caps.skip_confirmation)));
        println!("{}", output::key_value("Issuer patterns", &yes_no(caps.issuer_pattern)));
        println!("{}", output::key_value("Subject patterns", &yes_no(caps.subject_pattern)));
        println!(
            "{}",
            output::key_value("Subject required for keyless verify", &yes_no(caps.subject_required))
        );
        println!(
            "{}",
            output::key_value("Skip transparency log on key verify", &yes_no(caps.skip_transparency_on_verify))
        );
        println!(
            "{}",
            output::key_value("Private infrastructure verify", &yes_no(caps.private_infrastructure_verify))
        );
        println!("{}", output::key_value("Signing config", &yes_no(caps.signing_config)));
        println!(
            "{}",
            output::key_value("Annotations on attestations", &yes_no(caps.attestation_annotations))
        );
    }
}
