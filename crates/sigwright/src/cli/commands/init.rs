//! Init command

use std::path::PathBuf;

use clap::Args;
use console::style;
use dialoguer::Confirm;
use tracing::info;

use sigwright_core::config::defaults::{default_config_toml, DEFAULT_CONFIG_TOML};

use crate::cli::{display_path, output, Cli};

/// Write a default configuration file
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Use defaults without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, yes = self.yes, "executing init command");
        let cwd = std::env::current_dir()?;
        let config_path = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_TOML));

        // Check if config already exists
        if config_path.exists() && !self.force {
            if self.yes {
                anyhow::bail!(
                    "Configuration file already exists at {}. Use --force to overwrite.",
                    config_path.display()
                );
            }

            let overwrite = Confirm::new()
                .with_prompt(format!(
                    "Configuration file already exists at {}. Overwrite?",
                    config_path.display()
                ))
                .default(false)
                .interact()?;

            if !overwrite {
                println!("{}", style("Aborted.").yellow());
                return Ok(());
            }
        }

        std::fs::write(&config_path, default_config_toml())?;

        if !cli.quiet {
            output::success(&format!(
                "Created {}",
                output::path_style().apply_to(display_path(&config_path))
            ));
            println!();
            println!("Next steps:");
            println!("  1. Set COSIGN_PRIVATE_KEY / COSIGN_PUBLIC_KEY for key mode, or enable OIDC tokens for keyless");
            println!("  2. Run {} to check the signer", style("sigwright version").cyan());
            println!("  3. Run {} to preview a signature", style("sigwright sign <image> --dry-run").cyan());
        }

        Ok(())
    }
}
