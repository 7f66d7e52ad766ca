//! Output formatting utilities

use console::{style, Style};
use sigwright_signing::{Outcome, Stage, StageEvent, StageReporter};

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

/// Style for version numbers
pub fn version_style() -> Style {
    Style::new().green().bold()
}

/// Style for references and paths
pub fn path_style() -> Style {
    Style::new().cyan()
}

/// Prints a banner per pipeline stage
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl StageReporter for ConsoleReporter {
    fn report(&self, event: &StageEvent) {
        match event {
            StageEvent::Started { stage } => info(stage.title()),
            StageEvent::Completed { stage, detail } => match detail {
                // The signer command line is only interesting when asked for
                Some(_) if *stage == Stage::Command && !self.verbose => {}
                Some(detail) => success(&format!("{}: {}", stage.title(), detail)),
                None => {}
            },
            StageEvent::Skipped { stage, reason } => {
                if self.verbose {
                    println!("  {} {} ({})", style("-").dim(), style(stage.title()).dim(), reason);
                }
            }
            StageEvent::Warning { message, .. } => warning(message),
            StageEvent::Failed { stage, .. } => {
                eprintln!("{} {} failed", style("✗").red().bold(), stage.title());
            }
            StageEvent::Finished { .. } => {}
        }
    }
}

/// Print the terminal summary of a run
pub fn summary(outcome: &Outcome) {
    println!();
    println!("{}", header("Summary"));
    println!("{}", key_value("Operation", &outcome.operation.to_string()));
    println!("{}", key_value("Mode", &outcome.mode.to_string()));
    println!(
        "{}",
        key_value(
            "Signer",
            &version_style().apply_to(outcome.version.to_string()).to_string()
        )
    );
    println!(
        "{}",
        key_value(
            "Artifact",
            &path_style().apply_to(&outcome.artifact).to_string()
        )
    );
    if let Some(identity) = &outcome.identity {
        println!("{}", key_value("Issuer", identity.issuer.value()));
        match &identity.subject {
            Some(subject) => println!("{}", key_value("Subject", subject.value())),
            None => println!("{}", key_value("Subject", "not checked")),
        }
    }
    if outcome.warnings.is_empty() {
        println!("{}", key_value("Warnings", "none"));
    } else {
        println!("{}", key_value("Warnings", &outcome.warnings.len().to_string()));
        for message in &outcome.warnings {
            println!("    {} {}", style("!").yellow().bold(), message);
        }
    }
    if outcome.dry_run {
        println!();
        println!("{}", header("Command (dry run)"));
        println!("  {}", outcome.command.join(" "));
    }
}
