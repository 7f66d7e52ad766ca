//! CLI commands

mod attest;
mod common;
mod init;
mod sign;
mod verify;
mod version;

pub use attest::{AttestCommand, VerifyAttestationCommand};
pub use init::InitCommand;
pub use sign::{SignBlobCommand, SignCommand};
pub use verify::{VerifyBlobCommand, VerifyCommand};
pub use version::VersionCommand;
