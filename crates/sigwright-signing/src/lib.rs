//! sigwright signing - orchestration for the cosign executable
//!
//! This crate turns a signing request into one correct signer invocation:
//! - mode: picks key-based or keyless trust for the whole operation
//! - version: detects the signer major version and its capabilities
//! - adapter: builds version-correct arguments
//! - secret: decodes key material into a short-lived, owner-read file
//! - identity: derives certificate matching rules for keyless verification
//! - digest: pins image references to content digests
//! - executor: runs the signer and propagates its exit status
//!
//! [`Pipeline`] sequences them.

pub mod adapter;
pub mod context;
pub mod digest;
pub mod error;
pub mod executor;
pub mod identity;
pub mod mode;
pub mod pipeline;
pub mod reporter;
pub mod request;
pub mod secret;
pub mod version;

pub use adapter::{CommandPlan, Resolved, VersionAdapter};
pub use context::InvocationContext;
pub use digest::{
    select_backend, ArtifactDigestReference, DigestBackend, DigestReport, DigestResolver,
    ImageReference,
};
pub use error::{
    ConfigurationError, ErrorKind, ExecutionError, IdentityError, Result, SecretError,
    SigningError,
};
pub use executor::Signer;
pub use identity::{IdentityPolicy, IdentityResolver, Matcher};
pub use mode::ModeResolver;
pub use pipeline::{Outcome, Pipeline};
pub use reporter::{CollectingReporter, Stage, StageEvent, StageReporter, TracingReporter};
pub use request::{Endpoints, IdentityParams, Operation, SigningRequest, Target};
pub use secret::{KeyKind, KeyMaterial, SecretScope};
pub use version::{Capabilities, ToolVersion};
