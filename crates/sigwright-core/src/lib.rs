//! sigwright core - configuration and shared types
//!
//! This crate holds the configuration model used to drive the signing
//! pipeline: the on-disk config file format, its loader and validation,
//! plus the small value types (trust mode, annotations) shared between the
//! library and the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use config::{load_config, load_config_or_default, validate_config, Config};
pub use error::{ConfigError, Result};
pub use types::{parse_annotations, Annotation, DigestBackendKind, TrustMode};
