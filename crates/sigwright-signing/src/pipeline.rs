//! The signing pipeline
//!
//! Stages run strictly in order: validate, resolve the trust mode, detect
//! the signer version and check capabilities, resolve identity and digest,
//! materialize the key, build the command, execute, clean up. Everything
//! that can fail on configuration alone fails before a key is decoded.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sigwright_core::{Config, DigestBackendKind, TrustMode};
use tracing::{debug, instrument, warn};

use crate::adapter::{Resolved, VersionAdapter};
use crate::context::InvocationContext;
use crate::digest::{select_backend, DigestResolver};
use crate::error::{ConfigurationError, Result, SigningError};
use crate::executor::Signer;
use crate::identity::{IdentityPolicy, IdentityResolver};
use crate::mode::ModeResolver;
use crate::reporter::{Stage, StageEvent, StageReporter};
use crate::request::{Operation, SigningRequest, Target};
use crate::secret::{KeyKind, SecretScope};
use crate::version::ToolVersion;

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub operation: Operation,
    pub mode: TrustMode,
    pub version: ToolVersion,
    pub subcommand: String,
    /// Digest-qualified reference or blob path
    pub artifact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityPolicy>,
    pub warnings: Vec<String>,
    pub dry_run: bool,
    /// Argument vector with secrets redacted
    pub command: Vec<String>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Sequences the components for one request
pub struct Pipeline {
    signer: Signer,
    modes: ModeResolver,
    identity: IdentityResolver,
    digest_backend: DigestBackendKind,
    digest: Option<DigestResolver>,
    scratch_parent: Option<PathBuf>,
    dry_run: bool,
}

impl Pipeline {
    pub fn new(signer: Signer, identity: IdentityResolver) -> Self {
        Self {
            signer,
            modes: ModeResolver::new(),
            identity,
            digest_backend: DigestBackendKind::Auto,
            digest: None,
            scratch_parent: None,
            dry_run: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut pipeline = Self::new(
            Signer::new(&config.signer.path),
            IdentityResolver::from_config(&config.identity),
        );
        pipeline.digest_backend = config.digest.backend;
        pipeline
    }

    /// Use a specific digest resolver instead of probing for one
    pub fn with_digest_resolver(mut self, resolver: DigestResolver) -> Self {
        self.digest = Some(resolver);
        self
    }

    /// Create secret scratch directories under `parent` instead of the system temp dir
    pub fn with_scratch_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.scratch_parent = Some(parent.into());
        self
    }

    /// Resolve and validate everything, but do not run the signer
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Run one request. Secrets held by `ctx` are cleared before returning.
    #[instrument(skip_all, fields(operation = %request.operation, artifact = %request.target.artifact()))]
    pub async fn run(
        &self,
        request: &SigningRequest,
        mut ctx: InvocationContext,
        reporter: &dyn StageReporter,
    ) -> Result<Outcome> {
        let started = Instant::now();
        let result = self.run_stages(request, &mut ctx, reporter, started).await;
        ctx.clear();

        reporter.report(&StageEvent::Finished {
            success: result.is_ok(),
            duration: started.elapsed(),
        });
        result
    }

    async fn run_stages(
        &self,
        request: &SigningRequest,
        ctx: &mut InvocationContext,
        reporter: &dyn StageReporter,
        started: Instant,
    ) -> Result<Outcome> {
        let mut warnings = Vec::new();

        begin(reporter, Stage::Validate);
        guard(reporter, Stage::Validate, request.validate())?;
        done(reporter, Stage::Validate, None);

        begin(reporter, Stage::Mode);
        let mode = guard(reporter, Stage::Mode, self.modes.resolve(request, ctx))?;
        done(reporter, Stage::Mode, Some(mode.to_string()));

        begin(reporter, Stage::Version);
        let version = guard(reporter, Stage::Version, self.signer.query_version().await)?;
        let adapter = VersionAdapter::new(version);
        guard(reporter, Stage::Version, adapter.check(request, mode))?;
        done(
            reporter,
            Stage::Version,
            Some(format!("{} {}", self.signer.program(), version)),
        );

        let identity = if mode == TrustMode::Keyless && !request.operation.produces_signature() {
            begin(reporter, Stage::Identity);
            let policy = guard(
                reporter,
                Stage::Identity,
                self.identity.resolve(version, &request.identity, ctx),
            )?;
            for message in &policy.warnings {
                warning(reporter, Stage::Identity, message, &mut warnings);
            }
            done(reporter, Stage::Identity, Some(describe_policy(&policy)));
            Some(policy)
        } else {
            skip(reporter, Stage::Identity, "not a keyless verification");
            None
        };

        let reference = match &request.target {
            Target::Image { reference } => {
                begin(reporter, Stage::Digest);
                let resolved = guard(reporter, Stage::Digest, self.resolve_digest(reference).await)?;
                done(reporter, Stage::Digest, Some(resolved.to_string()));
                Some(resolved)
            }
            Target::Blob { .. } => {
                skip(reporter, Stage::Digest, "blob target");
                None
            }
        };

        let mut scope = guard(reporter, Stage::Secret, self.open_scope())?;
        if mode == TrustMode::Key {
            begin(reporter, Stage::Secret);
            let key = ctx.key.take().ok_or_else(|| {
                SigningError::from(crate::error::SecretError::Missing {
                    variable: ctx.key_variable.clone(),
                })
            });
            let key = guard(reporter, Stage::Secret, key)?;
            let (kind, password) = if request.operation.produces_signature() {
                (KeyKind::Private, ctx.password.take())
            } else {
                (KeyKind::Public, None)
            };
            let material = guard(
                reporter,
                Stage::Secret,
                scope.materialize(&key.variable, key.value, kind, password),
            )?;
            done(
                reporter,
                Stage::Secret,
                Some(format!("{:?} key from {}", kind, key.variable)),
            );
            debug!(?material, "key ready");
        } else {
            skip(reporter, Stage::Secret, "keyless mode");
        }

        begin(reporter, Stage::Command);
        let scratch = scope
            .dir()
            .map(PathBuf::from)
            .ok_or_else(|| ConfigurationError::MissingParameter {
                parameter: "scratch directory".to_string(),
                hint: "the secret scope was closed early".to_string(),
            })
            .map_err(SigningError::from);
        let scratch = guard(reporter, Stage::Command, scratch)?;
        let resolved = Resolved {
            reference: reference.as_ref(),
            key_path: scope.material().map(|m| m.path()),
            password: scope.material().and_then(|m| m.password()),
            identity: identity.as_ref(),
            identity_token: ctx.identity_token.as_ref().map(|t| t.value.as_str()),
        };
        let plan = guard(
            reporter,
            Stage::Command,
            adapter.build(request, mode, &resolved, &scratch),
        )?;
        for aux in &plan.aux_files {
            let written = tokio::fs::write(&aux.path, &aux.contents)
                .await
                .map_err(|e| SigningError::from(ConfigurationError::Io(e)));
            guard(reporter, Stage::Command, written)?;
        }
        for message in &plan.warnings {
            if !warnings.contains(message) {
                warning(reporter, Stage::Command, message, &mut warnings);
            }
        }
        let command = plan.redacted_args();
        done(reporter, Stage::Command, Some(command.join(" ")));

        if self.dry_run {
            skip(reporter, Stage::Execute, "dry run");
        } else {
            begin(reporter, Stage::Execute);
            guard(reporter, Stage::Execute, self.signer.run(&plan).await)?;
            done(reporter, Stage::Execute, None);
        }

        begin(reporter, Stage::Cleanup);
        drop(plan);
        if let Err(e) = scope.cleanup() {
            // Best effort; the signer already ran
            warn!(error = %e, "secret cleanup incomplete");
            warning(
                reporter,
                Stage::Cleanup,
                &format!("secret cleanup incomplete: {}", e),
                &mut warnings,
            );
        }
        done(reporter, Stage::Cleanup, None);

        let artifact = match (&reference, &request.target) {
            (Some(reference), _) => reference.to_string(),
            (None, target) => target.artifact(),
        };

        Ok(Outcome {
            operation: request.operation,
            mode,
            version,
            subcommand: VersionAdapter::subcommand(request).to_string(),
            artifact,
            identity,
            warnings,
            dry_run: self.dry_run,
            command,
            completed_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn resolve_digest(
        &self,
        reference: &crate::digest::ImageReference,
    ) -> Result<crate::digest::ArtifactDigestReference> {
        match &self.digest {
            Some(resolver) => resolver.resolve(reference).await,
            None => {
                let resolver = DigestResolver::new(select_backend(self.digest_backend)?);
                resolver.resolve(reference).await
            }
        }
    }

    fn open_scope(&self) -> Result<SecretScope> {
        match &self.scratch_parent {
            Some(parent) => SecretScope::new_in(parent),
            None => SecretScope::new(),
        }
    }
}

fn describe_policy(policy: &IdentityPolicy) -> String {
    match &policy.subject {
        Some(subject) => format!("issuer {} / subject {}", policy.issuer.value(), subject.value()),
        None => format!("issuer {} (subject not checked)", policy.issuer.value()),
    }
}

fn begin(reporter: &dyn StageReporter, stage: Stage) {
    reporter.report(&StageEvent::Started { stage });
}

fn done(reporter: &dyn StageReporter, stage: Stage, detail: Option<String>) {
    reporter.report(&StageEvent::Completed { stage, detail });
}

fn skip(reporter: &dyn StageReporter, stage: Stage, reason: &str) {
    reporter.report(&StageEvent::Skipped {
        stage,
        reason: reason.to_string(),
    });
}

fn warning(reporter: &dyn StageReporter, stage: Stage, message: &str, warnings: &mut Vec<String>) {
    reporter.report(&StageEvent::Warning {
        stage,
        message: message.to_string(),
    });
    warnings.push(message.to_string());
}

/// Report a stage failure before propagating it
fn guard<T>(reporter: &dyn StageReporter, stage: Stage, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        reporter.report(&StageEvent::Failed {
            stage,
            error: e.to_string(),
        });
    }
    result
}
