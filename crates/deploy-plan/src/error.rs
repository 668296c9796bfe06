//! Error types for plan construction
//!
//! Every variant is a construction-time defect in the deployment
//! definition. None of them are retried: the build that raised one is
//! aborted and nothing partially built is returned.

use crate::policy::PolicyCategory;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PlanError>;

/// Plan construction error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Category string outside the fixed enumeration
    #[error("invalid policy category: {0:?}")]
    InvalidCategory(String),

    /// Policy requested with no resources
    #[error("empty resource set for {category} policy")]
    EmptyResourceSet {
        /// Category that was requested
        category: PolicyCategory,
    },

    /// Malformed resource locator
    #[error("invalid resource identifier {value:?}: {reason}")]
    InvalidResourceIdentifier {
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Empty role, stage or name prefix
    #[error("{kind} name must not be empty")]
    EmptyName {
        /// What kind of name was empty
        kind: &'static str,
    },

    /// Role name already used in this construction session
    #[error("duplicate role name: {0}")]
    DuplicateRoleName(String),

    /// Stage name already used in this construction session or plan
    #[error("duplicate stage name: {0}")]
    DuplicateStageName(String),

    /// Run order below 1
    #[error("invalid run order {run_order} for stage {stage}")]
    InvalidRunOrder {
        /// Stage being assembled
        stage: String,
        /// Rejected run order
        run_order: u32,
    },

    /// Timeout below 1 second
    #[error("invalid timeout {timeout_seconds}s for stage {stage}")]
    InvalidTimeout {
        /// Stage being assembled
        stage: String,
        /// Rejected timeout
        timeout_seconds: u64,
    },

    /// Namer could not find a free name within its retry bound
    #[error("could not generate a unique name for prefix {prefix:?} after {attempts} attempts")]
    NameGenerationExhausted {
        /// Requested prefix
        prefix: String,
        /// Attempts made
        attempts: usize,
    },

    /// Input produced by a stage that does not run strictly earlier
    #[error(
        "stage {stage} (run order {run_order}) consumes {artifact} from {producer} \
         (run order {producer_run_order})"
    )]
    DependencyOrderViolation {
        /// Consuming stage
        stage: String,
        /// Consuming stage's run order
        run_order: u32,
        /// Artifact path
        artifact: String,
        /// Producing stage
        producer: String,
        /// Producing stage's run order
        producer_run_order: u32,
    },

    /// Input names a producer that is missing or never declares the artifact
    #[error("stage {stage} consumes {artifact} from {producer}, which does not produce it")]
    UnresolvedArtifact {
        /// Consuming stage
        stage: String,
        /// Artifact path
        artifact: String,
        /// Named producer
        producer: String,
    },

    /// Passthrough data tried to shadow a recognized key
    #[error("key {key:?} is reserved for stage {stage}")]
    ReservedEnvironmentKey {
        /// Stage being built
        stage: String,
        /// Shadowed key
        key: String,
    },
}

impl PlanError {
    /// Stage the error is attributed to, if any
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::DuplicateStageName(stage)
            | Self::InvalidRunOrder { stage, .. }
            | Self::InvalidTimeout { stage, .. }
            | Self::DependencyOrderViolation { stage, .. }
            | Self::UnresolvedArtifact { stage, .. }
            | Self::ReservedEnvironmentKey { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Check if error concerns plan ordering or artifact flow
    #[inline]
    #[must_use]
    pub fn is_ordering_error(&self) -> bool {
        matches!(
            self,
            Self::DependencyOrderViolation { .. } | Self::UnresolvedArtifact { .. }
        )
    }
}
