//! Plan Builder
//!
//! The primary interface for building a deployment plan.
//! Owns the construction session for exactly one build and produces a
//! validated `PipelinePlan`.

use crate::arn::DeploymentContext;
use crate::error::Result;
use crate::naming::{ResourceNamer, SuffixSource, UuidSuffix};
use crate::plan::{build_plan, PipelinePlan};
use crate::policy::PermissionStatement;
use crate::role::{compose_described_role, ConditionalStatement, ExecutionRole, TrustedPrincipal};
use crate::session::{ConstructionSession, FeatureFlag, FeatureFlags};
use crate::stage::{assemble_stage, StageDescriptor, StageSpec};
use tracing::debug;

/// Builder for constructing validated plans
///
/// Usage:
/// ```rust,ignore
/// let mut builder = PlanBuilder::new(context);
/// let role = builder.compose_role("fn_role", "", TrustedPrincipal::ComputeRuntime, statements, vec![])?;
/// builder.add_stage(StageSpec::new("fn", role, target, 1, 60))?;
/// let plan: PipelinePlan = builder.build()?;
/// ```
pub struct PlanBuilder {
    context: DeploymentContext,
    session: ConstructionSession,
    namer: ResourceNamer<Box<dyn SuffixSource + Send>>,
    stages: Vec<StageDescriptor>,
}

impl PlanBuilder {
    /// Create a builder; `KmsKeyProvided` is set iff the context has a key
    pub fn new(context: DeploymentContext) -> Self {
        Self::with_flags(context, FeatureFlags::new())
    }

    /// Create a builder with extra feature flags
    pub fn with_flags(context: DeploymentContext, flags: FeatureFlags) -> Self {
        let flags = flags.with_if(FeatureFlag::KmsKeyProvided, context.kms_key_arn.is_some());
        Self {
            context,
            session: ConstructionSession::new(flags),
            namer: ResourceNamer::with_source(Box::new(UuidSuffix)),
            stages: Vec::new(),
        }
    }

    /// Replace the suffix source used for generated names
    #[must_use]
    pub fn with_suffix_source(mut self, source: impl SuffixSource + Send + 'static) -> Self {
        self.namer = ResourceNamer::with_source(Box::new(source));
        self
    }

    /// Deployment context
    pub fn context(&self) -> &DeploymentContext {
        &self.context
    }

    /// Construction session of this build
    pub fn session(&self) -> &ConstructionSession {
        &self.session
    }

    /// Check if a flag is enabled for this build
    pub fn is_enabled(&self, flag: &FeatureFlag) -> bool {
        self.session.is_enabled(flag)
    }

    /// Number of stages added
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Get a stage added earlier
    pub fn get_stage(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.iter().find(|s| s.name() == name)
    }

    /// Compose a role registered in this build's session
    pub fn compose_role(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        principal: TrustedPrincipal,
        statements: Vec<PermissionStatement>,
        conditional: Vec<ConditionalStatement>,
    ) -> Result<ExecutionRole> {
        compose_described_role(
            &mut self.session,
            name,
            description,
            principal,
            statements,
            conditional,
        )
    }

    /// Generate a name unique within this build
    pub fn unique_name(&mut self, prefix: &str) -> Result<String> {
        self.namer.generate_unique_name(&mut self.session, prefix)
    }

    /// Assemble a stage and add it to the plan
    pub fn add_stage(&mut self, spec: StageSpec) -> Result<&StageDescriptor> {
        let stage = assemble_stage(&mut self.session, spec)?;
        self.stages.push(stage);
        Ok(&self.stages[self.stages.len() - 1])
    }

    /// Run `add` as one unit: if it fails, every role, stage and generated
    /// name it registered is released again
    ///
    /// Factories compose several roles before their stage is assembled, so
    /// a late failure would otherwise leave names claimed for a stage that
    /// never made it into the plan.
    pub fn atomically<T>(&mut self, add: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let checkpoint = self.session.clone();
        let stages = self.stages.len();

        let result = add(self);
        if let Err(err) = &result {
            debug!(session = %self.session.id(), error = %err, "rolling back failed stage");
            self.session = checkpoint;
            self.stages.truncate(stages);
        }
        result
    }

    /// Validate the stages and produce a PipelinePlan
    ///
    /// Consumes the builder: the session ends here whether or not the plan
    /// validates, and no partially built plan is returned on failure.
    pub fn build(self) -> Result<PipelinePlan> {
        debug!(
            session = %self.session.id(),
            stages = self.stages.len(),
            roles = self.session.role_count(),
            "finalizing plan"
        );
        build_plan(self.stages)
    }
}
