//! Stage assembler
//!
//! Combines a composed role, environment and compute target into a
//! [`StageDescriptor`] with an explicit run order and declared artifacts.

use crate::error::{PlanError, Result};
use crate::role::ExecutionRole;
use crate::session::ConstructionSession;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use tracing::debug;

/// Named data handoff between stages
///
/// Refers to its producer by name only; `None` marks an artifact supplied
/// from outside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactReference {
    /// Producing stage, `None` if external
    #[serde(default, rename = "stage", skip_serializing_if = "Option::is_none")]
    pub producing_stage: Option<String>,
    /// Artifact path
    pub path: String,
}

impl ArtifactReference {
    /// Artifact supplied from outside the pipeline
    #[must_use]
    pub fn external(path: impl Into<String>) -> Self {
        Self {
            producing_stage: None,
            path: path.into(),
        }
    }

    /// Artifact produced by `stage`
    #[must_use]
    pub fn produced_by(stage: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            producing_stage: Some(stage.into()),
            path: path.into(),
        }
    }

    /// True if supplied from outside the pipeline
    #[inline]
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.producing_stage.is_none()
    }

    /// Path of a file inside this artifact, `<artifact>::<file>`
    #[must_use]
    pub fn at_path(&self, file: &str) -> String {
        format!("{}::{file}", self.path)
    }
}

impl Display for ArtifactReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.producing_stage {
            Some(stage) => write!(f, "{stage}:{}", self.path),
            None => write!(f, "external:{}", self.path),
        }
    }
}

/// Object in the blueprint bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeLocation {
    /// Bucket name
    pub bucket: String,
    /// Object key
    pub key: String,
}

impl CodeLocation {
    /// Object `key` in `bucket`
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Serverless function definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionTarget {
    /// Function logical name
    pub function_name: String,
    /// Entry point
    pub handler: String,
    /// Language runtime
    pub runtime: String,
    /// Code package
    pub code: CodeLocation,
    /// Layers
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<CodeLocation>,
}

/// Declarative stack deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackDeploymentTarget {
    /// Stack name
    pub stack_name: String,
    /// Template path inside the source artifact
    pub template_path: String,
    /// Parameters path inside the source artifact
    pub parameters_path: String,
    /// Acknowledged capabilities
    pub capabilities: Vec<String>,
    /// Replace the stack if it is in a failed state
    pub replace_on_failure: bool,
    /// Let the engine create an administrative deployment role
    pub admin_permissions: bool,
}

/// What a stage runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ComputeTarget {
    /// Function run with its environment
    Function(FunctionTarget),
    /// Function invoked by the orchestrator with user parameters
    FunctionInvoke {
        /// Invoked function
        function: FunctionTarget,
        /// Parameters passed on invocation
        user_parameters: BTreeMap<String, serde_json::Value>,
    },
    /// Stack deployment action
    StackDeployment(StackDeploymentTarget),
    /// Custom resource backed by a function
    CustomResource {
        /// Function that services the resource
        function: FunctionTarget,
        /// Resource type name
        resource_type: String,
        /// Resource properties
        properties: BTreeMap<String, String>,
    },
}

impl ComputeTarget {
    /// Function behind the target, if any
    #[must_use]
    pub fn function(&self) -> Option<&FunctionTarget> {
        match self {
            Self::Function(function)
            | Self::FunctionInvoke { function, .. }
            | Self::CustomResource { function, .. } => Some(function),
            Self::StackDeployment(_) => None,
        }
    }
}

/// Input to [`assemble_stage`]
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// Stage name, unique within the plan
    pub name: String,
    /// Role the stage runs as
    pub role: ExecutionRole,
    /// Roles the stage hands to jobs it launches
    pub delegated_roles: Vec<ExecutionRole>,
    /// Environment passed to the runtime
    pub environment: BTreeMap<String, String>,
    /// Execution order, 1-based
    pub run_order: u32,
    /// Consumed artifacts
    pub inputs: Vec<ArtifactReference>,
    /// Paths of produced artifacts
    pub outputs: Vec<String>,
    /// Timeout in seconds
    pub timeout_seconds: u64,
    /// What the stage runs
    pub target: ComputeTarget,
    /// Output variable namespace
    pub variables_namespace: Option<String>,
}

impl StageSpec {
    /// Spec with no environment, artifacts or delegated roles
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        role: ExecutionRole,
        target: ComputeTarget,
        run_order: u32,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            delegated_roles: Vec::new(),
            environment: BTreeMap::new(),
            run_order,
            inputs: Vec::new(),
            outputs: Vec::new(),
            timeout_seconds,
            target,
            variables_namespace: None,
        }
    }

    /// With environment entry
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// With consumed artifact
    #[must_use]
    pub fn input(mut self, artifact: ArtifactReference) -> Self {
        self.inputs.push(artifact);
        self
    }

    /// With produced artifact
    #[must_use]
    pub fn output(mut self, path: impl Into<String>) -> Self {
        self.outputs.push(path.into());
        self
    }

    /// With delegated role
    #[must_use]
    pub fn delegate(mut self, role: ExecutionRole) -> Self {
        self.delegated_roles.push(role);
        self
    }

    /// With output variable namespace
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.variables_namespace = Some(namespace.into());
        self
    }
}

/// One validated pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDescriptor {
    name: String,
    role: ExecutionRole,
    delegated_roles: Vec<ExecutionRole>,
    environment: BTreeMap<String, String>,
    run_order: u32,
    inputs: BTreeSet<ArtifactReference>,
    outputs: BTreeSet<ArtifactReference>,
    timeout_seconds: u64,
    target: ComputeTarget,
    variables_namespace: Option<String>,
}

impl StageDescriptor {
    /// Stage name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owned role
    #[inline]
    #[must_use]
    pub fn role(&self) -> &ExecutionRole {
        &self.role
    }

    /// Roles handed to launched jobs
    #[inline]
    #[must_use]
    pub fn delegated_roles(&self) -> &[ExecutionRole] {
        &self.delegated_roles
    }

    /// Runtime environment
    #[inline]
    #[must_use]
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Execution order
    #[inline]
    #[must_use]
    pub fn run_order(&self) -> u32 {
        self.run_order
    }

    /// Consumed artifacts
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &BTreeSet<ArtifactReference> {
        &self.inputs
    }

    /// Produced artifacts
    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &BTreeSet<ArtifactReference> {
        &self.outputs
    }

    /// Check if the stage declares `path` as an output
    #[must_use]
    pub fn produces(&self, path: &str) -> bool {
        self.outputs.iter().any(|o| o.path == path)
    }

    /// Output reference for `path`, for wiring into a later stage
    #[must_use]
    pub fn output(&self, path: &str) -> Option<&ArtifactReference> {
        self.outputs.iter().find(|o| o.path == path)
    }

    /// Timeout in seconds
    #[inline]
    #[must_use]
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    /// What the stage runs
    #[inline]
    #[must_use]
    pub fn target(&self) -> &ComputeTarget {
        &self.target
    }

    /// Output variable namespace
    #[inline]
    #[must_use]
    pub fn variables_namespace(&self) -> Option<&str> {
        self.variables_namespace.as_deref()
    }
}

/// Validate `spec` and register its name in `session`
///
/// The name is only claimed once every other check has passed, so a
/// rejected spec leaves the session untouched.
pub fn assemble_stage(session: &mut ConstructionSession, spec: StageSpec) -> Result<StageDescriptor> {
    if spec.name.is_empty() {
        return Err(PlanError::EmptyName { kind: "stage" });
    }
    if spec.run_order < 1 {
        return Err(PlanError::InvalidRunOrder {
            stage: spec.name,
            run_order: spec.run_order,
        });
    }
    if spec.timeout_seconds < 1 {
        return Err(PlanError::InvalidTimeout {
            stage: spec.name,
            timeout_seconds: spec.timeout_seconds,
        });
    }
    session.register_stage(&spec.name)?;

    let outputs = spec
        .outputs
        .into_iter()
        .map(|path| ArtifactReference::produced_by(spec.name.clone(), path))
        .collect();

    debug!(
        session = %session.id(),
        stage = %spec.name,
        role = spec.role.name(),
        run_order = spec.run_order,
        inputs = spec.inputs.len(),
        "assembled stage"
    );

    Ok(StageDescriptor {
        name: spec.name,
        role: spec.role,
        delegated_roles: spec.delegated_roles,
        environment: spec.environment,
        run_order: spec.run_order,
        inputs: spec.inputs.into_iter().collect(),
        outputs,
        timeout_seconds: spec.timeout_seconds,
        target: spec.target,
        variables_namespace: spec.variables_namespace,
    })
}
