//! Stack deployment stage
//!
//! Deploys a single stack from a template and parameters file found in a
//! source artifact. The orchestrator runs the deployment itself, so the
//! role trusts the orchestration runtime.

use super::{add_and_name, default_run_order};
use crate::construction::PlanBuilder;
use crate::error::Result;
use crate::policy::{build_policy, PolicyCategory};
use crate::role::TrustedPrincipal;
use crate::stage::{ArtifactReference, ComputeTarget, StackDeploymentTarget, StageSpec};
use serde::Deserialize;

/// Capability acknowledged for every deployed stack
pub const NAMED_IAM_CAPABILITY: &str = "CAPABILITY_NAMED_IAM";

fn default_timeout() -> u64 {
    3600
}

/// Stack deployment stage settings
///
/// `admin_permissions` defaults to `false`. Existing monitoring pipelines
/// always let the engine create an administrative deployment role; configs
/// carried over from them must set `admin_permissions = true` to keep that
/// behavior.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloudFormationConfig {
    /// Action (stage) name
    pub action_name: String,
    /// Deployed stack
    pub stack_name: String,
    /// Artifact holding the template and parameters
    pub source_output: ArtifactReference,
    /// Template file inside the artifact
    pub template_file: String,
    /// Parameters file inside the artifact
    pub template_parameters_file: String,
    /// Execution order
    #[serde(default = "default_run_order")]
    pub run_order: u32,
    /// Let the engine create an administrative deployment role; off unless
    /// set explicitly
    #[serde(default)]
    pub admin_permissions: bool,
    /// Deployment timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Add a stack deployment stage; returns its name
pub fn cloud_formation(builder: &mut PlanBuilder, config: CloudFormationConfig) -> Result<String> {
    builder.atomically(|builder| add_cloud_formation(builder, config))
}

fn add_cloud_formation(builder: &mut PlanBuilder, config: CloudFormationConfig) -> Result<String> {
    let ctx = builder.context().clone();

    let deploy = build_policy(
        PolicyCategory::StackDeployment,
        [ctx.stack(&config.stack_name)?],
    )?;
    let role = builder.compose_role(
        format!("{}_role", config.action_name),
        "Role the orchestrator deploys the stack with",
        TrustedPrincipal::OrchestrationRuntime,
        vec![deploy],
        Vec::new(),
    )?;

    let target = ComputeTarget::StackDeployment(StackDeploymentTarget {
        template_path: config.source_output.at_path(&config.template_file),
        parameters_path: config
            .source_output
            .at_path(&config.template_parameters_file),
        stack_name: config.stack_name,
        capabilities: vec![NAMED_IAM_CAPABILITY.to_string()],
        replace_on_failure: true,
        admin_permissions: config.admin_permissions,
    });

    let namespace = format!("{}-namespace", config.action_name);
    let spec = StageSpec::new(
        config.action_name,
        role,
        target,
        config.run_order,
        config.timeout_seconds,
    )
    .input(config.source_output)
    .namespace(namespace);

    add_and_name(builder, spec)
}
