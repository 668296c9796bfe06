//! Stack set stage
//!
//! An orchestrator-invoked function that creates or updates a stack set
//! and its instances across accounts. The stack set gets a generated
//! name, so two monitoring pipelines in the same account never fight over
//! one stack set.

use super::{
    add_and_name, blueprint_code, default_run_order, function_logs_policy, merge_passthrough,
    FUNCTION_RUNTIME,
};
use crate::arn::ResourceIdentifier;
use crate::construction::PlanBuilder;
use crate::error::Result;
use crate::policy::{build_policy, PolicyCategory};
use crate::role::TrustedPrincipal;
use crate::stage::{ArtifactReference, ComputeTarget, FunctionTarget, StageSpec};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// User parameter keys set by [`stack_set`]
pub const STACK_SET_KEYS: [&str; 7] = [
    "stackset_name",
    "artifact",
    "template_file",
    "stage_params_file",
    "account_ids",
    "org_ids",
    "regions",
];

const HANDLER: &str = "main.lambda_handler";

fn default_timeout() -> u64 {
    900
}

/// Stack set stage settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StackSetConfig {
    /// Action (stage) name
    pub action_name: String,
    /// Artifact holding the template and parameters
    pub source_output: ArtifactReference,
    /// Artifact name passed to the function
    pub artifact: String,
    /// Template file inside the artifact
    pub template_file: String,
    /// Parameters file inside the artifact
    pub stage_params_file: String,
    /// Target accounts
    #[serde(default)]
    pub account_ids: Vec<String>,
    /// Target organizational units
    #[serde(default)]
    pub org_ids: Vec<String>,
    /// Target regions
    #[serde(default)]
    pub regions: Vec<String>,
    /// Prefix of the generated stack set name
    pub stack_name: String,
    /// Execution order
    #[serde(default = "default_run_order")]
    pub run_order: u32,
    /// Function timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Extra user parameters
    #[serde(default)]
    pub user_parameters: BTreeMap<String, Value>,
}

/// Result of [`stack_set`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSetStage {
    /// Stage name
    pub stage: String,
    /// ARN of the function the orchestrator invokes
    pub function_arn: ResourceIdentifier,
    /// Generated stack set name
    pub stack_set_name: String,
}

/// Add a stack set stage
pub fn stack_set(builder: &mut PlanBuilder, config: StackSetConfig) -> Result<StackSetStage> {
    builder.atomically(|builder| add_stack_set(builder, config))
}

fn add_stack_set(builder: &mut PlanBuilder, config: StackSetConfig) -> Result<StackSetStage> {
    let ctx = builder.context().clone();
    let stack_set_name = builder.unique_name(&config.stack_name)?;

    let management = build_policy(
        PolicyCategory::StackManagement,
        [ctx.stack_set(&stack_set_name)?],
    )?;
    let instances = build_policy(
        PolicyCategory::StackInstances,
        [
            ctx.stack_set(&stack_set_name)?,
            ctx.stack_set_target(&stack_set_name)?,
        ],
    )?;

    let role = builder.compose_role(
        format!("{}_stackset_role", config.action_name),
        "Role assumed by the function that manages a stack set",
        TrustedPrincipal::ComputeRuntime,
        vec![management, instances, function_logs_policy(&ctx)?],
        Vec::new(),
    )?;

    let function_name = format!("{}_stackset_lambda", config.action_name);
    let function_arn = ctx.function(&function_name)?;

    let mut user_parameters = BTreeMap::from([
        ("stackset_name".to_string(), Value::from(stack_set_name.clone())),
        ("artifact".to_string(), Value::from(config.artifact)),
        ("template_file".to_string(), Value::from(config.template_file)),
        (
            "stage_params_file".to_string(),
            Value::from(config.stage_params_file),
        ),
        ("account_ids".to_string(), Value::from(config.account_ids)),
        ("org_ids".to_string(), Value::from(config.org_ids)),
        ("regions".to_string(), Value::from(config.regions)),
    ]);
    merge_passthrough(&config.action_name, &mut user_parameters, config.user_parameters)?;

    let target = ComputeTarget::FunctionInvoke {
        function: FunctionTarget {
            function_name,
            handler: HANDLER.to_string(),
            runtime: FUNCTION_RUNTIME.to_string(),
            code: blueprint_code(&ctx, "create_update_cf_stackset.zip"),
            layers: Vec::new(),
        },
        user_parameters,
    };

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

    let stage = add_and_name(builder, spec)?;
    Ok(StackSetStage {
        stage,
        function_arn,
        stack_set_name,
    })
}
