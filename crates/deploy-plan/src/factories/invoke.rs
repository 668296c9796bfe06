//! Function invocation stage
//!
//! A custom resource whose handler invokes an existing function once, at
//! provisioning time.

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
use std::collections::BTreeMap;

/// Resource type of the invoking custom resource
pub const INVOKE_RESOURCE_TYPE: &str = "Custom::InvokeLambda";

/// Properties set by [`invoke_function`]
pub const INVOKE_KEYS: [&str; 2] = ["function_name", "message"];

const HANDLER: &str = "index.handler";

fn default_timeout() -> u64 {
    300
}

/// Function invocation stage settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvokeFunctionConfig {
    /// Stage name
    pub id: String,
    /// Invoked function
    pub function_arn: ResourceIdentifier,
    /// Invoked function's name
    pub function_name: String,
    /// Execution order
    #[serde(default = "default_run_order")]
    pub run_order: u32,
    /// Invoker timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Consumed artifacts
    #[serde(default)]
    pub inputs: Vec<ArtifactReference>,
    /// Extra resource properties
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Add a function invocation stage; returns its name
pub fn invoke_function(builder: &mut PlanBuilder, config: InvokeFunctionConfig) -> Result<String> {
    builder.atomically(|builder| add_invoke_function(builder, config))
}

fn add_invoke_function(builder: &mut PlanBuilder, config: InvokeFunctionConfig) -> Result<String> {
    let ctx = builder.context().clone();

    let invoke = build_policy(PolicyCategory::FunctionInvoke, [config.function_arn])?;
    let role = builder.compose_role(
        format!("{}_role", config.id),
        "Role assumed by the function that invokes another function",
        TrustedPrincipal::ComputeRuntime,
        vec![invoke, function_logs_policy(&ctx)?],
        Vec::new(),
    )?;

    let message = format!("Invoking lambda function: {}", config.function_name);
    let mut properties = BTreeMap::from([
        ("function_name".to_string(), config.function_name),
        ("message".to_string(), message),
    ]);
    merge_passthrough(&config.id, &mut properties, config.properties)?;

    let target = ComputeTarget::CustomResource {
        function: FunctionTarget {
            function_name: format!("{}_invoker", config.id),
            handler: HANDLER.to_string(),
            runtime: FUNCTION_RUNTIME.to_string(),
            code: blueprint_code(&ctx, "invoke_lambda_custom_resource.zip"),
            layers: Vec::new(),
        },
        resource_type: INVOKE_RESOURCE_TYPE.to_string(),
        properties,
    };

    let mut spec = StageSpec::new(config.id, role, target, config.run_order, config.timeout_seconds);
    spec.inputs = config.inputs;

    add_and_name(builder, spec)
}
