//! Stage factories
//!
//! Ready-made stages for the model deployment pipeline. Each factory takes
//! a typed config, composes the roles the stage needs with statements
//! scoped to the resources it touches, and adds one stage to a
//! [`PlanBuilder`].
//!
//! Every config has a passthrough map for caller-defined data. Passthrough
//! entries may not shadow a key the factory sets itself; each factory
//! documents its recognized keys in a `*_KEYS` constant.

pub mod baseline;
pub mod batch_transform;
pub mod cloudformation;
pub mod invoke;
pub mod stackset;

pub use baseline::{data_baseline, BaselineJobConfig};
pub use batch_transform::{batch_transform, BatchTransformConfig};
pub use cloudformation::{cloud_formation, CloudFormationConfig};
pub use invoke::{invoke_function, InvokeFunctionConfig};
pub use stackset::{stack_set, StackSetConfig, StackSetStage};

use crate::arn::DeploymentContext;
use crate::construction::PlanBuilder;
use crate::error::{PlanError, Result};
use crate::policy::{build_policy, PermissionStatement, PolicyCategory};
use crate::stage::CodeLocation;
use std::collections::BTreeMap;

/// Runtime of every function in the pipeline
pub const FUNCTION_RUNTIME: &str = "python3.8";

/// Default function entry point
pub const DEFAULT_HANDLER: &str = "main.handler";

/// Log level passed to functions
pub const LOG_LEVEL: &str = "INFO";

const LAMBDA_PREFIX: &str = "blueprints/byom/lambdas";

/// Function package in the blueprint bucket
#[must_use]
pub fn blueprint_code(context: &DeploymentContext, package: &str) -> CodeLocation {
    CodeLocation::new(
        context.blueprint_bucket.clone(),
        format!("{LAMBDA_PREFIX}/{package}"),
    )
}

/// Layer with the SageMaker SDK, shared by functions that call it
#[must_use]
pub fn sagemaker_layer(context: &DeploymentContext) -> CodeLocation {
    blueprint_code(context, "sagemaker_layer.zip")
}

/// Logs statement for functions in this deployment
pub(crate) fn function_logs_policy(context: &DeploymentContext) -> Result<PermissionStatement> {
    build_policy(
        PolicyCategory::LogsWrite,
        [context.log_groups("/aws/lambda/")?],
    )
}

/// Copy passthrough entries into `typed`, refusing to shadow typed keys
pub(crate) fn merge_passthrough<V>(
    stage: &str,
    typed: &mut BTreeMap<String, V>,
    passthrough: BTreeMap<String, V>,
) -> Result<()> {
    for (key, value) in passthrough {
        if typed.contains_key(&key) {
            return Err(PlanError::ReservedEnvironmentKey {
                stage: stage.to_string(),
                key,
            });
        }
        typed.insert(key, value);
    }
    Ok(())
}

fn default_run_order() -> u32 {
    1
}

/// Add `stage` with its spec, returning the stage name
pub(crate) fn add_and_name(
    builder: &mut PlanBuilder,
    spec: crate::stage::StageSpec,
) -> Result<String> {
    builder.add_stage(spec).map(|stage| stage.name().to_string())
}
