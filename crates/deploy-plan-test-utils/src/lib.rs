//! Testing utilities for the deploy-plan workspace
//!
//! Shared fixtures and suffix sources.

#![allow(missing_docs)]

use deploy_plan::arn::{DeploymentContext, ResourceIdentifier};
use deploy_plan::construction::PlanBuilder;
use deploy_plan::factories::BatchTransformConfig;
use deploy_plan::naming::SuffixSource;
use deploy_plan::policy::{build_policy, PolicyCategory};
use deploy_plan::role::TrustedPrincipal;
use deploy_plan::stage::{ArtifactReference, CodeLocation, ComputeTarget, FunctionTarget, StageSpec};
use std::collections::VecDeque;

pub const REGION: &str = "us-east-1";
pub const ACCOUNT: &str = "123456789012";
pub const BLUEPRINT_BUCKET: &str = "blueprints";
pub const ASSETS_BUCKET: &str = "assets";
pub const KMS_KEY: &str = "arn:aws:kms:us-east-1:123456789012:key/test-key";

pub fn test_context() -> DeploymentContext {
    DeploymentContext::new(REGION, ACCOUNT, BLUEPRINT_BUCKET, ASSETS_BUCKET)
}

pub fn test_kms_key() -> ResourceIdentifier {
    ResourceIdentifier::parse(KMS_KEY).unwrap()
}

pub fn test_context_with_key() -> DeploymentContext {
    test_context().with_kms_key(test_kms_key())
}

pub fn arn(value: &str) -> ResourceIdentifier {
    ResourceIdentifier::parse(value).unwrap()
}

pub fn function_target(name: &str) -> ComputeTarget {
    ComputeTarget::Function(FunctionTarget {
        function_name: name.to_string(),
        handler: "main.handler".to_string(),
        runtime: "python3.8".to_string(),
        code: CodeLocation::new(BLUEPRINT_BUCKET, format!("{name}.zip")),
        layers: Vec::new(),
    })
}

/// Spec for a function stage with a storage-read role of its own
pub fn stage_spec(builder: &mut PlanBuilder, name: &str, run_order: u32) -> StageSpec {
    let read = build_policy(
        PolicyCategory::StorageRead,
        [builder.context().bucket(ASSETS_BUCKET).unwrap()],
    )
    .unwrap();
    let role = builder
        .compose_role(
            format!("{name}_role"),
            "",
            TrustedPrincipal::ComputeRuntime,
            vec![read],
            Vec::new(),
        )
        .unwrap();
    StageSpec::new(name, role, function_target(name), run_order, 60)
}

/// Add a stage that consumes `inputs` and produces `outputs`
pub fn add_stage(
    builder: &mut PlanBuilder,
    name: &str,
    run_order: u32,
    inputs: &[ArtifactReference],
    outputs: &[&str],
) {
    let mut spec = stage_spec(builder, name, run_order);
    spec.inputs = inputs.to_vec();
    spec.outputs = outputs.iter().map(ToString::to_string).collect();
    builder.add_stage(spec).unwrap();
}

pub fn batch_transform_config() -> BatchTransformConfig {
    BatchTransformConfig::new(
        "churn-model",
        "ml.m5.large",
        "batch-input",
        "batch-input/data.csv",
        "assets/batch_output",
    )
}

/// Suffix source replaying a fixed script, then counting
#[derive(Debug, Clone, Default)]
pub struct ScriptedSuffix {
    script: VecDeque<String>,
    counter: u32,
}

impl ScriptedSuffix {
    pub fn new<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: script.into_iter().map(Into::into).collect(),
            counter: 0,
        }
    }
}

impl SuffixSource for ScriptedSuffix {
    fn next_suffix(&mut self) -> String {
        self.script.pop_front().unwrap_or_else(|| {
            self.counter += 1;
            format!("{:08x}", self.counter)
        })
    }
}

/// Suffix source that always returns the same value
#[derive(Debug, Clone)]
pub struct StuckSuffix(pub &'static str);

impl SuffixSource for StuckSuffix {
    fn next_suffix(&mut self) -> String {
        self.0.to_string()
    }
}

pub const DEPLOYMENT_TOML: &str = r#"
[deployment]
region = "us-east-1"
account_id = "123456789012"
blueprint_bucket = "blueprints"
assets_bucket = "assets"
"#;

/// Configuration exercising every stage kind
pub const FULL_PIPELINE_TOML: &str = r#"
[[stages]]
kind = "data-baseline"
baseline_job_name = "churn-baseline"
training_data_location = "training/data.csv"
baseline_job_output_location = "assets/baseline"
endpoint_name = "churn-endpoint"
instance_type = "ml.m5.large"
instance_volume_size = "20"
max_runtime_seconds = "3600"
stack_name = "monitor"

[[stages]]
kind = "batch-transform"
model_name = "churn"
inference_instance = "ml.m5.large"
batch_input_bucket = "batch-input"
batch_inference_data = "batch-input/data.csv"
batch_job_output_location = "assets/batch_output"
run_order = 2
inputs = [{ stage = "create_data_baseline_job", path = "assets/baseline" }]

[[stages]]
kind = "stack-set"
action_name = "deploy_staging"
source_output = { path = "source" }
artifact = "source"
template_file = "template.yaml"
stage_params_file = "staging.json"
account_ids = ["111111111111"]
regions = ["us-east-1"]
stack_name = "monitor"

[[stages]]
kind = "cloud-formation"
action_name = "deploy_model"
stack_name = "model-endpoint"
source_output = { path = "source" }
template_file = "template.yaml"
template_parameters_file = "params.json"
run_order = 3

[[stages]]
kind = "invoke-function"
id = "invoke_baseline"
function_arn = "arn:aws:lambda:us-east-1:123456789012:function:create_data_baseline_job"
function_name = "create_data_baseline_job"
run_order = 2
"#;
