//! Batch transform stage
//!
//! A function that starts a batch transform job against a registered model
//! and writes the results under the configured output location.

use super::{
    add_and_name, blueprint_code, default_run_order, function_logs_policy, merge_passthrough,
    sagemaker_layer, DEFAULT_HANDLER, FUNCTION_RUNTIME, LOG_LEVEL,
};
use crate::construction::PlanBuilder;
use crate::error::Result;
use crate::policy::{build_policy, PolicyCategory};
use crate::role::TrustedPrincipal;
use crate::stage::{ArtifactReference, ComputeTarget, FunctionTarget, StageSpec};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Environment keys set by [`batch_transform`]
pub const BATCH_TRANSFORM_KEYS: [&str; 7] = [
    "model_name",
    "inference_instance",
    "assets_bucket",
    "batch_inference_data",
    "batch_job_output_location",
    "kms_key_arn",
    "LOG_LEVEL",
];

fn default_id() -> String {
    "batch_transform".to_string()
}

fn default_timeout() -> u64 {
    3
}

/// Batch transform stage settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchTransformConfig {
    /// Stage name
    #[serde(default = "default_id")]
    pub id: String,
    /// Model to run
    pub model_name: String,
    /// Instance type for the transform job
    pub inference_instance: String,
    /// Bucket holding the batch input
    pub batch_input_bucket: String,
    /// `bucket/key` of the batch input
    pub batch_inference_data: String,
    /// `bucket/prefix` the job writes to
    pub batch_job_output_location: String,
    /// Execution order
    #[serde(default = "default_run_order")]
    pub run_order: u32,
    /// Function timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Consumed artifacts
    #[serde(default)]
    pub inputs: Vec<ArtifactReference>,
    /// Extra environment entries
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl BatchTransformConfig {
    /// Config with defaults for everything but the job parameters
    #[must_use]
    pub fn new(
        model_name: impl Into<String>,
        inference_instance: impl Into<String>,
        batch_input_bucket: impl Into<String>,
        batch_inference_data: impl Into<String>,
        batch_job_output_location: impl Into<String>,
    ) -> Self {
        Self {
            id: default_id(),
            model_name: model_name.into(),
            inference_instance: inference_instance.into(),
            batch_input_bucket: batch_input_bucket.into(),
            batch_inference_data: batch_inference_data.into(),
            batch_job_output_location: batch_job_output_location.into(),
            run_order: default_run_order(),
            timeout_seconds: default_timeout(),
            inputs: Vec::new(),
            environment: BTreeMap::new(),
        }
    }
}

/// Add a batch transform stage; returns its name
pub fn batch_transform(builder: &mut PlanBuilder, config: BatchTransformConfig) -> Result<String> {
    builder.atomically(|builder| add_batch_transform(builder, config))
}

fn add_batch_transform(builder: &mut PlanBuilder, config: BatchTransformConfig) -> Result<String> {
    let ctx = builder.context().clone();
    let assets = &ctx.assets_bucket;

    let s3_read = build_policy(
        PolicyCategory::StorageRead,
        [
            ctx.bucket(assets)?,
            ctx.objects(assets)?,
            ctx.bucket(&config.batch_input_bucket)?,
            ctx.object(&config.batch_inference_data)?,
        ],
    )?;
    let s3_write = build_policy(
        PolicyCategory::StorageWrite,
        [ctx.objects(&config.batch_job_output_location)?],
    )?;
    let transform = build_policy(
        PolicyCategory::ComputeBatchTransform,
        [
            ctx.sagemaker("transform-job/*")?,
            ctx.sagemaker(&format!("model/{}", config.model_name))?,
        ],
    )?;

    let role = builder.compose_role(
        format!("{}_role", config.id),
        "Role assumed by the function that creates a batch transform job",
        TrustedPrincipal::ComputeRuntime,
        vec![transform, s3_read, s3_write, function_logs_policy(&ctx)?],
        Vec::new(),
    )?;

    let kms_key_arn = ctx
        .kms_key_arn
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    let mut environment = BTreeMap::from([
        ("model_name".to_string(), config.model_name.clone()),
        ("inference_instance".to_string(), config.inference_instance),
        ("assets_bucket".to_string(), assets.clone()),
        ("batch_inference_data".to_string(), config.batch_inference_data),
        (
            "batch_job_output_location".to_string(),
            config.batch_job_output_location.clone(),
        ),
        ("kms_key_arn".to_string(), kms_key_arn),
        ("LOG_LEVEL".to_string(), LOG_LEVEL.to_string()),
    ]);
    merge_passthrough(&config.id, &mut environment, config.environment)?;

    let target = ComputeTarget::Function(FunctionTarget {
        function_name: config.id.clone(),
        handler: DEFAULT_HANDLER.to_string(),
        runtime: FUNCTION_RUNTIME.to_string(),
        code: blueprint_code(&ctx, "batch_transform.zip"),
        layers: vec![sagemaker_layer(&ctx)],
    });

    let mut spec = StageSpec::new(config.id, role, target, config.run_order, config.timeout_seconds)
        .output(config.batch_job_output_location);
    spec.environment = environment;
    spec.inputs = config.inputs;

    add_and_name(builder, spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arn::DeploymentContext;

    fn builder() -> PlanBuilder {
        PlanBuilder::new(DeploymentContext::new(
            "us-east-1",
            "123456789012",
            "blueprints",
            "assets",
        ))
    }

    fn config() -> BatchTransformConfig {
        BatchTransformConfig::new(
            "churn-model",
            "ml.m5.large",
            "batch-input",
            "batch-input/data.csv",
            "assets/batch_output",
        )
    }

    #[test]
    fn batch_transform_scopes_storage() {
        let mut builder = builder();
        let name = batch_transform(&mut builder, config()).unwrap();
        let stage = builder.get_stage(&name).unwrap();

        let read = &stage.role().statements()[1];
        assert_eq!(read.category(), PolicyCategory::StorageRead);
        let resources: Vec<&str> = read.resources().iter().map(|r| r.as_str()).collect();
        assert_eq!(
            resources,
            [
                "arn:aws:s3:::assets",
                "arn:aws:s3:::assets/*",
                "arn:aws:s3:::batch-input",
                "arn:aws:s3:::batch-input/data.csv",
            ]
        );

        let write = &stage.role().statements()[2];
        assert_eq!(
            write.resources().iter().next().unwrap().as_str(),
            "arn:aws:s3:::assets/batch_output/*"
        );
        assert!(stage.produces("assets/batch_output"));
    }

    #[test]
    fn batch_transform_deduplicates_shared_bucket() {
        let mut builder = builder();
        let mut config = config();
        config.batch_input_bucket = "assets".to_string();
        let name = batch_transform(&mut builder, config).unwrap();

        let read = &builder.get_stage(&name).unwrap().role().statements()[1];
        assert_eq!(read.resources().len(), 3);
    }

    #[test]
    fn batch_transform_environment_keys() {
        let mut builder = builder();
        let name = batch_transform(&mut builder, config()).unwrap();
        let env = builder.get_stage(&name).unwrap().environment();

        let keys: Vec<&str> = env.keys().map(String::as_str).collect();
        let mut expected = BATCH_TRANSFORM_KEYS.to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);
        assert_eq!(env["kms_key_arn"], "");
    }

    #[test]
    fn batch_transform_rejects_shadowed_key() {
        let mut builder = builder();
        let mut config = config();
        config
            .environment
            .insert("model_name".to_string(), "other".to_string());

        assert!(matches!(
            batch_transform(&mut builder, config),
            Err(crate::PlanError::ReservedEnvironmentKey { .. })
        ));

        // the rejected attempt must not keep its role name
        assert_eq!(builder.session().role_count(), 0);
        let name = batch_transform(&mut builder, self::config()).unwrap();
        assert!(builder.get_stage(&name).is_some());
    }
}
